//! Length-prefixed framing for the wire protocol: a 4-byte big-endian
//! length prefix followed by a `bincode`-encoded message, matching the
//! node codec's choice of a structured binary encoding (C5) rather than a
//! hand-rolled text format.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use serde::{de::DeserializeOwned, Serialize};

/// Frames above this size are rejected outright: a corrupt or hostile
/// length prefix must not drive an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Failure to read or write a framed message.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// The underlying transport failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The length prefix exceeded [`MAX_FRAME_BYTES`].
    #[error("frame of {0} bytes exceeds the {1} byte limit")]
    FrameTooLarge(u32, u32),
    /// The frame body did not decode as the expected message type.
    #[error("failed to decode frame: {0}")]
    Decode(#[from] bincode::Error),
}

/// Encode `message` and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(message)?;
    let len = u32::try_from(body.len()).unwrap_or(u32::MAX);
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame and decode it as `T`. Returns `Ok(None)`
/// on a clean EOF before any bytes of the next frame arrive.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(FramingError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let message = bincode::deserialize(&body)?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, WireGetter};

    #[tokio::test]
    async fn round_trips_a_request_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let request = Request::Get {
            key: "group.g".to_string(),
            getter: WireGetter {
                children: true,
                start: String::new(),
                limit: -1,
            },
        };
        write_frame(&mut client, &request).await.unwrap();
        let decoded: Request = read_frame(&mut server).await.unwrap().unwrap();
        match decoded {
            Request::Get { key, getter } => {
                assert_eq!(key, "group.g");
                assert!(getter.children);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn clean_eof_before_a_frame_is_none() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let decoded: Option<Request> = read_frame(&mut server).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client
            .write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes())
            .await
            .unwrap();
        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(err, FramingError::FrameTooLarge(_, _)));
    }
}
