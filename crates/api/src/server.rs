//! Remote protocol server loop: bind, accept, and serve requests
//! concurrently against a shared [`Facade`] (§4.10, "Server loop").
//!
//! Transient accept errors back off exponentially from 5 ms to a 1 s
//! ceiling and retry; a permanent error terminates the loop. Within one
//! accepted connection, each request is dispatched on its own task so a
//! slow call never blocks a pipelined one behind it; responses are
//! multiplexed back to the caller's connection by the id carried on the
//! frame. A shutdown signal both stops accepting new connections and
//! aborts every connection still being served, so a caller's next write
//! observes a closed socket rather than a silently abandoned one.

use std::sync::Arc;
use std::time::Duration;

use stratakv_engine::Facade;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::framing::{read_frame, write_frame};
use crate::protocol::{Request, RequestFrame, Response, ResponseFrame, WireError};

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Apply `request` against `facade`, translating core errors to their
/// wire-safe form.
pub fn dispatch(facade: &Facade, request: Request) -> Result<Response, WireError> {
    let result = match request {
        Request::Get { key, getter } => facade
            .get(&key, &getter.into())
            .map(|node| Response::Get(node.map(Into::into))),
        Request::GetMulti { keys, getter } => facade.get_multi(&keys, &getter.into()).map(|nodes| {
            Response::GetMulti(nodes.into_iter().map(|(k, v)| (k, v.into())).collect())
        }),
        Request::Set { key, value, setter } => facade
            .set(&key, &value, &setter.into())
            .map(|()| Response::Unit),
        Request::SetMulti { kv_pairs, setter } => facade
            .set_multi(&kv_pairs, &setter.into())
            .map(|()| Response::Unit),
        Request::Delete { key, deleter } => {
            facade.delete(&key, &deleter.into()).map(|()| Response::Unit)
        }
        Request::DeleteMulti { keys, deleter } => facade
            .delete_multi(&keys, &deleter.into())
            .map(|()| Response::Unit),
        Request::Exists { key } => facade.exists(&key).map(Response::Exists),
        Request::Cleanup => facade.cleanup().map(|()| Response::Unit),
    };
    result.map_err(|e| WireError::from(&e))
}

/// Whether an accept failure is transient (worth backing off and retrying)
/// or permanent (the loop should stop).
fn is_transient(err: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        err.kind(),
        ConnectionAborted | ConnectionReset | Interrupted | WouldBlock
    )
}

/// Run the accept loop on `listener`, serving every connection against
/// `facade` until a permanent accept error occurs or `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    facade: Arc<Facade>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "KVDB server listening");
    let mut backoff = INITIAL_BACKOFF;
    let mut connections: Vec<tokio::task::JoinHandle<()>> = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown signal received, closing listener and live connections");
                for conn in connections {
                    conn.abort();
                }
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        backoff = INITIAL_BACKOFF;
                        debug!(%peer, "accepted connection");
                        let facade = Arc::clone(&facade);
                        connections.retain(|h| !h.is_finished());
                        connections.push(tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, facade).await {
                                warn!(%peer, error = %err, "connection ended with error");
                            }
                        }));
                    }
                    Err(err) if is_transient(&err) => {
                        warn!(error = %err, delay_ms = backoff.as_millis() as u64, "transient accept error, backing off");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                    Err(err) => {
                        error!(error = %err, "permanent accept error, stopping server");
                        return Err(err);
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, facade: Arc<Facade>) -> std::io::Result<()> {
    let (mut read_half, write_half): (ReadHalf<TcpStream>, WriteHalf<TcpStream>) =
        tokio::io::split(stream);

    let (tx, mut rx) = mpsc::channel::<ResponseFrame>(64);
    let writer = tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(frame) = rx.recv().await {
            if write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    loop {
        let frame: Option<RequestFrame> = match read_frame(&mut read_half).await {
            Ok(frame) => frame,
            Err(_) => break,
        };
        let Some(frame) = frame else { break };

        let facade = Arc::clone(&facade);
        let tx = tx.clone();
        tokio::spawn(async move {
            let id = frame.id;
            let result = tokio::task::spawn_blocking(move || dispatch(&facade, frame.request))
                .await
                .unwrap_or_else(|_| Err(WireError::Backend("dispatch task panicked".to_string())));
            let _ = tx.send(ResponseFrame { id, result }).await;
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_aborted_is_transient_addr_in_use_is_not() {
        assert!(is_transient(&std::io::Error::from(
            std::io::ErrorKind::ConnectionAborted
        )));
        assert!(!is_transient(&std::io::Error::from(
            std::io::ErrorKind::AddrInUse
        )));
    }
}
