//! Self-Healing Client (C11): a caller that transparently reconnects and
//! retries once on transport failure (§4.11).
//!
//! Every call acquires the transport's read lock, multiplexes its request
//! over the shared connection by correlation id, and awaits the matching
//! response. On a transport failure the client reconnects — swapping the
//! connection under the write lock, a critical section kept to the pointer
//! assignment — and retries exactly once more; a second failure is
//! surfaced to the caller (§5, "Retry plumbing").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use stratakv_core::{DeleteOptions, Error as CoreError, GetOptions, Node, Result as CoreResult, SetOptions};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex, RwLock};
use tracing::warn;

use crate::framing::{read_frame, write_frame};
use crate::protocol::{Request, RequestFrame, Response, ResponseFrame};

/// Maximum call attempts: the first try plus exactly one retry after a
/// reconnect.
const MAX_ATTEMPTS: u32 = 2;
/// Linear backoff between attempts.
const RETRY_DELAY: Duration = Duration::from_millis(200);

type Pending = Arc<DashMap<u64, oneshot::Sender<ResponseFrame>>>;

/// One live connection: its write half (serialized behind an async mutex,
/// since several read-lock holders may call concurrently) and the
/// background task that demultiplexes responses by id.
struct Transport {
    write_half: AsyncMutex<WriteHalf<TcpStream>>,
    pending: Pending,
    reader_task: tokio::task::JoinHandle<()>,
    next_id: AtomicU64,
}

impl Transport {
    async fn dial(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (mut read_half, write_half): (ReadHalf<TcpStream>, WriteHalf<TcpStream>) =
            tokio::io::split(stream);
        let pending: Pending = Arc::new(DashMap::new());
        let reader_pending = Arc::clone(&pending);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame::<_, ResponseFrame>(&mut read_half).await {
                    Ok(Some(frame)) => {
                        if let Some((_, tx)) = reader_pending.remove(&frame.id) {
                            let _ = tx.send(frame);
                        }
                    }
                    _ => break,
                }
            }
        });
        Ok(Transport {
            write_half: AsyncMutex::new(write_half),
            pending,
            reader_task,
            next_id: AtomicU64::new(0),
        })
    }

    async fn call_once(&self, request: Request) -> Result<Response, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = RequestFrame { id, request };
        {
            let mut write_half = self.write_half.lock().await;
            if let Err(err) = write_frame(&mut *write_half, &frame).await {
                self.pending.remove(&id);
                return Err(ClientError::Transport(err.to_string()));
            }
        }

        match rx.await {
            Ok(response_frame) => response_frame
                .result
                .map_err(ClientError::Remote),
            Err(_) => Err(ClientError::Transport(
                "connection closed before a response arrived".to_string(),
            )),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Errors a single call attempt can fail with, before retry policy applies.
#[derive(Debug)]
enum ClientError {
    Transport(String),
    Remote(crate::protocol::WireError),
}

/// A connected, self-reconnecting client for the remote KVDB protocol.
pub struct Client {
    addr: String,
    transport: RwLock<Transport>,
}

impl Client {
    /// Dial `addr` and build a client around the connection.
    pub async fn connect(addr: impl Into<String>) -> std::io::Result<Self> {
        let addr = addr.into();
        let transport = Transport::dial(&addr).await?;
        Ok(Client {
            addr,
            transport: RwLock::new(transport),
        })
    }

    /// Reconnect, swapping the transport under the write lock. The critical
    /// section is exactly the pointer assignment (§9, "Retry plumbing").
    async fn reconnect(&self) -> std::io::Result<()> {
        let fresh = Transport::dial(&self.addr).await?;
        let mut guard = self.transport.write().await;
        *guard = fresh;
        Ok(())
    }

    /// Invoke `request`, retrying once (after a reconnect) on a transport
    /// failure. A remote façade error never triggers a retry.
    async fn call(&self, request: Request) -> CoreResult<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = {
                let guard = self.transport.read().await;
                guard.call_once(request.clone()).await
            };
            match outcome {
                Ok(response) => return Ok(response),
                Err(ClientError::Remote(err)) => return Err(err.into()),
                Err(ClientError::Transport(msg)) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CoreError::Transport(msg));
                    }
                    warn!(error = %msg, "transport call failed, reconnecting and retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    if let Err(io_err) = self.reconnect().await {
                        return Err(CoreError::Transport(io_err.to_string()));
                    }
                }
            }
        }
    }

    /// Fetch a single node, optionally with a page of its children.
    pub async fn get(&self, key: &str, opts: &GetOptions) -> CoreResult<Option<Node>> {
        let response = self
            .call(Request::Get {
                key: key.to_string(),
                getter: opts.into(),
            })
            .await?;
        match response {
            Response::Get(node) => Ok(node.map(Into::into)),
            _ => unreachable!("server returned the wrong response variant for Get"),
        }
    }

    /// Fetch several nodes in one call, omitting absent keys from the map.
    pub async fn get_multi(
        &self,
        keys: &[String],
        opts: &GetOptions,
    ) -> CoreResult<HashMap<String, Node>> {
        let response = self
            .call(Request::GetMulti {
                keys: keys.to_vec(),
                getter: opts.into(),
            })
            .await?;
        match response {
            Response::GetMulti(nodes) => {
                Ok(nodes.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            _ => unreachable!("server returned the wrong response variant for GetMulti"),
        }
    }

    /// Create or replace a single node.
    pub async fn set(&self, key: &str, value: &str, opts: &SetOptions) -> CoreResult<()> {
        self.call(Request::Set {
            key: key.to_string(),
            value: value.to_string(),
            setter: opts.into(),
        })
        .await?;
        Ok(())
    }

    /// Create or replace many nodes atomically.
    pub async fn set_multi(&self, pairs: &[String], opts: &SetOptions) -> CoreResult<()> {
        self.call(Request::SetMulti {
            kv_pairs: pairs.to_vec(),
            setter: opts.into(),
        })
        .await?;
        Ok(())
    }

    /// Delete a single key. A nonexistent key is success.
    pub async fn delete(&self, key: &str, opts: &DeleteOptions) -> CoreResult<()> {
        self.call(Request::Delete {
            key: key.to_string(),
            deleter: opts.into(),
        })
        .await?;
        Ok(())
    }

    /// Delete several keys in one call. An empty list is a no-op.
    pub async fn delete_multi(&self, keys: &[String], opts: &DeleteOptions) -> CoreResult<()> {
        self.call(Request::DeleteMulti {
            keys: keys.to_vec(),
            deleter: opts.into(),
        })
        .await?;
        Ok(())
    }

    /// Test for presence.
    pub async fn exists(&self, key: &str) -> CoreResult<bool> {
        let response = self
            .call(Request::Exists {
                key: key.to_string(),
            })
            .await?;
        match response {
            Response::Exists(has) => Ok(has),
            _ => unreachable!("server returned the wrong response variant for Exists"),
        }
    }

    /// Force a full, synchronous sweep of expired nodes on the server.
    pub async fn cleanup(&self) -> CoreResult<()> {
        self.call(Request::Cleanup).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireError;

    #[test]
    fn transport_errors_are_distinguished_from_remote_errors() {
        let transport_err = ClientError::Transport("reset".to_string());
        let remote_err = ClientError::Remote(WireError::AlreadyClosed);
        assert!(matches!(transport_err, ClientError::Transport(_)));
        assert!(matches!(remote_err, ClientError::Remote(_)));
    }
}
