//! Unix domain socket transport
//!
//! Newline-delimited JSON over one shared connection. A background reader task
//! routes each response line to the caller waiting on it, so any number of
//! calls may be in flight at once and complete in any order.
//!
//! Callers may share one transport and reuse ids, so the connection puts its
//! own sequence number on the wire and restores the caller's id on the reply.

use super::Transport;
use crate::error::TransportError;
use async_trait::async_trait;
use chainrpc_core::{Request, RequestId, Response};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Reply = Result<Response, TransportError>;

struct Waiter {
    /// Id the caller chose
    id: RequestId,
    tx: oneshot::Sender<Reply>,
}

struct Pending {
    open: bool,
    next_seq: u64,
    waiters: HashMap<u64, Waiter>,
}

fn lock(pending: &StdMutex<Pending>) -> MutexGuard<'_, Pending> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes a waiter when its call finishes or is dropped
struct WaiterGuard<'a> {
    pending: &'a StdMutex<Pending>,
    seq: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).waiters.remove(&self.seq);
    }
}

/// Live connection state
struct Connection {
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    pending: Arc<StdMutex<Pending>>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct UnixSocketTransport {
    socket_path: PathBuf,
    timeout: Option<Duration>,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl UnixSocketTransport {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: None,
            connection: Mutex::new(None),
        }
    }

    /// Fail a call with [`TransportError::Timeout`] if no response arrives in time
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Calls waiting for a response on the current connection
    pub async fn pending_calls(&self) -> usize {
        match *self.connection.lock().await {
            Some(ref conn) => lock(&conn.pending).waiters.len(),
            None => 0,
        }
    }

    /// Return the shared connection, establishing it if there is none or the
    /// previous one was closed.
    async fn connection(&self) -> Result<Arc<Connection>, TransportError> {
        let mut slot = self.connection.lock().await;

        if let Some(conn) = slot.as_ref() {
            if lock(&conn.pending).open {
                return Ok(conn.clone());
            }
            debug!(
                path = %self.socket_path.display(),
                "Previous connection closed, reconnecting"
            );
        }

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| {
                TransportError::Connect(format!("{}: {}", self.socket_path.display(), e))
            })?;
        let (read_half, write_half) = stream.into_split();

        let pending = Arc::new(StdMutex::new(Pending {
            open: true,
            next_seq: 1,
            waiters: HashMap::new(),
        }));
        let reader = tokio::spawn(read_responses(read_half, pending.clone()));

        let conn = Arc::new(Connection {
            writer: Mutex::new(BufWriter::new(write_half)),
            pending,
            reader,
        });
        *slot = Some(conn.clone());

        debug!(path = %self.socket_path.display(), "Connected");
        Ok(conn)
    }

    async fn forget(&self, conn: &Arc<Connection>) {
        let mut slot = self.connection.lock().await;
        let current = slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, conn));
        if current {
            *slot = None;
        }
    }
}

/// Sequence number a response carries, if it is one we sent
fn wire_seq(id: &RequestId) -> Option<u64> {
    match *id {
        RequestId::Number(n) if n > 0 => Some(n as u64),
        _ => None,
    }
}

/// Hand a response to its waiter.
///
/// A null id cannot be matched. With a single call in flight it must be that
/// call's answer; with several, none of them can trust the connection.
fn route(pending: &mut Pending, mut response: Response) {
    if let Some(seq) = wire_seq(&response.id) {
        match pending.waiters.remove(&seq) {
            Some(waiter) => {
                response.id = waiter.id;
                let _ = waiter.tx.send(Ok(response));
            }
            None => warn!(seq, "Response for unknown request"),
        }
        return;
    }

    if response.id != RequestId::Null {
        warn!(id = %response.id, "Response with foreign id");
        return;
    }

    match pending.waiters.len() {
        0 => warn!("Null-id response with no call in flight"),
        1 => {
            for (_, waiter) in pending.waiters.drain() {
                let _ = waiter.tx.send(Ok(response.clone()));
            }
        }
        n => {
            let detail = match response.error {
                Some(ref e) => e.to_string(),
                None => "no error".to_string(),
            };
            warn!("Null-id response with {} calls in flight: {}", n, detail);
            for (_, waiter) in pending.waiters.drain() {
                let _ = waiter.tx.send(Err(TransportError::Decode(format!(
                    "server answered with a null id while {} calls were pending ({})",
                    n, detail
                ))));
            }
        }
    }
}

/// Reader task: route each line to its waiter until the stream ends.
async fn read_responses(read_half: OwnedReadHalf, pending: Arc<StdMutex<Pending>>) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Err(e) => {
                warn!("Error reading from socket: {}", e);
                break;
            }
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response: Response = match serde_json::from_str(trimmed) {
            Ok(response) => response,
            Err(e) => {
                warn!("Discarding malformed response line: {}", e);
                continue;
            }
        };

        route(&mut lock(&pending), response);
    }

    // Dropping the senders fails every outstanding call with Closed
    let mut pending = lock(&pending);
    pending.open = false;
    pending.waiters.clear();
    debug!("Connection closed");
}

#[async_trait]
impl Transport for UnixSocketTransport {
    async fn send(&self, mut request: Request) -> Result<Response, TransportError> {
        let conn = self.connection().await?;

        let (tx, rx) = oneshot::channel();
        let seq = {
            let mut pending = lock(&conn.pending);
            if !pending.open {
                return Err(TransportError::Closed);
            }
            let seq = pending.next_seq;
            pending.next_seq += 1;
            pending.waiters.insert(
                seq,
                Waiter {
                    id: request.id.clone(),
                    tx,
                },
            );
            seq
        };
        let _guard = WaiterGuard {
            pending: &conn.pending,
            seq,
        };

        debug!(method = %request.method, id = %request.id, seq, "Sending request");
        request.id = RequestId::from(seq);
        let line = serde_json::to_string(&request)?;

        let written = {
            let mut writer = conn.writer.lock().await;
            async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            .await
        };

        if let Err(e) = written {
            self.forget(&conn).await;
            warn!("Write to socket failed: {}", e);
            return Err(TransportError::Closed);
        }

        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => rx.await,
        };

        outcome.unwrap_or(Err(TransportError::Closed))
    }
}
