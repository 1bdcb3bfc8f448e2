use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;

#[derive(Debug, thiserror::Error)]
pub enum IpcServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IpcServerError>;

/// Serves a [`Dispatcher`] on a Unix socket, one JSON message per line.
///
/// Requests on one connection are dispatched concurrently, so responses may
/// be written in a different order than the requests arrived.
pub struct IpcServer {
    socket_path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub fn new(socket_path: impl Into<PathBuf>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            socket_path: socket_path.into(),
            dispatcher,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop accepting and close connections once `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind, replacing a stale socket file.
    pub fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("IPC server listening on {}", self.socket_path.display());
        Ok(listener)
    }

    pub async fn start(self: Arc<Self>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(self: Arc<Self>, listener: UnixListener) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream).await {
                                tracing::error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        drop(listener);
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!("Could not remove socket file: {}", e);
        }
        tracing::info!("IPC server stopped");
        Ok(())
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        tracing::debug!("New client connected");

        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut writer = BufWriter::new(write_half);

        let (tx, mut rx) = mpsc::channel::<String>(100);
        let mut tx = Some(tx);

        loop {
            tokio::select! {
                line = lines.next_line(), if tx.is_some() => {
                    match line {
                        Ok(Some(line)) if line.trim().is_empty() => continue,
                        Ok(Some(line)) => {
                            if let Some(tx) = tx.clone() {
                                let dispatcher = self.dispatcher.clone();
                                tokio::spawn(async move {
                                    let response = dispatcher.handle_raw(line.trim()).await;
                                    let _ = tx.send(response).await;
                                });
                            }
                        }
                        Ok(None) => {
                            tracing::debug!("Client disconnected");
                            tx = None;
                        }
                        Err(e) => {
                            tracing::error!("Failed to read request: {}", e);
                            tx = None;
                        }
                    }
                }
                _ = self.shutdown.cancelled(), if tx.is_some() => {
                    // Stop reading; responses already in progress still go out
                    tx = None;
                }
                response = rx.recv() => {
                    let Some(response) = response else { break };
                    if let Err(e) = Self::write_line(&mut writer, &response).await {
                        tracing::warn!("Failed to write response: {}", e);
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn write_line(writer: &mut BufWriter<OwnedWriteHalf>, line: &str) -> Result<()> {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MethodRegistry;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("stale.sock");
        std::fs::write(&socket_path, b"").unwrap();

        let dispatcher = Arc::new(Dispatcher::new(MethodRegistry::new()));
        let server = IpcServer::new(&socket_path, dispatcher);
        let _listener = server.bind().unwrap();
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("stop.sock");
        let token = CancellationToken::new();

        let dispatcher = Arc::new(Dispatcher::new(MethodRegistry::new()));
        let server =
            Arc::new(IpcServer::new(&socket_path, dispatcher).with_shutdown(token.clone()));
        let listener = server.bind().unwrap();
        let handle = tokio::spawn(server.serve(listener));

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }
}
