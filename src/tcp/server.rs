//! The tool server.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::tools::ToolResult;

/// Serves tool calls over TCP, one connection at a time.
#[derive(Debug, Clone)]
pub struct TcpServer {
    dispatcher: Dispatcher,
    read_timeout: Duration,
    max_request_bytes: usize,
}

/// A running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    /// A connection already being handled is finished first.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task panicked.
    pub async fn close(self) -> Result<(), tokio::task::JoinError> {
        // The loop may already have exited on its own.
        let _ = self.shutdown.send(true);
        self.join.await
    }
}

enum Request {
    Line(String),
    Empty,
    Rejected(String),
}

impl TcpServer {
    /// Creates a server for `dispatcher` with limits from `config`.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher, config: &ServerConfig) -> Self {
        Self {
            dispatcher,
            read_timeout: config.read_timeout(),
            max_request_bytes: config.max_request_bytes,
        }
    }

    /// Binds `address` and serves on a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(self, address: &str) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        info!(%local_addr, "Tool server listening");
        let join = tokio::spawn(self.serve(listener, shutdown_rx));
        Ok(ServerHandle {
            local_addr,
            shutdown,
            join,
        })
    }

    /// Accepts connections until `shutdown` turns true or its sender is
    /// dropped.
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Connection accepted");
                        self.handle_connection(stream).await;
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
        info!("Tool server stopped");
    }

    async fn handle_connection(&self, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let request = match tokio::time::timeout(self.read_timeout, self.read_request(read_half))
            .await
        {
            Ok(Ok(request)) => request,
            Ok(Err(e)) => Request::Rejected(format!("Could not read request: {e}")),
            Err(_) => Request::Rejected(format!(
                "No request received within {} seconds",
                self.read_timeout.as_secs()
            )),
        };

        let result = match request {
            Request::Empty => {
                debug!("Connection closed without a request");
                return;
            }
            Request::Rejected(message) => {
                warn!(%message, "Rejecting request");
                ToolResult::failure(message)
            }
            Request::Line(line) => self.dispatcher.dispatch_line(&line).await,
        };

        let mut response = result.to_line();
        response.push('\n');
        if let Err(e) = write_half.write_all(response.as_bytes()).await {
            debug!(error = %e, "Could not write response");
            return;
        }
        let _ = write_half.shutdown().await;
    }

    async fn read_request(&self, read_half: tokio::net::tcp::OwnedReadHalf) -> io::Result<Request> {
        let limit = u64::try_from(self.max_request_bytes).unwrap_or(u64::MAX);
        // Room for the terminator plus one byte to detect overflow.
        let mut reader = BufReader::new(read_half.take(limit.saturating_add(2)));
        let mut buf = Vec::new();
        reader.read_until(b'\n', &mut buf).await?;

        if buf.strip_suffix(b"\n").unwrap_or(&buf[..]).len() > self.max_request_bytes {
            return Ok(Request::Rejected(format!(
                "Request exceeds {} bytes",
                self.max_request_bytes
            )));
        }
        let Ok(text) = String::from_utf8(buf) else {
            return Ok(Request::Rejected("Request is not valid UTF-8".to_string()));
        };
        let line = text.trim();
        if line.is_empty() {
            return Ok(Request::Empty);
        }
        Ok(Request::Line(line.to_string()))
    }
}
