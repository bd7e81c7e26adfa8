//! Client side of the tool server protocol.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TransportError;

/// Sends tool calls to a tool server.
#[derive(Debug, Clone)]
pub struct ToolClient {
    address: String,
    timeout: Duration,
}

impl ToolClient {
    /// Creates a client for the server at `address`. `timeout` bounds each
    /// call from connect to response.
    #[must_use]
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    /// The server address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Calls `tool` and returns the decoded response envelope.
    ///
    /// # Errors
    ///
    /// Fails if the server cannot be reached, does not answer in time,
    /// closes without answering, or answers with something that is not JSON.
    pub async fn call(&self, tool: &str, arguments: Value) -> Result<Value, TransportError> {
        tokio::time::timeout(self.timeout, self.exchange(tool, arguments))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }

    async fn exchange(&self, tool: &str, arguments: Value) -> Result<Value, TransportError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| TransportError::Connect {
                address: self.address.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();

        let mut request = json!({ "tool": tool, "arguments": arguments }).to_string();
        request.push('\n');
        write_half.write_all(request.as_bytes()).await?;
        debug!(tool, address = %self.address, "Request sent");

        let mut line = String::new();
        BufReader::new(read_half).read_line(&mut line).await?;
        if line.trim().is_empty() {
            return Err(TransportError::EmptyResponse);
        }
        serde_json::from_str(line.trim()).map_err(TransportError::MalformedResponse)
    }
}
