//! The stdio MCP bridge.
//!
//! Lifecycle:
//!
//! 1. **Initialisation**: `initialize` negotiates the protocol version, then
//!    `notifications/initialized` moves the bridge to running
//! 2. **Operation**: `tools/list` is answered from the built-in registry and
//!    `tools/call` is forwarded to the tool server over TCP
//! 3. **Shutdown**: end of input or SIGINT/SIGTERM (Ctrl+C on Windows)
//!
//! The bridge holds no CAD state of its own. Every tool call is a fresh TCP
//! round trip, so the tool server may be restarted while a client is
//! attached.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::mcp::protocol::{
    negotiate_version, parse_message, ErrorCode, Incoming, RequestId, Response, RpcError,
    SERVER_NAME,
};
use crate::mcp::transport::{LineTransport, StdioTransport};
use crate::tcp::ToolClient;
use crate::tools::ToolDefinition;

/// Bridge state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for `initialize`.
    AwaitingInit,
    /// `initialize` answered, waiting for `notifications/initialized`.
    Initialising,
    /// Serving tool requests.
    Running,
    /// Input closed or a signal arrived.
    ShuttingDown,
}

/// Capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool capabilities.
    pub tools: ToolCapabilities,
}

/// Tool capabilities. The tool list is fixed for the life of the process.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Always false.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: &'static str,
    /// Server version.
    pub version: &'static str,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters of `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: String,
    /// Client capabilities (unused).
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

/// One content block of a tool call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text.
        text: String,
    },
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// Set when the tool reported failure.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Wraps a tool server envelope as pretty-printed text. A missing or
    /// false `success` marks the result as an error.
    #[must_use]
    pub fn from_envelope(envelope: &Value) -> Self {
        let text = serde_json::to_string_pretty(envelope).unwrap_or_else(|_| envelope.to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: envelope.get("success").and_then(Value::as_bool) != Some(true),
        }
    }

    /// An error result for a call that never reached the tool server.
    #[must_use]
    pub fn transport_failure(error: &TransportError) -> Self {
        let message = match error {
            TransportError::Connect { .. } => {
                format!("{error}. Is the tool server running? Start it with `cad-bridge-mcp serve`")
            }
            _ => error.to_string(),
        };
        Self::from_envelope(&json!({ "success": false, "error": message }))
    }
}

/// The MCP bridge.
#[derive(Debug)]
pub struct McpServer {
    state: ServerState,
    client: ToolClient,
    tools: Vec<ToolDefinition>,
    protocol_version: Option<&'static str>,
}

impl McpServer {
    /// Creates a bridge that advertises `tools` and forwards calls through
    /// `client`.
    #[must_use]
    pub const fn new(client: ToolClient, tools: Vec<ToolDefinition>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            client,
            tools,
            protocol_version: None,
        }
    }

    /// The current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// The negotiated protocol version, once initialised.
    #[must_use]
    pub const fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version
    }

    /// Serves stdin/stdout until input closes or a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if stdio fails or signal handlers cannot be
    /// installed.
    pub async fn run(&mut self) -> io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.run_with_shutdown(&mut transport).await
    }

    /// Serves `transport` until its input closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub async fn serve<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line = transport.read_line().await;
            if self.handle_transport_result(line, transport).await? {
                return Ok(());
            }
        }
    }

    #[cfg(unix)]
    async fn run_with_shutdown<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }
                line = transport.read_line() => {
                    if self.handle_transport_result(line, transport).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    #[cfg(windows)]
    async fn run_with_shutdown<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, shutting down");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }
                line = transport.read_line() => {
                    if self.handle_transport_result(line, transport).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns `true` once the bridge should stop.
    async fn handle_transport_result<R, W>(
        &mut self,
        line: io::Result<Option<String>>,
        transport: &mut LineTransport<R, W>,
    ) -> io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(line) = line? else {
            debug!("Input closed");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };
        if line.trim().is_empty() {
            return Ok(false);
        }
        if let Some(response) = self.handle_line(&line).await {
            transport.write_message(&response).await?;
        }
        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles one input line. Returns the response to send, or `None` for
    /// notifications.
    pub async fn handle_line(&mut self, line: &str) -> Option<Response> {
        match parse_message(line) {
            Ok(Incoming::Request { id, method, params }) => {
                Some(self.handle_request(id, &method, params).await)
            }
            Ok(Incoming::Notification { method }) => {
                self.handle_notification(&method);
                None
            }
            Err(response) => {
                warn!("Received an invalid message");
                Some(response)
            }
        }
    }

    async fn handle_request(
        &mut self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
    ) -> Response {
        debug!(%id, method, "Request received");
        let outcome = match method {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::new(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            )),
        };
        match outcome {
            Ok(result) => Response::result(id, result),
            Err(error) => Response::error(Some(id), error),
        }
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" if self.state == ServerState::Initialising => {
                info!("Client initialised");
                self.state = ServerState::Running;
            }
            _ => debug!(method, "Ignoring notification"),
        }
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, RpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(RpcError::new(
                ErrorCode::InvalidRequest,
                "Server already initialised",
            ));
        }
        let params: InitializeParams = params
            .ok_or_else(|| RpcError::new(ErrorCode::InvalidParams, "Missing initialize params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    RpcError::new(
                        ErrorCode::InvalidParams,
                        format!("Invalid initialize params: {e}"),
                    )
                })
            })?;

        let version = negotiate_version(&params.protocol_version);
        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                protocol_version = version,
                "Initialising"
            );
        }
        self.protocol_version = Some(version);
        self.state = ServerState::Initialising;

        let capabilities = ServerCapabilities {
            tools: ToolCapabilities::default(),
        };
        Ok(json!({
            "protocolVersion": version,
            "capabilities": capabilities,
            "serverInfo": ServerInfo::default(),
        }))
    }

    fn handle_tools_list(&self) -> Result<Value, RpcError> {
        self.require_running()?;
        Ok(json!({ "tools": self.tools }))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, RpcError> {
        self.require_running()?;
        let params: ToolCallParams = params
            .ok_or_else(|| RpcError::new(ErrorCode::InvalidParams, "Missing tool call params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    RpcError::new(
                        ErrorCode::InvalidParams,
                        format!("Invalid tool call params: {e}"),
                    )
                })
            })?;
        let arguments = match params.arguments {
            Value::Null => json!({}),
            args @ Value::Object(_) => args,
            _ => {
                return Err(RpcError::new(
                    ErrorCode::InvalidParams,
                    "Tool arguments must be an object",
                ))
            }
        };

        let result = match self.client.call(&params.name, arguments).await {
            Ok(envelope) => ToolCallResult::from_envelope(&envelope),
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool call not delivered");
                ToolCallResult::transport_failure(&e)
            }
        };
        serde_json::to_value(&result).map_err(|e| {
            RpcError::new(
                ErrorCode::InternalError,
                format!("Could not serialise tool result: {e}"),
            )
        })
    }

    fn require_running(&self) -> Result<(), RpcError> {
        if self.state == ServerState::Running {
            Ok(())
        } else {
            Err(RpcError::new(
                ErrorCode::InvalidRequest,
                "Server not initialised",
            ))
        }
    }
}
