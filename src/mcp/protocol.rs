//! JSON-RPC 2.0 framing for the MCP bridge.
//!
//! Incoming lines are either requests (with an `id`, answered exactly once)
//! or notifications (no `id`, never answered). Outgoing messages are always
//! responses: a `result` or an `error`, never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version offered when the client asks for one we don't know.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol versions the bridge can speak. Only tools are used, and their
/// shape is the same in all of them.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Server name reported during initialisation.
pub const SERVER_NAME: &str = "cad-bridge-mcp";

/// Picks the version to answer `initialize` with.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// A request id: a string or an integer, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A decoded incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Expects a response.
    Request {
        /// Request id.
        id: RequestId,
        /// Method name.
        method: String,
        /// Parameters, if any.
        params: Option<Value>,
    },
    /// Expects nothing back.
    Notification {
        /// Method name.
        method: String,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Decodes one line.
///
/// # Errors
///
/// Returns a ready-to-send error response for invalid JSON (parse error) or
/// a message that is not a JSON-RPC 2.0 request or notification (invalid
/// request).
pub fn parse_message(line: &str) -> Result<Incoming, Response> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        Response::error(None, RpcError::new(ErrorCode::ParseError, format!("Parse error: {e}")))
    })?;
    let raw: RawMessage = serde_json::from_value(value)
        .map_err(|_| Response::error(None, RpcError::from_code(ErrorCode::InvalidRequest)))?;

    let id = match raw.id {
        None => None,
        Some(id) => Some(serde_json::from_value::<RequestId>(id).map_err(|_| {
            Response::error(
                None,
                RpcError::new(ErrorCode::InvalidRequest, "id must be a string or an integer"),
            )
        })?),
    };
    if raw.jsonrpc != "2.0" || raw.method.is_empty() {
        return Err(Response::error(id, RpcError::from_code(ErrorCode::InvalidRequest)));
    }

    Ok(match id {
        Some(id) => Incoming::Request {
            id,
            method: raw.method,
            params: raw.params,
        },
        None => Incoming::Notification { method: raw.method },
    })
}

/// Standard JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON.
    ParseError,
    /// Not a valid request object.
    InvalidRequest,
    /// Unknown method.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal error.
    InternalError,
}

impl ErrorCode {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// The `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    /// Numeric code.
    pub code: i32,
    /// Message.
    pub message: String,
}

impl RpcError {
    /// An error with a custom message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    /// An error with the code's standard message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }
}

/// Result or error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Success.
    Result(Value),
    /// Failure.
    Error(RpcError),
}

/// An outgoing response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Id of the request, `null` if it could not be determined.
    pub id: Option<RequestId>,
    /// Result or error.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    /// A success response.
    #[must_use]
    pub const fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    /// An error response.
    #[must_use]
    pub const fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: Outcome::Error(error),
        }
    }

    /// Whether this is an error response.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}
