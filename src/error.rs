//! Error types for cad-bridge-mcp.
//!
//! Tool-level failures ([`ToolError`]) are always reported to the client as
//! `{"success": false, "error": ...}` and never tear down a connection.
//! [`ExecutorError`] covers the owner-thread hop itself.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::host::HostError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while marshalling work onto the owner thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The owner thread did not complete the operation in time.
    #[error("operation timed out after {} seconds", .timeout.as_secs_f64())]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The owner thread has exited and no longer accepts work.
    #[error("owner thread is not running")]
    OwnerGone,

    /// The calling thread is already bound as an owner thread.
    #[error("current thread already owns an executor context")]
    OwnerAlreadyBound,

    /// A queued operation tried to run another operation synchronously.
    #[error("re-entrant call while the owner context is in use")]
    Reentrant,

    /// The operation body panicked on the owner thread.
    #[error("operation panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

/// Errors produced by tool handlers.
///
/// The `Display` text is what the client sees in the `error` field.
#[derive(Error, Debug)]
pub enum ToolError {
    /// A required argument was not supplied.
    #[error("Missing required parameter: {name}")]
    MissingArgument {
        /// Argument name.
        name: String,
    },

    /// An argument was supplied with the wrong type or value.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// Description of what's wrong.
        message: String,
    },

    /// A grid-cell reference could not be parsed or is out of bounds.
    #[error("Invalid grid cell '{cell}': {message}")]
    InvalidCell {
        /// The cell reference as given.
        cell: String,
        /// Description of what's wrong.
        message: String,
    },

    /// An operation's precondition does not hold in the current state.
    #[error("{0}")]
    State(String),

    /// A referenced point, document or object does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A pick ray did not hit any geometry.
    #[error("No surface at grid cell {cell}: the pick ray hit nothing")]
    NoSurface {
        /// The cell that was picked.
        cell: String,
    },

    /// The host rejected the operation.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ToolError {
    /// Creates an invalid argument error.
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A tool registry entry is inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two tools share a name.
    #[error("tool '{0}' is registered twice")]
    DuplicateTool(String),

    /// An argument declaration is invalid.
    #[error("tool '{tool}', argument '{argument}': {message}")]
    InvalidArgument {
        /// Tool name.
        tool: String,
        /// Argument name.
        argument: String,
        /// Description of what's wrong.
        message: String,
    },
}

/// Errors talking to the TCP tool server.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The tool server could not be reached.
    #[error("tool server not reachable at {address}: {source}")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the connection failed.
    #[error("tool server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool server did not answer in time.
    #[error("tool server did not respond within {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// The tool server closed the connection without a response line.
    #[error("tool server closed the connection without responding")]
    EmptyResponse,

    /// The response line was not valid JSON.
    #[error("malformed response from tool server")]
    MalformedResponse(#[source] serde_json::Error),
}
