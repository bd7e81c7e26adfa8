//! Model Context Protocol (MCP) front end.
//!
//! The `bridge` subcommand speaks JSON-RPC 2.0 over stdio to an AI client
//! and forwards every `tools/call` to the TCP tool server:
//!
//! ```text
//! AI client ──stdio──▶ McpServer ──TCP──▶ TcpServer ──▶ Dispatcher ──▶ owner thread
//! ```
//!
//! Tool results come back as a single text content block holding the
//! pretty-printed result envelope.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{Response, RpcError, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{LineTransport, StdioTransport};
