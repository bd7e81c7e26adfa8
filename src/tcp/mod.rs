//! Line-delimited JSON over TCP.
//!
//! The tool server accepts one request per connection:
//!
//! ```text
//! client ──► {"tool": "select_point", "arguments": {"grid_cell": "C3"}}\n
//! client ◄── {"success": true, "point_id": "point_1", ...}\n
//! ```
//!
//! Connections are handled one at a time. The stdio bridge talks to the
//! server with [`ToolClient`].

mod client;
mod server;

pub use client::ToolClient;
pub use server::{ServerHandle, TcpServer};
