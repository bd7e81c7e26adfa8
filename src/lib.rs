//! cad-bridge-mcp: owner-thread command bridge for AI-driven CAD viewports
//!
//! This library exposes a CAD host's document and viewport to AI assistants
//! over a line-delimited JSON tool protocol, plus a stdio MCP front end that
//! forwards to it.
//!
//! # Architecture
//!
//! The host's document and viewport state may only be touched from a single
//! owner thread. Requests arrive on other threads and are marshalled across:
//!
//! - **Executor**: runs work items on the owner thread, blocking the caller
//!   until completion or timeout
//! - **Dispatcher**: validates `{name, arguments}` calls against a static tool
//!   registry and runs them through the executor
//! - **Measurement**: grid-based point picking, confirmation and distance
//!   measurement driven by coarse cell references
//! - **Transport**: TCP tool server and stdio MCP bridge
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`executor`]: Owner-thread executor
//! - [`host`]: Host abstraction and the bundled simulated host
//! - [`measure`]: Grid and measurement state machine
//! - [`tools`]: Tool registry and handlers
//! - [`dispatcher`]: Tool call dispatch
//! - [`tcp`]: Line-delimited JSON tool server and client
//! - [`mcp`]: MCP protocol implementation
//! - [`session`]: Owner-thread state handed to tool handlers
//! - [`render`]: Image helpers shared by the host and the overlay
//! - [`diagnostics`]: Counters for timeouts and degraded paths

pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod host;
pub mod mcp;
pub mod measure;
pub mod render;
pub mod session;
pub mod tcp;
pub mod tools;
