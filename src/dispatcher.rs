//! Tool dispatch.
//!
//! Turns a decoded request into exactly one [`ToolResult`]. Nothing that
//! goes wrong here escapes as an error: unknown tools, bad arguments,
//! handler failures, timeouts and panics all become
//! `{"success": false, "error": ...}`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::executor::Executor;
use crate::session::Session;
use crate::tools::{self, Arguments, LocalContext, ToolHandler, ToolRegistry, ToolResult};

/// A decoded request: a tool name and its raw arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Raw arguments.
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Creates a call.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Decodes a wire request `{"tool": ..., "arguments": {...}}`.
    ///
    /// `method` and `params` are accepted as aliases. Missing or `null`
    /// arguments mean no arguments.
    ///
    /// # Errors
    ///
    /// Returns a message if the request is not an object, has no tool name,
    /// or its arguments are not an object.
    pub fn from_wire(request: &Value) -> Result<Self, String> {
        let object = request
            .as_object()
            .ok_or_else(|| "Request must be a JSON object".to_string())?;
        let name = object
            .get("tool")
            .or_else(|| object.get("method"))
            .and_then(Value::as_str)
            .ok_or_else(|| "Request has no 'tool' name".to_string())?;
        let arguments = match object.get("arguments").or_else(|| object.get("params")) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err("'arguments' must be a JSON object".to_string()),
        };
        Ok(Self::new(name, arguments))
    }
}

/// Routes calls through the registry and onto the owner thread.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    executor: Executor<Session>,
    timeout: Duration,
}

/// What a call turned into before any owner-thread work.
enum Prepared {
    Done(ToolResult),
    Queue(Box<dyn FnOnce(&mut Session) -> ToolResult + Send>),
}

impl Dispatcher {
    /// Creates a dispatcher. `timeout` bounds each owner-thread hop.
    #[must_use]
    pub const fn new(
        registry: Arc<ToolRegistry>,
        executor: Executor<Session>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            timeout,
        }
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs a call, blocking the current thread while the owner thread
    /// works.
    #[must_use]
    pub fn dispatch(&self, call: ToolCall) -> ToolResult {
        match self.prepare(call) {
            Prepared::Done(result) => result,
            Prepared::Queue(job) => self
                .executor
                .execute_sync(job, self.timeout)
                .unwrap_or_else(|e| ToolResult::failure(e.to_string())),
        }
    }

    /// Runs a call without blocking the async runtime.
    pub async fn dispatch_async(&self, call: ToolCall) -> ToolResult {
        match self.prepare(call) {
            Prepared::Done(result) => result,
            Prepared::Queue(job) => self
                .executor
                .execute_async(job, self.timeout)
                .await
                .unwrap_or_else(|e| ToolResult::failure(e.to_string())),
        }
    }

    /// Decodes a wire request and runs it.
    pub async fn dispatch_value(&self, request: &Value) -> ToolResult {
        match ToolCall::from_wire(request) {
            Ok(call) => self.dispatch_async(call).await,
            Err(message) => ToolResult::failure(message),
        }
    }

    /// Parses one request line and runs it.
    pub async fn dispatch_line(&self, line: &str) -> ToolResult {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.dispatch_value(&request).await,
            Err(e) => ToolResult::failure(format!("Invalid JSON request: {e}")),
        }
    }

    fn prepare(&self, call: ToolCall) -> Prepared {
        let Some(spec) = self.registry.get(&call.name) else {
            debug!(tool = %call.name, "Unknown tool requested");
            return Prepared::Done(ToolResult::failure(format!("Unknown tool: {}", call.name)));
        };
        let args = match Arguments::resolve(spec.args, &call.arguments) {
            Ok(args) => args,
            Err(e) => return Prepared::Done(ToolResult::failure(e.to_string())),
        };
        debug!(tool = spec.name, "Dispatching tool call");

        match spec.handler {
            ToolHandler::Local(handler) => {
                let ctx = LocalContext {
                    registry: &self.registry,
                    diagnostics: self.executor.diagnostics(),
                };
                Prepared::Done(handler(&ctx, &args).into())
            }
            ToolHandler::Session(handler) => {
                let name = spec.name;
                let attach = spec.attach_snapshot;
                Prepared::Queue(Box::new(move |session: &mut Session| {
                    let mut result = ToolResult::from(handler(session, &args));
                    if result.success && attach && session.screenshot_settings().attach_to_results
                    {
                        attach_snapshot(session, &mut result, name);
                    }
                    result
                }))
            }
        }
    }
}

fn attach_snapshot(session: &mut Session, result: &mut ToolResult, tool: &str) {
    match tools::snapshot(session) {
        Ok(shot) => {
            result.payload.insert("screenshot".to_string(), shot);
        }
        Err(e) => {
            session.diagnostics().record_snapshot_failure();
            warn!(tool, error = %e, "Could not attach snapshot to result");
        }
    }
}
