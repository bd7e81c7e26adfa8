//! Tool registry.
//!
//! Every operation the bridge exposes is declared once as a [`ToolSpec`]:
//! its name, its argument schema and its handler. The registry is built
//! and validated at startup; the dispatcher only ever looks tools up by
//! name.
//!
//! Most handlers run on the owner thread against the [`Session`]. A few
//! ([`ToolHandler::Local`]) only read the registry or the diagnostics and
//! are answered on the calling thread.

pub mod args;
mod document;
mod measurement;
mod screenshot;
mod system;

pub use args::{ArgDefault, ArgKind, ArgSpec, Arguments};
pub use screenshot::snapshot;

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::diagnostics::Diagnostics;
use crate::error::{RegistryError, ToolError};
use crate::session::Session;

/// Operation-specific fields of a successful result.
pub type Payload = Map<String, Value>;

/// Result of a handler.
pub type HandlerResult = Result<Payload, ToolError>;

/// What a local handler can see.
#[derive(Debug, Clone, Copy)]
pub struct LocalContext<'a> {
    /// The registry the tool was found in.
    pub registry: &'a ToolRegistry,
    /// Process-wide counters.
    pub diagnostics: &'a Diagnostics,
}

/// How a tool is executed.
#[derive(Clone, Copy)]
pub enum ToolHandler {
    /// Runs on the owner thread with the session.
    Session(fn(&mut Session, &Arguments) -> HandlerResult),
    /// Runs on the calling thread.
    Local(fn(&LocalContext<'_>, &Arguments) -> HandlerResult),
}

impl std::fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(_) => f.write_str("Session"),
            Self::Local(_) => f.write_str("Local"),
        }
    }
}

/// Declaration of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Declared arguments.
    pub args: &'static [ArgSpec],
    /// The handler.
    pub handler: ToolHandler,
    /// Whether a successful result gets a viewport snapshot attached.
    pub attach_snapshot: bool,
}

impl ToolSpec {
    /// JSON Schema of the tool's arguments.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|a| (a.name.to_string(), a.schema()))
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// The definition advertised to clients.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            input_schema: self.input_schema(),
        }
    }
}

/// A tool definition as listed to clients.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Name-to-tool lookup, validated on construction.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// The bridge's built-in tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in declarations are inconsistent.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_specs(
            system::TOOLS
                .iter()
                .chain(document::TOOLS)
                .chain(measurement::TOOLS)
                .chain(screenshot::TOOLS)
                .copied(),
        )
    }

    /// Builds a registry from `specs`.
    ///
    /// # Errors
    ///
    /// Fails if two tools share a name, or an argument declaration is
    /// invalid (required with a default, default of the wrong type, or
    /// duplicated).
    pub fn from_specs(specs: impl IntoIterator<Item = ToolSpec>) -> Result<Self, RegistryError> {
        let mut names = HashSet::new();
        let mut tools = Vec::new();
        for spec in specs {
            if !names.insert(spec.name) {
                return Err(RegistryError::DuplicateTool(spec.name.to_string()));
            }
            let mut arg_names = HashSet::new();
            for arg in spec.args {
                let invalid = |message: String| RegistryError::InvalidArgument {
                    tool: spec.name.to_string(),
                    argument: arg.name.to_string(),
                    message,
                };
                if !arg_names.insert(arg.name) {
                    return Err(invalid("declared twice".to_string()));
                }
                arg.check().map_err(invalid)?;
            }
            tools.push(spec);
        }
        Ok(Self { tools })
    }

    /// Looks a tool up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tools.iter().map(|t| t.name)
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every tool.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolSpec::definition).collect()
    }
}

/// The response envelope: `{"success": true, ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operation-specific fields.
    #[serde(flatten)]
    pub payload: Payload,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn ok(mut payload: Payload) -> Self {
        payload.remove("success");
        payload.remove("error");
        Self {
            success: true,
            error: None,
            payload,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            payload: Payload::new(),
        }
    }

    /// The envelope as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = self.payload.clone();
        object.insert("success".to_string(), Value::Bool(self.success));
        if let Some(error) = &self.error {
            object.insert("error".to_string(), Value::String(error.clone()));
        }
        Value::Object(object)
    }

    /// The envelope as one line of JSON, without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        self.to_value().to_string()
    }
}

impl From<HandlerResult> for ToolResult {
    fn from(result: HandlerResult) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Converts a `json!` object into a payload. Anything else is wrapped
/// under `result`.
#[must_use]
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Session, _: &Arguments) -> HandlerResult {
        Ok(Payload::new())
    }

    const fn spec(name: &'static str, args: &'static [ArgSpec]) -> ToolSpec {
        ToolSpec {
            name,
            description: "test",
            args,
            handler: ToolHandler::Session(noop),
            attach_snapshot: false,
        }
    }

    #[test]
    fn builtin_registry_is_valid() {
        let registry = ToolRegistry::builtin().unwrap();
        for name in [
            "list_tools",
            "get_diagnostics",
            "new_document",
            "list_documents",
            "list_objects",
            "get_object_info",
            "setup_dual_docs",
            "start_measurement",
            "end_measurement",
            "zoom_grid_region",
            "reset_grid_zoom",
            "select_point",
            "confirm_point",
            "clear_point",
            "list_points",
            "measure_distance",
            "clear_measurements",
            "get_grid_info",
            "take_screenshot",
        ] {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
        assert_eq!(registry.len(), registry.definitions().len());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ToolRegistry::from_specs([spec("a", &[]), spec("a", &[])]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("a".to_string()));
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        const BAD: &[ArgSpec] = &[ArgSpec::optional(
            "size",
            ArgKind::Integer,
            ArgDefault::Bool(true),
            "",
        )];
        let err = ToolRegistry::from_specs([spec("a", BAD)]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument { .. }));

        const TWICE: &[ArgSpec] = &[
            ArgSpec::required("x", ArgKind::String, ""),
            ArgSpec::required("x", ArgKind::String, ""),
        ];
        assert!(ToolRegistry::from_specs([spec("b", TWICE)]).is_err());
    }

    #[test]
    fn schema_lists_required_arguments() {
        let registry = ToolRegistry::builtin().unwrap();
        let schema = registry.get("zoom_grid_region").unwrap().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["start_cell", "size"]));
        assert_eq!(schema["properties"]["size"]["type"], "integer");

        let schema = registry.get("select_point").unwrap().input_schema();
        assert_eq!(schema["properties"]["offset_x"]["default"], 0.5);
    }

    #[test]
    fn envelope_shapes() {
        let ok = ToolResult::ok(payload(json!({"point_id": "point_1"})));
        assert_eq!(ok.to_value(), json!({"success": true, "point_id": "point_1"}));

        let failed = ToolResult::failure("Unknown tool: nope");
        assert_eq!(
            failed.to_value(),
            json!({"success": false, "error": "Unknown tool: nope"})
        );
        assert!(!failed.to_line().contains('\n'));
    }

    #[test]
    fn handler_errors_become_failures() {
        let result: ToolResult = Err(ToolError::State("nope".to_string())).into();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("nope"));
    }
}
