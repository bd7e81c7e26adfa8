//! Declared tool arguments and their resolution against a call.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::ToolError;

/// JSON type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// A string.
    String,
    /// An integer.
    Integer,
    /// Any number.
    Number,
    /// A boolean.
    Boolean,
}

impl ArgKind {
    const fn schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Whether `value` has this type. Integral floats count as integers.
    #[allow(clippy::float_cmp)]
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.is_finite() && f.trunc() == f)
            }
        }
    }
}

/// Default value of an optional argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgDefault {
    /// No default; the argument is simply absent.
    None,
    /// A string default.
    Str(&'static str),
    /// An integer default.
    Int(i64),
    /// A number default.
    Num(f64),
    /// A boolean default.
    Bool(bool),
}

impl ArgDefault {
    fn to_value(self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Str(s) => Some(json!(s)),
            Self::Int(i) => Some(json!(i)),
            Self::Num(n) => Some(json!(n)),
            Self::Bool(b) => Some(json!(b)),
        }
    }
}

/// Declaration of one argument.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    /// Argument name.
    pub name: &'static str,
    /// JSON type.
    pub kind: ArgKind,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Value used when it is omitted.
    pub default: ArgDefault,
    /// Allowed values for string arguments, empty for any.
    pub choices: &'static [&'static str],
    /// Description shown to clients.
    pub description: &'static str,
}

impl ArgSpec {
    /// A required argument.
    #[must_use]
    pub const fn required(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: ArgDefault::None,
            choices: &[],
            description,
        }
    }

    /// An optional argument.
    #[must_use]
    pub const fn optional(
        name: &'static str,
        kind: ArgKind,
        default: ArgDefault,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default,
            choices: &[],
            description,
        }
    }

    /// Restricts a string argument to `choices`.
    #[must_use]
    pub const fn one_of(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    /// Checks the declaration is self-consistent.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("argument name is empty".to_string());
        }
        if self.required && self.default != ArgDefault::None {
            return Err("required argument has a default".to_string());
        }
        if let Some(default) = self.default.to_value() {
            if !self.kind.accepts(&default) {
                return Err(format!(
                    "default {default} is not of type {}",
                    self.kind.schema_type()
                ));
            }
            if let Some(s) = default.as_str() {
                if !self.choices.is_empty() && !self.choices.contains(&s) {
                    return Err(format!("default '{s}' is not one of the choices"));
                }
            }
        }
        if !self.choices.is_empty() && self.kind != ArgKind::String {
            return Err("choices are only supported for string arguments".to_string());
        }
        Ok(())
    }

    /// JSON Schema fragment for this argument.
    #[must_use]
    pub fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind.schema_type()));
        schema.insert("description".to_string(), json!(self.description));
        if let Some(default) = self.default.to_value() {
            schema.insert("default".to_string(), default);
        }
        if !self.choices.is_empty() {
            schema.insert("enum".to_string(), json!(self.choices));
        }
        Value::Object(schema)
    }
}

/// Arguments of a call after defaults have been applied and types checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    /// Applies `specs` to the raw `arguments` of a call.
    ///
    /// `null` counts as omitted. Arguments that are not declared are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Fails on a missing required argument, a type mismatch, or a string
    /// outside its declared choices.
    pub fn resolve(specs: &[ArgSpec], arguments: &Map<String, Value>) -> Result<Self, ToolError> {
        let mut values = Map::new();
        for spec in specs {
            let supplied = arguments.get(spec.name).filter(|v| !v.is_null());
            let value = match supplied {
                Some(v) => {
                    if !spec.kind.accepts(v) {
                        return Err(ToolError::invalid(
                            spec.name,
                            format!("expected {}, got {v}", spec.kind.schema_type()),
                        ));
                    }
                    if let Some(s) = v.as_str() {
                        if !spec.choices.is_empty() && !spec.choices.contains(&s) {
                            return Err(ToolError::invalid(
                                spec.name,
                                format!("must be one of: {}", spec.choices.join(", ")),
                            ));
                        }
                    }
                    v.clone()
                }
                None if spec.required => {
                    return Err(ToolError::MissingArgument {
                        name: spec.name.to_string(),
                    });
                }
                None => match spec.default.to_value() {
                    Some(default) => default,
                    None => continue,
                },
            };
            values.insert(spec.name.to_string(), value);
        }

        for name in arguments.keys() {
            if !specs.iter().any(|s| s.name == name) {
                debug!(argument = %name, "Ignoring undeclared argument");
            }
        }
        Ok(Self { values })
    }

    /// A string argument, if present.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// A string argument that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingArgument`] if it is absent.
    pub fn required_str(&self, name: &str) -> Result<&str, ToolError> {
        self.str(name).ok_or_else(|| ToolError::MissingArgument {
            name: name.to_string(),
        })
    }

    /// An integer argument, if present.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn int(&self, name: &str) -> Option<i64> {
        let value = self.values.get(name)?;
        value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
    }

    /// A number argument, if present.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    /// A boolean argument, if present.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// A positive integer argument that fits in `u32`, if present.
    ///
    /// # Errors
    ///
    /// Fails if the value is zero, negative or too large.
    pub fn dimension(&self, name: &str, max: u32) -> Result<Option<u32>, ToolError> {
        self.int(name)
            .map(|v| {
                u32::try_from(v)
                    .ok()
                    .filter(|v| (1..=max).contains(v))
                    .ok_or_else(|| ToolError::invalid(name, format!("must be between 1 and {max}")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[ArgSpec] = &[
        ArgSpec::required("grid_cell", ArgKind::String, "Cell"),
        ArgSpec::optional("offset_x", ArgKind::Number, ArgDefault::Num(0.5), "X offset"),
        ArgSpec::optional("size", ArgKind::Integer, ArgDefault::None, "Size"),
        ArgSpec::optional("mode", ArgKind::String, ArgDefault::Str("auto"), "Mode")
            .one_of(&["auto", "plain"]),
    ];

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn applies_defaults() {
        let args = Arguments::resolve(SPECS, &raw(json!({"grid_cell": "A1"}))).unwrap();
        assert_eq!(args.str("grid_cell"), Some("A1"));
        assert_eq!(args.number("offset_x"), Some(0.5));
        assert_eq!(args.int("size"), None);
        assert_eq!(args.str("mode"), Some("auto"));
    }

    #[test]
    fn missing_required_is_reported() {
        let err = Arguments::resolve(SPECS, &raw(json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: grid_cell");

        let err = Arguments::resolve(SPECS, &raw(json!({"grid_cell": null}))).unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument { .. }));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let err = Arguments::resolve(SPECS, &raw(json!({"grid_cell": 3}))).unwrap_err();
        assert!(err.to_string().contains("expected string"));

        let err =
            Arguments::resolve(SPECS, &raw(json!({"grid_cell": "A1", "size": 1.5}))).unwrap_err();
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn integral_float_is_an_integer() {
        let args = Arguments::resolve(SPECS, &raw(json!({"grid_cell": "A1", "size": 2.0}))).unwrap();
        assert_eq!(args.int("size"), Some(2));
    }

    #[test]
    fn choices_are_enforced() {
        let err =
            Arguments::resolve(SPECS, &raw(json!({"grid_cell": "A1", "mode": "fancy"}))).unwrap_err();
        assert!(err.to_string().contains("auto, plain"));
    }

    #[test]
    fn inconsistent_specs_are_rejected() {
        let bad = ArgSpec {
            default: ArgDefault::Int(1),
            ..ArgSpec::required("x", ArgKind::Integer, "")
        };
        assert!(bad.check().is_err());

        let mismatched = ArgSpec::optional("x", ArgKind::Integer, ArgDefault::Str("a"), "");
        assert!(mismatched.check().is_err());
        assert!(SPECS.iter().all(|s| s.check().is_ok()));
    }

    #[test]
    fn dimension_bounds() {
        let args = Arguments::resolve(
            &[ArgSpec::optional("width", ArgKind::Integer, ArgDefault::None, "")],
            &raw(json!({"width": 0})),
        )
        .unwrap();
        assert!(args.dimension("width", 100).is_err());
    }
}
