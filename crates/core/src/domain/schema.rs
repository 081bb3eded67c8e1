//! Typed tool arguments and the parameter schemas they are checked against.
//!
//! Arguments arrive from the completion service as a JSON object encoded in a
//! string. They are lifted into [`ArgValue`] so that tools and validation work
//! on a closed set of variants instead of untyped maps.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<ArgValue>),
    Object(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Number(value) => Value::Number(value.clone()),
            Self::String(value) => Value::String(value.clone()),
            Self::Array(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            Self::Object(fields) => Value::Object(
                fields.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
            ),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(value) => Self::Number(value),
            Value::String(value) => Self::String(value),
            Value::Array(items) => Self::Array(items.into_iter().map(ArgValue::from).collect()),
            Value::Object(fields) => Self::Object(
                fields.into_iter().map(|(key, value)| (key, ArgValue::from(value))).collect(),
            ),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    Malformed(String),
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error("arguments do not match the expected shape: {0}")]
    Shape(String),
}

/// String-keyed argument map for one tool call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolArgs(BTreeMap<String, ArgValue>);

impl ToolArgs {
    /// Parses the raw argument text of a tool call. Blank text means "no arguments".
    pub fn parse(raw: &str) -> Result<Self, ArgumentError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value =
            serde_json::from_str(raw).map_err(|error| ArgumentError::Malformed(error.to_string()))?;
        match ArgValue::from(value) {
            ArgValue::Object(fields) => Ok(Self(fields)),
            other => Err(ArgumentError::NotAnObject(other.type_name())),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), ArgValue::from(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ArgValue::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_arg_value(&self) -> ArgValue {
        ArgValue::Object(self.0.clone())
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0.iter().map(|(key, value)| (key.clone(), value.to_json())).collect::<Map<_, _>>(),
        )
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Reads the arguments into a tool-specific parameter struct.
    pub fn deserialize<T>(&self) -> Result<T, ArgumentError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.to_json()).map_err(|error| ArgumentError::Shape(error.to_string()))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{path}: {reason}")]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Object { properties: BTreeMap<String, ParameterSchema>, required: Vec<String> },
    String { allowed: Vec<String> },
    Number,
    Integer,
    Boolean,
    Array { items: Box<ParameterSchema> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterSchema {
    pub description: Option<String>,
    pub kind: SchemaKind,
}

impl ParameterSchema {
    fn of(kind: SchemaKind) -> Self {
        Self { description: None, kind }
    }

    pub fn object() -> Self {
        Self::of(SchemaKind::Object { properties: BTreeMap::new(), required: Vec::new() })
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String { allowed: Vec::new() })
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(SchemaKind::String { allowed: values.into_iter().map(Into::into).collect() })
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn array(items: ParameterSchema) -> Self {
        Self::of(SchemaKind::Array { items: Box::new(items) })
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a property. Ignored unless this is an object schema.
    pub fn property(mut self, name: impl Into<String>, schema: ParameterSchema) -> Self {
        if let SchemaKind::Object { properties, .. } = &mut self.kind {
            properties.insert(name.into(), schema);
        }
        self
    }

    /// Marks a property as required. Ignored unless this is an object schema.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        if let SchemaKind::Object { required, .. } = &mut self.kind {
            let name = name.into();
            if !required.contains(&name) {
                required.push(name);
            }
        }
        self
    }

    pub fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        match &self.kind {
            SchemaKind::Object { properties, required } => {
                schema.insert("type".to_string(), Value::from("object"));
                schema.insert(
                    "properties".to_string(),
                    Value::Object(
                        properties
                            .iter()
                            .map(|(name, property)| (name.clone(), property.to_json_schema()))
                            .collect(),
                    ),
                );
                if !required.is_empty() {
                    schema.insert("required".to_string(), Value::from(required.clone()));
                }
            }
            SchemaKind::String { allowed } => {
                schema.insert("type".to_string(), Value::from("string"));
                if !allowed.is_empty() {
                    schema.insert("enum".to_string(), Value::from(allowed.clone()));
                }
            }
            SchemaKind::Number => {
                schema.insert("type".to_string(), Value::from("number"));
            }
            SchemaKind::Integer => {
                schema.insert("type".to_string(), Value::from("integer"));
            }
            SchemaKind::Boolean => {
                schema.insert("type".to_string(), Value::from("boolean"));
            }
            SchemaKind::Array { items } => {
                schema.insert("type".to_string(), Value::from("array"));
                schema.insert("items".to_string(), items.to_json_schema());
            }
        }
        if let Some(description) = &self.description {
            schema.insert("description".to_string(), Value::from(description.clone()));
        }
        Value::Object(schema)
    }

    pub fn validate(&self, value: &ArgValue) -> Result<(), SchemaViolation> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &ArgValue) -> Result<(), SchemaViolation> {
        match (&self.kind, value) {
            (SchemaKind::Object { properties, required }, ArgValue::Object(fields)) => {
                for name in required {
                    let present = matches!(fields.get(name), Some(field) if *field != ArgValue::Null);
                    if !present {
                        return Err(violation(format!("{path}.{name}"), "is required"));
                    }
                }
                for (name, field) in fields {
                    let Some(property) = properties.get(name) else {
                        continue;
                    };
                    if *field == ArgValue::Null && !required.contains(name) {
                        continue;
                    }
                    property.validate_at(&format!("{path}.{name}"), field)?;
                }
                Ok(())
            }
            (SchemaKind::String { allowed }, ArgValue::String(text)) => {
                if allowed.is_empty() || allowed.iter().any(|candidate| candidate == text) {
                    Ok(())
                } else {
                    Err(violation(
                        path,
                        format!("`{text}` is not one of {}", allowed.join("|")),
                    ))
                }
            }
            (SchemaKind::Number, ArgValue::Number(_)) | (SchemaKind::Boolean, ArgValue::Bool(_)) => {
                Ok(())
            }
            (SchemaKind::Integer, ArgValue::Number(number)) => {
                if number.is_i64() || number.is_u64() {
                    Ok(())
                } else {
                    Err(violation(path, format!("expected integer, got {number}")))
                }
            }
            (SchemaKind::Array { items }, ArgValue::Array(values)) => {
                for (index, item) in values.iter().enumerate() {
                    items.validate_at(&format!("{path}[{index}]"), item)?;
                }
                Ok(())
            }
            (kind, other) => Err(violation(
                path,
                format!("expected {}, got {}", SchemaKindName(kind), other.type_name()),
            )),
        }
    }
}

struct SchemaKindName<'a>(&'a SchemaKind);

impl fmt::Display for SchemaKindName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            SchemaKind::Object { .. } => "object",
            SchemaKind::String { .. } => "string",
            SchemaKind::Number => "number",
            SchemaKind::Integer => "integer",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Array { .. } => "array",
        };
        f.write_str(name)
    }
}

fn violation(path: impl Into<String>, reason: impl Into<String>) -> SchemaViolation {
    SchemaViolation { path: path.into(), reason: reason.into() }
}
