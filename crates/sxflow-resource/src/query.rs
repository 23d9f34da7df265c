//! Query values.
//!
//! The engine never interprets a query. It only needs to hash it and hand a
//! textual selection to the control plane.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ResourceError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryValue {
    /// A query already in textual form (func_adl, qastle, selection strings).
    Text(String),
    /// A dictionary-style query. Key order is irrelevant to its identity.
    Structured(Value),
    /// Source text of a function to run remotely.
    PythonFunction(String),
}

impl QueryValue {
    pub fn text(query: impl Into<String>) -> Self { Self::Text(query.into()) }

    /// Capture any serialisable value as a structured query.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| ResourceError::MalformedDescriptor(format!("query is not serialisable: {e}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
            Self::PythonFunction(_) => "python_function",
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let empty = match self {
            Self::Text(s) | Self::PythonFunction(s) => s.trim().is_empty(),
            Self::Structured(v) => v.is_null(),
        };
        if empty {
            return Err(ResourceError::MalformedDescriptor(format!(
                "empty {} query",
                self.kind()
            )));
        }
        Ok(())
    }

    /// Canonical JSON form: object keys sorted at every depth.
    pub fn canonical(&self) -> Value {
        let value = match self {
            Self::Text(s) | Self::PythonFunction(s) => Value::String(s.clone()),
            Self::Structured(v) => canonicalize(v),
        };
        let mut out = Map::new();
        out.insert("kind".into(), Value::String(self.kind().into()));
        out.insert("value".into(), value);
        Value::Object(out)
    }

    /// The selection string sent to the control plane.
    pub fn selection(&self) -> String {
        match self {
            Self::Text(s) | Self::PythonFunction(s) => s.clone(),
            Self::Structured(v) => canonicalize(v).to_string(),
        }
    }
}

pub(crate) fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
