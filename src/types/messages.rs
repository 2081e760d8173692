//! Message types exchanged with the completion service
//! 
//! The bridge never interprets a request beyond checking that it is a JSON
//! object; the service owns the schema.

use crate::errors::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque request payload, forwarded verbatim as the POST body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Request(Map<String, Value>);

impl Request {
    /// Parse request-file contents
    /// 
    /// Leading and trailing whitespace is ignored. Anything that is not a
    /// single JSON object is a `MalformedRequest`.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| BridgeError::MalformedRequest(e.to_string()))?;

        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(BridgeError::MalformedRequest(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Model identifier, when the payload names one
    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(Value::as_str)
    }

    /// Number of entries in `messages`, when present
    pub fn message_count(&self) -> Option<usize> {
        self.0
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::len)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One incremental piece of generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    content: String,
}

impl Fragment {
    /// Create a fragment; empty content is not a fragment
    pub fn new(content: impl Into<String>) -> Option<Self> {
        let content = content.into();
        if content.is_empty() {
            None
        } else {
            Some(Self { content })
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}
