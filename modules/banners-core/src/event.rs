//! The event body: an opaque JSON object plus two mandatory fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BannerError, Result};

/// Field naming the topic an event belongs to.
pub const TOPIC_FIELD: &str = "topic";

/// Field holding the lexicographically sortable timestamp assigned at
/// publish time. Orders events within a topic.
pub const TIMESTAMP_FIELD: &str = "banner_timestamp";

/// A published event: string keys, JSON values. Every stored event carries
/// [`TOPIC_FIELD`] and [`TIMESTAMP_FIELD`]; the publish path injects them
/// when the caller-supplied body omits them, and preserves caller-provided
/// values verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// An empty body. Publishing it yields an event with only the injected
    /// `topic` and `banner_timestamp` fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an event from a JSON value. Fails with `InvalidArgument` unless
    /// the value is an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(BannerError::InvalidArgument(format!(
                "event body must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// The topic field, if present and a string.
    pub fn topic(&self) -> Option<&str> {
        self.fields.get(TOPIC_FIELD).and_then(Value::as_str)
    }

    /// The banner timestamp field, if present and a string.
    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get(TIMESTAMP_FIELD).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
