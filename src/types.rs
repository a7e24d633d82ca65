//! Core event body type for the rmq-event transport
//!
//! Event bodies are opaque JSON objects with one reserved key: `_subject`,
//! the topic discriminator producers set and consumers dispatch on.

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key identifying the topic of an event body
pub const SUBJECT_KEY: &str = "_subject";

/// A single event body — an opaque string-keyed mapping
///
/// Bodies are owned by the producer until handed to the send pipeline and
/// are not mutated by the transport. On the wire they are compact JSON
/// objects, so any producer or consumer speaking JSON interoperates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventBody(Map<String, Value>);

impl EventBody {
    /// Create a body carrying only the reserved subject field
    pub fn new(subject: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(SUBJECT_KEY.to_string(), Value::String(subject.into()));
        Self(fields)
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// The reserved subject, if present and a string
    pub fn subject(&self) -> Option<&str> {
        self.0.get(SUBJECT_KEY).and_then(Value::as_str)
    }

    /// Look up a field by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a field, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Number of fields, the subject included
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the body carries no fields at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode to the compact JSON wire format
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from wire bytes; the payload must be a JSON object
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| BrokerError::Decode(e.to_string()))
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the body, yielding the underlying field map
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for EventBody {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
