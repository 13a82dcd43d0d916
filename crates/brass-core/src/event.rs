//! Event model.
//!
//! An [`Event`] is a JSON object with a `type` discriminator and optional
//! `text`, `channel` and `user` fields. Transports produce them, the
//! normalizer enriches them and dispatch stamps markers on them
//! (`occluded`, `_logged`).
//!
//! ```rust,ignore
//! let event = Event::message("hi <@U1>").with("channel", "C1");
//! assert_eq!(event.kind(), Some("message"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The action type carried by ordinary chat messages.
pub const MESSAGE: &str = "message";

/// Field stamped on an event once an occluding command fired.
pub const OCCLUDED: &str = "occluded";

/// Field stamped on an event by a command that reported it to the console.
pub const LOGGED: &str = "_logged";

/// One inbound or synthetic occurrence from the messaging transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Creates an event with the given action type and no other fields.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(kind.into()));
        Self { fields }
    }

    /// Creates an event with no `type` field (e.g. a delivery acknowledgement).
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Creates a `message` event with the given text.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(MESSAGE).with("text", text.into())
    }

    /// Wraps a JSON value. Returns `None` unless the value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Parses an event from raw JSON bytes.
    pub fn from_slice(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The action type, or `None` for untyped events.
    pub fn kind(&self) -> Option<&str> {
        self.get_str("type")
    }

    /// The message text, if present.
    pub fn text(&self) -> Option<&str> {
        self.get_str("text")
    }

    /// The channel id, if present.
    pub fn channel(&self) -> Option<&str> {
        self.get_str("channel")
    }

    /// The originating user id, if present and a plain string.
    pub fn user(&self) -> Option<&str> {
        self.get_str("user")
    }

    /// Returns a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns a field if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Returns `true` if the field is present (with any value).
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Returns `true` once an occluding command has fired on this event.
    pub fn is_occluded(&self) -> bool {
        self.contains(OCCLUDED)
    }

    /// Marks the event as handled for lower-priority occludable commands.
    pub fn mark_occluded(&mut self) {
        self.fields.insert(OCCLUDED.to_string(), Value::Bool(true));
    }

    /// Returns `true` if some command reported this event to the console.
    pub fn is_logged(&self) -> bool {
        self.contains(LOGGED)
    }

    /// Marks the event as reported.
    pub fn mark_logged(&mut self) {
        self.fields.insert(LOGGED.to_string(), Value::Bool(true));
    }

    /// Returns the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the event and returns it as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.fields) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{..}"),
        }
    }
}
