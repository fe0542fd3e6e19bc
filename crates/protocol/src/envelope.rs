// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope codec: framing for every record on every transport.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A framed message record: `{"type", "id", "timestamp", "payload"}`.
///
/// `id` is unique per sending process (`<ms>-<counter>`); `timestamp` is
/// the producer's wall clock in milliseconds. `payload` is always a JSON
/// object; binary data rides inside it as base64 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub timestamp: i64,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Decode failures distinguished from transport-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Missing `type`/`id` or a non-numeric `timestamp`.
    Malformed(String),
    /// The payload did not match the schema for a known message type.
    BadPayload(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed envelope: {detail}"),
            Self::BadPayload(detail) => write!(f, "bad payload: {detail}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl Envelope {
    /// Frame a payload under a new unique id stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), id: next_id(), timestamp: now_ms(), payload }
    }

    /// Parse and validate a JSON record.
    ///
    /// Rejects records missing `type` or `id`, or whose `timestamp` is not
    /// a number. Unknown `type` values pass — the dispatcher decides what
    /// to do with them.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| EnvelopeError::Malformed("not a JSON object".to_owned()))?;

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvelopeError::Malformed("missing type".to_owned()))?
            .to_owned();
        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvelopeError::Malformed("missing id".to_owned()))?
            .to_owned();
        let timestamp = obj
            .get("timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| EnvelopeError::Malformed("timestamp not numeric".to_owned()))?;
        let payload = obj.get("payload").cloned().unwrap_or_else(empty_object);

        Ok(Self { kind, id, timestamp, payload })
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> String {
        // Hand-built so encoding is infallible: every field is a plain
        // JSON scalar or an already-parsed Value.
        let mut obj = serde_json::Map::with_capacity(4);
        obj.insert("type".to_owned(), Value::String(self.kind.clone()));
        obj.insert("id".to_owned(), Value::String(self.id.clone()));
        obj.insert("timestamp".to_owned(), Value::Number(self.timestamp.into()));
        obj.insert("payload".to_owned(), self.payload.clone());
        Value::Object(obj).to_string()
    }
}

/// Generate a process-unique envelope id: `<epoch-ms>-<counter>`.
///
/// The counter alone guarantees uniqueness for the process lifetime; the
/// millisecond prefix keeps ids roughly sortable across processes.
pub fn next_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{n}", now_ms())
}

/// Current wall clock in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
