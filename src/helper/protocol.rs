//! Helper line protocol: one JSON object per stdout line
//!
//! ```text
//! {"type":"log","message":"..."}
//! {"type":"error","message":"..."}
//! {"type":"download_progress","bytesDownloaded":1,"bytesTotal":2}
//! {"type":"download_result","appId":4000,"publishedFileId":123,"installFolder":"/x/y"}
//! ```
//!
//! Lines that are not JSON objects, or lack a string `type`, are opaque log text.

use serde_json::{Map, Value};
use std::sync::{Mutex, PoisonError};

/// Event type that carries advisory text
pub const LOG_EVENT: &str = "log";

/// Event type that fails the pending operation
pub const ERROR_EVENT: &str = "error";

/// One typed record parsed from a helper stdout line
#[derive(Clone, Debug, PartialEq)]
pub struct HelperEvent {
    /// Discriminator (`log`, `error`, `<op>_progress`, `<op>_result`, ...)
    pub kind: String,
    /// The whole record, including `type`
    pub payload: Map<String, Value>,
}

impl HelperEvent {
    /// Parse a line; `None` means "treat as plain text"
    pub fn parse(line: &str) -> Option<Self> {
        let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(line) else {
            return None;
        };
        let kind = match payload.get("type") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => kind.clone(),
            _ => return None,
        };
        Some(Self { kind, payload })
    }

    /// The `message` field, if present and non-blank
    pub fn message(&self) -> Option<String> {
        read_string(&self.payload, "message").filter(|m| !m.trim().is_empty())
    }
}

/// Read a field as text; non-string scalars are rendered as JSON
pub fn read_string(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Read an unsigned field given as a JSON number or a numeric string
pub fn read_u64(payload: &Map<String, Value>, key: &str) -> Option<u64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// [`read_u64`] narrowed to `u32`
pub fn read_u32(payload: &Map<String, Value>, key: &str) -> Option<u32> {
    read_u64(payload, key).and_then(|v| u32::try_from(v).ok())
}

/// Single-assignment result slot shared by concurrent readers
///
/// The first [`set`](Self::set) wins; later writes are silently ignored.
#[derive(Debug)]
pub struct ResultCell<T> {
    slot: Mutex<CellState<T>>,
}

#[derive(Debug)]
enum CellState<T> {
    Pending,
    Resolved(T),
    Taken,
}

impl<T> Default for ResultCell<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(CellState::Pending),
        }
    }
}

impl<T> ResultCell<T> {
    /// Store `value` unless the cell already resolved; returns whether it was stored
    pub fn set(&self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, CellState::Pending) {
            *slot = CellState::Resolved(value);
            true
        } else {
            false
        }
    }

    /// Whether a value was ever stored
    pub fn is_resolved(&self) -> bool {
        !matches!(
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner),
            CellState::Pending
        )
    }

    /// Remove the stored value; the cell stays resolved
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, CellState::Taken) {
            CellState::Resolved(value) => Some(value),
            CellState::Pending => {
                *slot = CellState::Pending;
                None
            }
            CellState::Taken => None,
        }
    }
}
