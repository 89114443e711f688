use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{Result, StoreError};

// ============================================================================
// Events - what callers push and what the log hands back
// ============================================================================
//
// `NewEvent` is the caller's input: the timestamp is optional and gets
// resolved by the log at push time. `EventDetail` is the persisted form and
// always carries a timestamp.
//
// Fields the log does not know about (payload, metadata, ...) live in a
// flattened JSON map and round-trip untouched.
//
// ============================================================================

/// An event as submitted by a caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub aggregate_id: String,
    pub version: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl NewEvent {
    pub fn new(aggregate_id: impl Into<String>, version: u64, event_type: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            version,
            event_type: event_type.into(),
            timestamp: None,
            data: Map::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Shape checks shared by every push path. Payload fields are not inspected.
    pub fn validate(&self) -> Result<()> {
        if self.aggregate_id.is_empty() {
            return Err(StoreError::InvalidEvent("aggregate_id must not be empty".to_string()));
        }
        if self.version == 0 {
            return Err(StoreError::InvalidEvent(format!(
                "version must be positive (aggregate {})",
                self.aggregate_id
            )));
        }
        Ok(())
    }

    /// Resolve the timestamp and produce the canonical stored form.
    pub fn into_detail(self, now: DateTime<Utc>) -> EventDetail {
        EventDetail {
            aggregate_id: self.aggregate_id,
            version: self.version,
            event_type: self.event_type,
            timestamp: self.timestamp.unwrap_or(now),
            data: self.data,
        }
    }
}

/// A persisted event. This is the representation returned by every read.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub aggregate_id: String,
    pub version: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl EventDetail {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

// ============================================================================
// Push Context & Options
// ============================================================================

/// Identifies the event store on whose behalf a push happens.
/// Only used to attribute errors and label logs; never stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventStoreContext {
    pub event_store_id: String,
}

impl EventStoreContext {
    pub fn new(event_store_id: impl Into<String>) -> Self {
        Self { event_store_id: event_store_id.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushEventOptions {
    /// Replace an existing event at the same version instead of failing.
    pub force: bool,
}

// ============================================================================
// Tests
// ============================================================================
