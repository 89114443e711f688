// ============================================================================
// Event Log Errors
// ============================================================================
//
// One error enum for every storage operation. Variants fall into three groups:
// - Conflict: the (aggregate_id, version) slot is taken, caller may re-read
// - Validation: rejected before any mutation, never retried
// - Internal: lock poisoning, failed compensation
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Event already exists in store {event_store_id}: aggregate {aggregate_id} version {version}")]
    EventAlreadyExists {
        event_store_id: String,
        aggregate_id: String,
        version: u64,
    },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Grouped event at position {index} has no push context")]
    MissingContext { index: usize },

    #[error("Cannot push an empty event group")]
    EmptyEventGroup,

    #[error("Grouped event at position {index} targets a {found} log, expected {expected}")]
    IncompatibleEventGroup {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("Event not found in store {event_store_id}: aggregate {aggregate_id} version {version}")]
    EventNotFound {
        event_store_id: String,
        aggregate_id: String,
        version: u64,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Event group rollback incomplete ({} compensation failure(s)) after: {source}", .failures.len())]
    RollbackIncomplete {
        #[source]
        source: Box<StoreError>,
        failures: Vec<RollbackFailure>,
    },
}

/// A compensation step that could not be applied during group rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackFailure {
    pub event_store_id: String,
    pub aggregate_id: String,
    pub version: u64,
    pub reason: String,
}

impl StoreError {
    /// Optimistic concurrency conflict, the usual trigger for a caller retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::EventAlreadyExists { .. })
    }

    /// Rejected up front, nothing was written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidEvent(_)
                | StoreError::MissingContext { .. }
                | StoreError::EmptyEventGroup
                | StoreError::IncompatibleEventGroup { .. }
                | StoreError::InvalidPageToken(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
