// ============================================================================
// Event Sourcing Core - Types, Errors & Storage Contract
// ============================================================================
//
// Backend-agnostic pieces: event shapes, the error taxonomy, the storage
// traits and the grouped-commit staging types. Nothing here holds state.
//
// ============================================================================

pub mod error;
pub mod event;
pub mod grouped;
pub mod storage;

pub use error::{Result, RollbackFailure, StoreError};
pub use event::{EventDetail, EventStoreContext, NewEvent, PushEventOptions};
pub use grouped::{EventGroup, GroupedEvent, GroupedEventResult, PushEventGroupOptions, PushReceipt};
pub use storage::{
    EventStorage, GetEventsOptions, GetEventsOutput, GroupCommitLog, ListAggregateIdsOptions,
    ListAggregateIdsOutput,
};
