// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic event log storage: per-aggregate histories with optimistic
// concurrency, aggregate listing with resumable pages, and grouped commits
// across several logs.
//
// ============================================================================

pub mod core;
pub mod store;

pub use self::core::{
    EventDetail, EventGroup, EventStorage, EventStoreContext, GetEventsOptions, GetEventsOutput,
    GroupCommitLog, GroupedEvent, GroupedEventResult, ListAggregateIdsOptions,
    ListAggregateIdsOutput, NewEvent, PushEventGroupOptions, PushEventOptions, PushReceipt, Result,
    RollbackFailure, StoreError,
};
pub use self::store::{GroupCommitCoordinator, InMemoryEventLog, PageToken, IN_MEMORY_FAMILY};
