//! In-memory event-sourcing storage engine.
//!
//! Each [`InMemoryEventLog`] keeps per-aggregate event histories with
//! optimistic concurrency on `(aggregate_id, version)`, serves version-range
//! reads and a paginated aggregate listing, and can take part in grouped
//! commits that span several logs and are compensated on failure.
//!
//! ```no_run
//! use event_log_store::{EventStorage, EventStoreContext, InMemoryEventLog, NewEvent, PushEventOptions};
//!
//! # async fn demo() -> event_log_store::Result<()> {
//! let log = InMemoryEventLog::new("orders");
//! let context = EventStoreContext::new("orders");
//! log.push_event(NewEvent::new("order-1", 1, "OrderCreated"), &context, PushEventOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod event_sourcing;
pub mod metrics;

pub use config::EventLogConfig;
pub use event_sourcing::{
    EventDetail, EventGroup, EventStorage, EventStoreContext, GetEventsOptions, GetEventsOutput,
    GroupCommitCoordinator, GroupCommitLog, GroupedEvent, GroupedEventResult, InMemoryEventLog,
    ListAggregateIdsOptions, ListAggregateIdsOutput, NewEvent, PageToken, PushEventGroupOptions,
    PushEventOptions, PushReceipt, Result, RollbackFailure, StoreError, IN_MEMORY_FAMILY,
};
pub use metrics::StoreMetrics;
