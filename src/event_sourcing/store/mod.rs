// ============================================================================
// Event Sourcing Store - Storage Backends
// ============================================================================
//
// The in-memory event log, the aggregate listing it serves, and the grouped
// commit coordinator shared by every `GroupCommitLog` implementation.
//
// ============================================================================

pub mod group;
pub mod in_memory;
pub mod pagination;

pub use group::GroupCommitCoordinator;
pub use in_memory::{InMemoryEventLog, IN_MEMORY_FAMILY};
pub use pagination::{paginate, AggregateIndexEntry, PageToken};
