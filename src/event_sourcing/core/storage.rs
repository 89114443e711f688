use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;
use super::event::{EventDetail, EventStoreContext, NewEvent, PushEventOptions};
use super::grouped::{EventGroup, GroupedEvent, PushEventGroupOptions, PushReceipt};

// ============================================================================
// Storage Contract
// ============================================================================
//
// `EventStorage` is what every backend exposes (memory today, durable or
// networked later). Command handlers, publishers and validators sit on top of
// it and never reach into a backend directly.
//
// `GroupCommitLog` is the narrow synchronous capability the group commit
// coordinator needs from each member log: push without suspending, and undo
// a push it made.
//
// ============================================================================

#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Append one event. Fails with `EventAlreadyExists` if the version is taken.
    async fn push_event(
        &self,
        event: NewEvent,
        context: &EventStoreContext,
        options: PushEventOptions,
    ) -> Result<EventDetail>;

    /// Filtered, ordered history of one aggregate. Unknown aggregate → empty.
    async fn get_events(&self, aggregate_id: &str, options: GetEventsOptions) -> Result<GetEventsOutput>;

    /// One page of aggregate ids ordered by initial event timestamp.
    async fn list_aggregate_ids(&self, options: ListAggregateIdsOptions) -> Result<ListAggregateIdsOutput>;

    /// Stage an event for a grouped commit against this log. No I/O.
    fn group_event(&self, event: NewEvent) -> GroupedEvent;

    /// Commit grouped events across logs, all or nothing.
    async fn push_event_group(
        &self,
        options: PushEventGroupOptions,
        grouped_events: Vec<GroupedEvent>,
    ) -> Result<EventGroup>;
}

/// Member-log capability used by the group commit coordinator.
pub trait GroupCommitLog: Send + Sync {
    /// Logs can only be grouped with logs of the same family.
    fn adapter_family(&self) -> &'static str;

    /// Label used in logs and metrics.
    fn event_store_label(&self) -> &str;

    /// Same checks and timestamp handling as `push_event`, but synchronous so
    /// a failure reaches the coordinator immediately.
    fn push_event_sync(
        &self,
        event: NewEvent,
        context: &EventStoreContext,
        options: PushEventOptions,
    ) -> Result<PushReceipt>;

    /// Undo a push described by `receipt`.
    fn revert_push(&self, receipt: &PushReceipt) -> Result<()>;
}

// ============================================================================
// Query Options & Outputs
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetEventsOptions {
    pub min_version: Option<u64>,
    pub max_version: Option<u64>,
    pub limit: Option<usize>,
    pub reverse: bool,
}

impl GetEventsOptions {
    pub fn min_version(mut self, version: u64) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn max_version(mut self, version: u64) -> Self {
        self.max_version = Some(version);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GetEventsOutput {
    pub events: Vec<EventDetail>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListAggregateIdsOptions {
    pub limit: Option<usize>,
    /// Opaque token from a previous page. When set, the other fields are ignored.
    pub page_token: Option<String>,
    pub initial_event_after: Option<DateTime<Utc>>,
    pub initial_event_before: Option<DateTime<Utc>>,
    pub reverse: bool,
}

impl ListAggregateIdsOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    pub fn initial_event_after(mut self, after: DateTime<Utc>) -> Self {
        self.initial_event_after = Some(after);
        self
    }

    pub fn initial_event_before(mut self, before: DateTime<Utc>) -> Self {
        self.initial_event_before = Some(before);
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListAggregateIdsOutput {
    pub aggregate_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
