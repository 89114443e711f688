use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::event::{EventDetail, EventStoreContext, NewEvent};
use super::storage::GroupCommitLog;

// ============================================================================
// Grouped Events - staging for multi-log commits
// ============================================================================

/// An event staged against a target log, waiting for `push_event_group`.
/// Lives for one grouped commit and is never persisted.
#[derive(Clone)]
pub struct GroupedEvent {
    pub event: NewEvent,
    pub log: Arc<dyn GroupCommitLog>,
    pub context: Option<EventStoreContext>,
}

impl GroupedEvent {
    pub fn new(event: NewEvent, log: Arc<dyn GroupCommitLog>) -> Self {
        Self { event, log, context: None }
    }

    pub fn with_context(mut self, context: EventStoreContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Debug for GroupedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedEvent")
            .field("event", &self.event)
            .field("log_family", &self.log.adapter_family())
            .field("log", &self.log.event_store_label())
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushEventGroupOptions {
    /// Forwarded to every member push.
    pub force: bool,
}

/// What a member log wrote, kept by the coordinator so it can undo the push.
#[derive(Clone, Debug, PartialEq)]
pub struct PushReceipt {
    pub event_store_id: String,
    pub event: EventDetail,
    /// The event a forced push overwrote, restored on revert.
    pub replaced: Option<EventDetail>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GroupedEventResult {
    pub event: EventDetail,
}

/// Result of a committed group, in commit order.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventGroup {
    pub event_group: Vec<GroupedEventResult>,
}

impl EventGroup {
    pub fn events(&self) -> impl Iterator<Item = &EventDetail> {
        self.event_group.iter().map(|entry| &entry.event)
    }

    pub fn len(&self) -> usize {
        self.event_group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_group.is_empty()
    }
}
