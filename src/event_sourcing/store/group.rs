use std::sync::Arc;

use chrono::Utc;

use crate::event_sourcing::core::{
    EventGroup, GroupCommitLog, GroupedEvent, GroupedEventResult, PushEventGroupOptions,
    PushEventOptions, PushReceipt, Result, RollbackFailure, StoreError,
};
use crate::metrics::StoreMetrics;

// ============================================================================
// Grouped Commit Coordinator
// ============================================================================
//
// Pushes a batch of grouped events, possibly spanning several logs, as one
// logical transaction:
// 1. Validate the whole batch up front (non-empty, contexts, log family)
// 2. Push sequentially in caller order, keeping a receipt per success
// 3. On the first failure, revert receipts in reverse commit order and
//    return the triggering error
//
// There is no shared transaction log between member logs, so this is a
// best-effort saga: concurrent writers to the same aggregates can observe
// the intermediate state, and a revert that fails leaves the logs
// inconsistent. That last case is reported as `RollbackIncomplete`.
//
// ============================================================================

pub struct GroupCommitCoordinator {
    family: &'static str,
    metrics: Option<Arc<StoreMetrics>>,
}

impl GroupCommitCoordinator {
    /// `family` is the adapter family of the log that received the call.
    pub fn new(family: &'static str, metrics: Option<Arc<StoreMetrics>>) -> Self {
        Self { family, metrics }
    }

    pub fn commit(
        &self,
        options: PushEventGroupOptions,
        grouped_events: Vec<GroupedEvent>,
    ) -> Result<EventGroup> {
        self.validate(&grouped_events)?;

        let group_size = grouped_events.len();
        let timestamp = Utc::now();
        let push_options = PushEventOptions { force: options.force };
        let mut committed: Vec<(Arc<dyn GroupCommitLog>, PushReceipt)> = Vec::with_capacity(group_size);

        for grouped in grouped_events {
            let GroupedEvent { mut event, log, context } = grouped;
            let Some(context) = context else {
                // validate() already rejected missing contexts
                return Err(StoreError::MissingContext { index: committed.len() });
            };
            // Events staged without a timestamp share one for the whole group.
            event.timestamp.get_or_insert(timestamp);

            match log.push_event_sync(event, &context, push_options) {
                Ok(receipt) => committed.push((log, receipt)),
                Err(error) => {
                    tracing::warn!(
                        committed = committed.len(),
                        error = %error,
                        "Event group push failed, rolling back"
                    );
                    return Err(self.rollback(committed, error));
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_group_committed(group_size);
        }

        tracing::info!(group_size = group_size, "✅ Event group committed");

        Ok(EventGroup {
            event_group: committed
                .into_iter()
                .map(|(_, receipt)| GroupedEventResult { event: receipt.event })
                .collect(),
        })
    }

    fn validate(&self, grouped_events: &[GroupedEvent]) -> Result<()> {
        if grouped_events.is_empty() {
            return Err(StoreError::EmptyEventGroup);
        }

        for (index, grouped) in grouped_events.iter().enumerate() {
            if grouped.context.is_none() {
                return Err(StoreError::MissingContext { index });
            }

            let found = grouped.log.adapter_family();
            if found != self.family {
                return Err(StoreError::IncompatibleEventGroup {
                    index,
                    expected: self.family,
                    found,
                });
            }
        }

        Ok(())
    }

    /// Undo every committed push, newest first. Never retries a revert.
    fn rollback(&self, committed: Vec<(Arc<dyn GroupCommitLog>, PushReceipt)>, cause: StoreError) -> StoreError {
        let mut failures = Vec::new();

        for (log, receipt) in committed.iter().rev() {
            if let Err(error) = log.revert_push(receipt) {
                tracing::error!(
                    event_store_id = %receipt.event_store_id,
                    aggregate_id = %receipt.event.aggregate_id,
                    version = receipt.event.version,
                    error = %error,
                    "Failed to compensate grouped push"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_rollback_failure(&receipt.event_store_id);
                }
                failures.push(RollbackFailure {
                    event_store_id: receipt.event_store_id.clone(),
                    aggregate_id: receipt.event.aggregate_id.clone(),
                    version: receipt.event.version,
                    reason: error.to_string(),
                });
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_group_rolled_back();
        }

        if failures.is_empty() {
            tracing::debug!(reverted = committed.len(), "Event group rolled back");
            cause
        } else {
            StoreError::RollbackIncomplete {
                source: Box::new(cause),
                failures,
            }
        }
    }
}
