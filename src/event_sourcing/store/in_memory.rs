use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::config::EventLogConfig;
use crate::event_sourcing::core::{
    EventDetail, EventGroup, EventStorage, EventStoreContext, GetEventsOptions, GetEventsOutput,
    GroupCommitLog, GroupedEvent, ListAggregateIdsOptions, ListAggregateIdsOutput, NewEvent,
    PushEventGroupOptions, PushEventOptions, PushReceipt, Result, StoreError,
};
use crate::metrics::StoreMetrics;

use super::group::GroupCommitCoordinator;
use super::pagination::{paginate, AggregateIndexEntry};

// ============================================================================
// In-Memory Event Log
// ============================================================================
//
// Responsibilities:
// 1. Keep each aggregate's history sorted by version
// 2. Reject a second event at the same (aggregate_id, version)
// 3. Serve version-range reads and the aggregate listing
// 4. Act as a member log of grouped commits (push + revert)
//
// The map sits behind one RwLock per log. Every mutation is a single
// write-lock section, so the uniqueness check and the insert cannot
// interleave with another writer.
//
// ============================================================================

pub const IN_MEMORY_FAMILY: &str = "in_memory";

type AggregateMap = BTreeMap<String, Vec<EventDetail>>;

/// Cheap to clone: clones share the same underlying log.
#[derive(Clone)]
pub struct InMemoryEventLog {
    inner: Arc<LogInner>,
}

struct LogInner {
    event_store_id: String,
    aggregates: RwLock<AggregateMap>,
    metrics: Option<Arc<StoreMetrics>>,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryEventLog {
    pub fn new(event_store_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(LogInner {
                event_store_id: event_store_id.into(),
                aggregates: RwLock::new(AggregateMap::new()),
                metrics: None,
            }),
        }
    }

    /// Build a log from config, seeding `initial_events` with the usual checks.
    pub fn with_config(config: EventLogConfig) -> Result<Self> {
        let EventLogConfig { event_store_id, initial_events, metrics } = config;

        let mut aggregates = AggregateMap::new();
        let context = EventStoreContext::new(event_store_id.clone());
        let now = Utc::now();
        for event in initial_events {
            event.validate()?;
            insert_event(&mut aggregates, event.into_detail(now), &context, PushEventOptions::default())?;
        }

        tracing::debug!(
            event_store_id = %event_store_id,
            aggregates = aggregates.len(),
            "Event log initialised"
        );

        Ok(Self {
            inner: Arc::new(LogInner {
                event_store_id,
                aggregates: RwLock::new(aggregates),
                metrics,
            }),
        })
    }

    pub fn event_store_id(&self) -> &str {
        &self.inner.event_store_id
    }

    /// Highest-version event of an aggregate, if it has any.
    pub fn get_last_event(&self, aggregate_id: &str) -> Result<Option<EventDetail>> {
        let aggregates = self.read()?;
        Ok(aggregates
            .get(aggregate_id)
            .and_then(|history| history.last())
            .cloned())
    }

    /// `group_event` with the push context already attached.
    pub fn group_event_with_context(&self, event: NewEvent, context: EventStoreContext) -> GroupedEvent {
        self.group_event(event).with_context(context)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, AggregateMap>> {
        self.inner.aggregates.read().map_err(|_| {
            StoreError::StorageUnavailable(format!("event log {} lock poisoned", self.inner.event_store_id))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, AggregateMap>> {
        self.inner.aggregates.write().map_err(|_| {
            StoreError::StorageUnavailable(format!("event log {} lock poisoned", self.inner.event_store_id))
        })
    }
}

/// Insert keeping version order. Returns the event a forced push replaced.
fn insert_event(
    aggregates: &mut AggregateMap,
    event: EventDetail,
    context: &EventStoreContext,
    options: PushEventOptions,
) -> Result<Option<EventDetail>> {
    let history = aggregates.entry(event.aggregate_id.clone()).or_default();

    match history.binary_search_by_key(&event.version, |existing| existing.version) {
        Ok(position) if options.force => Ok(Some(std::mem::replace(&mut history[position], event))),
        Ok(_) => Err(StoreError::EventAlreadyExists {
            event_store_id: context.event_store_id.clone(),
            aggregate_id: event.aggregate_id,
            version: event.version,
        }),
        Err(position) => {
            history.insert(position, event);
            Ok(None)
        }
    }
}

impl GroupCommitLog for InMemoryEventLog {
    fn adapter_family(&self) -> &'static str {
        IN_MEMORY_FAMILY
    }

    fn event_store_label(&self) -> &str {
        &self.inner.event_store_id
    }

    fn push_event_sync(
        &self,
        event: NewEvent,
        context: &EventStoreContext,
        options: PushEventOptions,
    ) -> Result<PushReceipt> {
        event.validate()?;
        let detail = event.into_detail(Utc::now());

        let replaced = {
            let mut aggregates = self.write()?;
            insert_event(&mut aggregates, detail.clone(), context, options)
        };

        let replaced = match replaced {
            Ok(replaced) => replaced,
            Err(error) => {
                if let Some(metrics) = &self.inner.metrics {
                    if error.is_conflict() {
                        metrics.record_conflict(&self.inner.event_store_id);
                    }
                }
                tracing::debug!(
                    event_store_id = %context.event_store_id,
                    aggregate_id = %detail.aggregate_id,
                    version = detail.version,
                    "Push rejected, version already exists"
                );
                return Err(error);
            }
        };

        if let Some(metrics) = &self.inner.metrics {
            metrics.record_push(&self.inner.event_store_id);
        }

        tracing::debug!(
            event_store_id = %context.event_store_id,
            aggregate_id = %detail.aggregate_id,
            version = detail.version,
            event_type = %detail.event_type,
            forced = replaced.is_some(),
            "Event pushed"
        );

        Ok(PushReceipt {
            event_store_id: context.event_store_id.clone(),
            event: detail,
            replaced,
        })
    }

    fn revert_push(&self, receipt: &PushReceipt) -> Result<()> {
        let aggregate_id = &receipt.event.aggregate_id;
        let version = receipt.event.version;
        let not_found = || StoreError::EventNotFound {
            event_store_id: receipt.event_store_id.clone(),
            aggregate_id: aggregate_id.clone(),
            version,
        };

        let mut aggregates = self.write()?;
        let history = aggregates.get_mut(aggregate_id).ok_or_else(not_found)?;
        let position = history
            .binary_search_by_key(&version, |existing| existing.version)
            .map_err(|_| not_found())?;

        // Someone else overwrote the slot since our push; leave their event alone.
        if history[position] != receipt.event {
            return Err(not_found());
        }

        match &receipt.replaced {
            Some(previous) => history[position] = previous.clone(),
            None => {
                history.remove(position);
                if history.is_empty() {
                    aggregates.remove(aggregate_id);
                }
            }
        }

        tracing::debug!(
            event_store_id = %receipt.event_store_id,
            aggregate_id = %aggregate_id,
            version = version,
            "Grouped push reverted"
        );

        Ok(())
    }
}

#[async_trait]
impl EventStorage for InMemoryEventLog {
    async fn push_event(
        &self,
        event: NewEvent,
        context: &EventStoreContext,
        options: PushEventOptions,
    ) -> Result<EventDetail> {
        self.push_event_sync(event, context, options).map(|receipt| receipt.event)
    }

    async fn get_events(&self, aggregate_id: &str, options: GetEventsOptions) -> Result<GetEventsOutput> {
        let mut events: Vec<EventDetail> = {
            let aggregates = self.read()?;
            aggregates
                .get(aggregate_id)
                .map(|history| {
                    history
                        .iter()
                        .filter(|event| options.min_version.map_or(true, |min| event.version >= min))
                        .filter(|event| options.max_version.map_or(true, |max| event.version <= max))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if options.reverse {
            events.reverse();
        }
        if let Some(limit) = options.limit {
            events.truncate(limit);
        }

        tracing::debug!(
            event_store_id = %self.inner.event_store_id,
            aggregate_id = %aggregate_id,
            count = events.len(),
            "Loaded events"
        );

        Ok(GetEventsOutput { events })
    }

    async fn list_aggregate_ids(&self, options: ListAggregateIdsOptions) -> Result<ListAggregateIdsOutput> {
        let index: Vec<AggregateIndexEntry> = {
            let aggregates = self.read()?;
            aggregates
                .iter()
                .filter_map(|(aggregate_id, history)| {
                    history.first().map(|initial| AggregateIndexEntry {
                        aggregate_id: aggregate_id.clone(),
                        initial_event_timestamp: initial.timestamp,
                    })
                })
                .collect()
        };

        paginate(index, &options)
    }

    fn group_event(&self, event: NewEvent) -> GroupedEvent {
        GroupedEvent::new(event, Arc::new(self.clone()))
    }

    async fn push_event_group(
        &self,
        options: PushEventGroupOptions,
        grouped_events: Vec<GroupedEvent>,
    ) -> Result<EventGroup> {
        GroupCommitCoordinator::new(IN_MEMORY_FAMILY, self.inner.metrics.clone()).commit(options, grouped_events)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use futures_util::future::join_all;
    use serde_json::json;

    fn ctx(id: &str) -> EventStoreContext {
        EventStoreContext::new(id)
    }

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    async fn push(log: &InMemoryEventLog, aggregate_id: &str, version: u64) -> Result<EventDetail> {
        log.push_event(
            NewEvent::new(aggregate_id, version, "T"),
            &ctx(log.event_store_id()),
            PushEventOptions::default(),
        )
        .await
    }

    async fn versions(log: &InMemoryEventLog, aggregate_id: &str) -> Vec<u64> {
        log.get_events(aggregate_id, GetEventsOptions::default())
            .await
            .unwrap()
            .events
            .iter()
            .map(|event| event.version)
            .collect()
    }

    #[tokio::test]
    async fn test_push_assigns_timestamp_and_keeps_payload() {
        let log = InMemoryEventLog::new("orders");
        let before = Utc::now();

        let stored = log
            .push_event(
                NewEvent::new("o-1", 1, "OrderCreated").with_field("payload", json!({ "qty": 2 })),
                &ctx("orders"),
                PushEventOptions::default(),
            )
            .await
            .unwrap();

        assert!(stored.timestamp >= before);
        assert_eq!(stored.field("payload"), Some(&json!({ "qty": 2 })));

        let read = log.get_events("o-1", GetEventsOptions::default()).await.unwrap();
        assert_eq!(read.events, vec![stored]);
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected_without_mutation() {
        let log = InMemoryEventLog::new("orders");
        push(&log, "o-1", 1).await.unwrap();

        let err = log
            .push_event(
                NewEvent::new("o-1", 1, "Other"),
                &ctx("orders-store"),
                PushEventOptions::default(),
            )
            .await
            .unwrap_err();

        match err {
            StoreError::EventAlreadyExists { event_store_id, aggregate_id, version } => {
                assert_eq!(event_store_id, "orders-store");
                assert_eq!(aggregate_id, "o-1");
                assert_eq!(version, 1);
            }
            other => panic!("expected EventAlreadyExists, got {:?}", other),
        }

        let events = log.get_events("o-1", GetEventsOptions::default()).await.unwrap().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "T");
    }

    #[tokio::test]
    async fn test_invalid_events_rejected() {
        let log = InMemoryEventLog::new("orders");
        assert!(push(&log, "", 1).await.unwrap_err().is_validation());
        assert!(push(&log, "o-1", 0).await.unwrap_err().is_validation());
        assert!(log.list_aggregate_ids(ListAggregateIdsOptions::default()).await.unwrap().aggregate_ids.is_empty());
    }

    #[tokio::test]
    async fn test_forced_push_replaces_existing_version() {
        let log = InMemoryEventLog::new("orders");
        push(&log, "o-1", 1).await.unwrap();

        let replaced = log
            .push_event(
                NewEvent::new("o-1", 1, "Corrected"),
                &ctx("orders"),
                PushEventOptions { force: true },
            )
            .await
            .unwrap();

        assert_eq!(replaced.event_type, "Corrected");
        let events = log.get_events("o-1", GetEventsOptions::default()).await.unwrap().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "Corrected");
    }

    #[tokio::test]
    async fn test_out_of_order_versions_are_stored_sorted() {
        let log = InMemoryEventLog::new("orders");
        for version in [3, 1, 7, 2] {
            push(&log, "o-1", version).await.unwrap();
        }

        assert_eq!(versions(&log, "o-1").await, vec![1, 2, 3, 7]);
        assert_eq!(log.get_last_event("o-1").unwrap().map(|e| e.version), Some(7));
        assert_eq!(log.get_last_event("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_events_range_reverse_and_limit() {
        let log = InMemoryEventLog::new("orders");
        for version in 1..=6 {
            push(&log, "o-1", version).await.unwrap();
        }

        let range = GetEventsOptions::default().min_version(2).max_version(4);
        let ids = |events: Vec<EventDetail>| events.iter().map(|e| e.version).collect::<Vec<_>>();

        assert_eq!(ids(log.get_events("o-1", range.clone()).await.unwrap().events), vec![2, 3, 4]);
        assert_eq!(
            ids(log.get_events("o-1", range.clone().reversed()).await.unwrap().events),
            vec![4, 3, 2]
        );
        assert_eq!(
            ids(log.get_events("o-1", range.clone().reversed().limit(2)).await.unwrap().events),
            vec![4, 3]
        );
        assert_eq!(ids(log.get_events("o-1", range.limit(2)).await.unwrap().events), vec![2, 3]);

        let unknown = log.get_events("nobody", GetEventsOptions::default()).await.unwrap();
        assert!(unknown.events.is_empty());
    }

    #[tokio::test]
    async fn test_latest_event_via_reverse_limit() {
        let log = InMemoryEventLog::new("things");
        push(&log, "x", 1).await.unwrap();
        push(&log, "x", 2).await.unwrap();

        let latest = log
            .get_events("x", GetEventsOptions::default().limit(1).reversed())
            .await
            .unwrap();

        assert_eq!(latest.events.len(), 1);
        assert_eq!(latest.events[0].version, 2);
    }

    #[tokio::test]
    async fn test_list_aggregate_ids_two_pages() {
        let log = InMemoryEventLog::new("things");
        for (id, year) in [("late", 2022), ("early", 2021)] {
            log.push_event(
                NewEvent::new(id, 1, "Created").with_timestamp(at(year)),
                &ctx("things"),
                PushEventOptions::default(),
            )
            .await
            .unwrap();
        }

        let first = log
            .list_aggregate_ids(ListAggregateIdsOptions::default().limit(1))
            .await
            .unwrap();
        assert_eq!(first.aggregate_ids, vec!["early"]);
        let token = first.next_page_token.expect("a second page");

        let second = log
            .list_aggregate_ids(ListAggregateIdsOptions::default().page_token(token))
            .await
            .unwrap();
        assert_eq!(second.aggregate_ids, vec!["late"]);
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_initial_timestamp_comes_from_lowest_version() {
        let log = InMemoryEventLog::new("things");
        let push_at = |id: &'static str, version: u64, year: i32| {
            let log = log.clone();
            async move {
                log.push_event(
                    NewEvent::new(id, version, "T").with_timestamp(at(year)),
                    &ctx("things"),
                    PushEventOptions::default(),
                )
                .await
                .unwrap();
            }
        };

        push_at("a", 2, 2020).await;
        push_at("a", 1, 2023).await;
        push_at("b", 1, 2021).await;

        let listing = log.list_aggregate_ids(ListAggregateIdsOptions::default()).await.unwrap();
        assert_eq!(listing.aggregate_ids, vec!["b", "a"]);

        let filtered = log
            .list_aggregate_ids(ListAggregateIdsOptions::default().initial_event_before(at(2022)))
            .await
            .unwrap();
        assert_eq!(filtered.aggregate_ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_with_config_seeds_initial_events() {
        let config = EventLogConfig::new("orders").with_initial_events(vec![
            NewEvent::new("o-1", 1, "OrderCreated").with_timestamp(at(2021)),
            NewEvent::new("o-1", 2, "OrderShipped"),
        ]);
        let log = InMemoryEventLog::with_config(config).unwrap();

        assert_eq!(log.event_store_id(), "orders");
        assert_eq!(versions(&log, "o-1").await, vec![1, 2]);
        assert!(push(&log, "o-1", 2).await.unwrap_err().is_conflict());

        let duplicate = EventLogConfig::new("orders").with_initial_events(vec![
            NewEvent::new("o-1", 1, "A"),
            NewEvent::new("o-1", 1, "B"),
        ]);
        assert!(InMemoryEventLog::with_config(duplicate).is_err());
    }

    #[tokio::test]
    async fn test_event_group_commits_across_logs() {
        let orders = InMemoryEventLog::new("orders");
        let payments = InMemoryEventLog::new("payments");

        let group = orders
            .push_event_group(
                PushEventGroupOptions::default(),
                vec![
                    orders.group_event_with_context(NewEvent::new("o-1", 1, "OrderPaid"), ctx("orders")),
                    payments.group_event_with_context(NewEvent::new("p-1", 1, "PaymentCaptured"), ctx("payments")),
                ],
            )
            .await
            .unwrap();

        let types: Vec<_> = group.events().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["OrderPaid", "PaymentCaptured"]);
        assert_eq!(versions(&orders, "o-1").await, vec![1]);
        assert_eq!(versions(&payments, "p-1").await, vec![1]);

        let serialized = serde_json::to_value(&group).unwrap();
        assert_eq!(serialized["eventGroup"][1]["event"]["aggregateId"], "p-1");
    }

    #[tokio::test]
    async fn test_failed_group_rolls_back_earlier_members() {
        let a = InMemoryEventLog::new("a");
        let b = InMemoryEventLog::new("b");
        push(&b, "b-1", 1).await.unwrap();

        let err = a
            .push_event_group(
                PushEventGroupOptions::default(),
                vec![
                    a.group_event_with_context(NewEvent::new("a-1", 1, "T"), ctx("a")),
                    b.group_event_with_context(NewEvent::new("b-1", 1, "T"), ctx("b")),
                ],
            )
            .await
            .unwrap_err();

        match &err {
            StoreError::EventAlreadyExists { event_store_id, aggregate_id, .. } => {
                assert_eq!(event_store_id, "b");
                assert_eq!(aggregate_id, "b-1");
            }
            other => panic!("expected the original conflict, got {:?}", other),
        }

        assert!(versions(&a, "a-1").await.is_empty());
        assert!(a.list_aggregate_ids(ListAggregateIdsOptions::default()).await.unwrap().aggregate_ids.is_empty());
        assert_eq!(versions(&b, "b-1").await, vec![1]);
    }

    #[tokio::test]
    async fn test_same_log_group_rolls_back_in_reverse() {
        let log = InMemoryEventLog::new("orders");
        push(&log, "o-1", 1).await.unwrap();

        let err = log
            .push_event_group(
                PushEventGroupOptions::default(),
                vec![
                    log.group_event_with_context(NewEvent::new("o-1", 2, "T"), ctx("orders")),
                    log.group_event_with_context(NewEvent::new("o-1", 3, "T"), ctx("orders")),
                    log.group_event_with_context(NewEvent::new("o-1", 2, "T"), ctx("orders")),
                ],
            )
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(versions(&log, "o-1").await, vec![1]);
    }

    #[tokio::test]
    async fn test_forced_group_rollback_restores_replaced_event() {
        let a = InMemoryEventLog::new("a");
        let b = InMemoryEventLog::new("b");
        a.push_event(NewEvent::new("a-1", 1, "Original"), &ctx("a"), PushEventOptions::default())
            .await
            .unwrap();

        let err = a
            .push_event_group(
                PushEventGroupOptions { force: true },
                vec![
                    a.group_event_with_context(NewEvent::new("a-1", 1, "Overwrite"), ctx("a")),
                    b.group_event_with_context(NewEvent::new("", 1, "Invalid"), ctx("b")),
                ],
            )
            .await
            .unwrap_err();

        assert!(err.is_validation());
        let events = a.get_events("a-1", GetEventsOptions::default()).await.unwrap().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "Original");
    }

    #[tokio::test]
    async fn test_group_without_context_commits_nothing() {
        let a = InMemoryEventLog::new("a");
        let b = InMemoryEventLog::new("b");

        let err = a
            .push_event_group(
                PushEventGroupOptions::default(),
                vec![
                    a.group_event_with_context(NewEvent::new("a-1", 1, "T"), ctx("a")),
                    b.group_event(NewEvent::new("b-1", 1, "T")),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::MissingContext { index: 1 }));
        assert!(versions(&a, "a-1").await.is_empty());
        assert!(versions(&b, "b-1").await.is_empty());

        let empty = a.push_event_group(PushEventGroupOptions::default(), Vec::new()).await;
        assert!(matches!(empty, Err(StoreError::EmptyEventGroup)));
    }

    #[tokio::test]
    async fn test_revert_refuses_foreign_overwrite() {
        let log = InMemoryEventLog::new("orders");
        let receipt = log
            .push_event_sync(NewEvent::new("o-1", 1, "Mine"), &ctx("orders"), PushEventOptions::default())
            .unwrap();
        log.push_event_sync(NewEvent::new("o-1", 1, "Theirs"), &ctx("orders"), PushEventOptions { force: true })
            .unwrap();

        assert!(matches!(log.revert_push(&receipt), Err(StoreError::EventNotFound { .. })));
        assert_eq!(log.get_last_event("o-1").unwrap().map(|e| e.event_type), Some("Theirs".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_of_same_version_single_winner() {
        let log = InMemoryEventLog::new("orders");

        let attempts = (0..16).map(|n| {
            let log = log.clone();
            tokio::spawn(async move {
                log.push_event(
                    NewEvent::new("o-1", 1, format!("Attempt{}", n)),
                    &EventStoreContext::new("orders"),
                    PushEventOptions::default(),
                )
                .await
            })
        });

        let results = join_all(attempts).await;
        let winners = results
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .filter(|result| result.is_ok())
            .count();

        assert_eq!(winners, 1);
        assert_eq!(versions(&log, "o-1").await, vec![1]);
    }

    #[tokio::test]
    async fn test_metrics_follow_pushes_and_groups() {
        let metrics = Arc::new(StoreMetrics::new().unwrap());
        let log = InMemoryEventLog::with_config(EventLogConfig::new("orders").with_metrics(metrics.clone())).unwrap();

        push(&log, "o-1", 1).await.unwrap();
        push(&log, "o-1", 1).await.unwrap_err();
        log.push_event_group(
            PushEventGroupOptions::default(),
            vec![log.group_event_with_context(NewEvent::new("o-1", 2, "T"), ctx("orders"))],
        )
        .await
        .unwrap();

        assert_eq!(metrics.events_pushed.with_label_values(&["orders"]).get(), 2);
        assert_eq!(metrics.push_conflicts.with_label_values(&["orders"]).get(), 1);
        assert_eq!(metrics.groups_committed.get(), 1);
    }
}
