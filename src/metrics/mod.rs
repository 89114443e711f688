use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the event logs
// ============================================================================
//
// Covers:
// - Single pushes and optimistic concurrency conflicts, per event store
// - Grouped commits: committed, rolled back, group size
// - Compensation steps that failed during rollback
//
// Each instance owns its registry so several logs (or tests) never collide
// on metric names.
// ============================================================================

pub struct StoreMetrics {
    registry: Registry,

    pub events_pushed: IntCounterVec,
    pub push_conflicts: IntCounterVec,

    pub groups_committed: IntCounter,
    pub groups_rolled_back: IntCounter,
    pub group_size: Histogram,
    pub rollback_failures: IntCounterVec,
}

impl StoreMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let events_pushed = IntCounterVec::new(
            Opts::new("event_log_events_pushed_total", "Events appended to an event log"),
            &["event_store_id"],
        )?;
        registry.register(Box::new(events_pushed.clone()))?;

        let push_conflicts = IntCounterVec::new(
            Opts::new("event_log_push_conflicts_total", "Pushes rejected because the version already exists"),
            &["event_store_id"],
        )?;
        registry.register(Box::new(push_conflicts.clone()))?;

        let groups_committed = IntCounter::new(
            "event_log_groups_committed_total",
            "Event groups committed across logs",
        )?;
        registry.register(Box::new(groups_committed.clone()))?;

        let groups_rolled_back = IntCounter::new(
            "event_log_groups_rolled_back_total",
            "Event groups that failed and were compensated",
        )?;
        registry.register(Box::new(groups_rolled_back.clone()))?;

        let group_size = Histogram::with_opts(
            HistogramOpts::new("event_log_group_size", "Number of events per committed group")
                .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0]),
        )?;
        registry.register(Box::new(group_size.clone()))?;

        let rollback_failures = IntCounterVec::new(
            Opts::new("event_log_rollback_failures_total", "Compensation steps that could not be applied"),
            &["event_store_id"],
        )?;
        registry.register(Box::new(rollback_failures.clone()))?;

        Ok(Self {
            registry,
            events_pushed,
            push_conflicts,
            groups_committed,
            groups_rolled_back,
            group_size,
            rollback_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_push(&self, event_store_id: &str) {
        self.events_pushed.with_label_values(&[event_store_id]).inc();
    }

    pub fn record_conflict(&self, event_store_id: &str) {
        self.push_conflicts.with_label_values(&[event_store_id]).inc();
    }

    pub fn record_group_committed(&self, size: usize) {
        self.groups_committed.inc();
        self.group_size.observe(size as f64);
    }

    pub fn record_group_rolled_back(&self) {
        self.groups_rolled_back.inc();
    }

    pub fn record_rollback_failure(&self, event_store_id: &str) {
        self.rollback_failures.with_label_values(&[event_store_id]).inc();
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_push("orders");
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_push_and_conflict() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_push("orders");
        metrics.record_push("orders");
        metrics.record_conflict("orders");

        assert_eq!(metrics.events_pushed.with_label_values(&["orders"]).get(), 2);
        assert_eq!(metrics.push_conflicts.with_label_values(&["orders"]).get(), 1);
        assert_eq!(metrics.events_pushed.with_label_values(&["payments"]).get(), 0);
    }

    #[test]
    fn test_group_metrics() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_group_committed(3);
        metrics.record_group_rolled_back();
        metrics.record_rollback_failure("orders");

        assert_eq!(metrics.groups_committed.get(), 1);
        assert_eq!(metrics.groups_rolled_back.get(), 1);
        assert_eq!(metrics.group_size.get_sample_count(), 1);
        assert_eq!(metrics.rollback_failures.with_label_values(&["orders"]).get(), 1);
    }

    #[test]
    fn test_gather_text_exposes_metric_names() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_push("orders");
        metrics.record_group_committed(2);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("event_log_events_pushed_total"));
        assert!(text.contains("event_log_groups_committed_total 1"));
    }
}
