use std::sync::Arc;

use crate::event_sourcing::core::NewEvent;
use crate::metrics::StoreMetrics;

// ============================================================================
// Event Log Configuration
// ============================================================================

#[derive(Clone)]
pub struct EventLogConfig {
    /// Label for logs, metrics and receipts. Push contexts still name the
    /// store for error attribution.
    pub event_store_id: String,
    /// Events loaded into the log at construction, validated like pushes.
    pub initial_events: Vec<NewEvent>,
    pub metrics: Option<Arc<StoreMetrics>>,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            event_store_id: "in-memory".to_string(),
            initial_events: Vec::new(),
            metrics: None,
        }
    }
}

impl EventLogConfig {
    pub fn new(event_store_id: impl Into<String>) -> Self {
        Self {
            event_store_id: event_store_id.into(),
            ..Self::default()
        }
    }

    pub fn with_initial_events(mut self, events: Vec<NewEvent>) -> Self {
        self.initial_events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EventLogConfig::default();
        assert_eq!(config.event_store_id, "in-memory");
        assert!(config.initial_events.is_empty());
        assert!(config.metrics.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let metrics = Arc::new(StoreMetrics::new().unwrap());
        let config = EventLogConfig::new("orders")
            .with_initial_events(vec![NewEvent::new("o-1", 1, "OrderCreated")])
            .with_metrics(metrics);

        assert_eq!(config.event_store_id, "orders");
        assert_eq!(config.initial_events.len(), 1);
        assert!(config.metrics.is_some());
    }
}
