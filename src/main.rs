use std::sync::Arc;

use event_log_store::{
    EventLogConfig, EventStorage, EventStoreContext, GetEventsOptions, InMemoryEventLog,
    ListAggregateIdsOptions, NewEvent, PushEventGroupOptions, PushEventOptions, StoreMetrics,
};
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_log_store=debug"))
        )
        .init();

    tracing::info!("🚀 Starting in-memory event log demo");

    // === 1. Two independent logs sharing one metrics registry ===
    let metrics = Arc::new(StoreMetrics::new()?);
    let orders = InMemoryEventLog::with_config(EventLogConfig::new("orders").with_metrics(metrics.clone()))?;
    let payments = InMemoryEventLog::with_config(EventLogConfig::new("payments").with_metrics(metrics.clone()))?;
    let orders_ctx = EventStoreContext::new("orders");
    let payments_ctx = EventStoreContext::new("payments");

    // === 2. Direct pushes ===
    let order_id = Uuid::new_v4().to_string();
    orders
        .push_event(
            NewEvent::new(&order_id, 1, "OrderCreated").with_field("payload", json!({ "items": 2 })),
            &orders_ctx,
            PushEventOptions::default(),
        )
        .await?;

    // A stale writer retrying version 1 is rejected.
    if let Err(conflict) = orders
        .push_event(NewEvent::new(&order_id, 1, "OrderCreated"), &orders_ctx, PushEventOptions::default())
        .await
    {
        tracing::warn!(error = %conflict, "Expected conflict");
    }

    // === 3. Grouped commit across both logs ===
    let payment_id = Uuid::new_v4().to_string();
    let group = orders
        .push_event_group(
            PushEventGroupOptions::default(),
            vec![
                orders.group_event_with_context(NewEvent::new(&order_id, 2, "OrderPaid"), orders_ctx.clone()),
                payments.group_event_with_context(NewEvent::new(&payment_id, 1, "PaymentCaptured"), payments_ctx.clone()),
            ],
        )
        .await?;
    tracing::info!(events = group.len(), "Order paid");

    // === 4. A group that fails halfway is compensated ===
    let refund = orders
        .push_event_group(
            PushEventGroupOptions::default(),
            vec![
                orders.group_event_with_context(NewEvent::new(&order_id, 3, "OrderRefunded"), orders_ctx.clone()),
                payments.group_event_with_context(NewEvent::new(&payment_id, 1, "PaymentRefunded"), payments_ctx.clone()),
            ],
        )
        .await;
    if let Err(error) = refund {
        tracing::warn!(error = %error, "Refund group rejected");
    }

    let history = orders.get_events(&order_id, GetEventsOptions::default()).await?;
    tracing::info!(
        order_id = %order_id,
        versions = ?history.events.iter().map(|e| e.version).collect::<Vec<_>>(),
        "Order history after rollback"
    );

    // === 5. Page through aggregates ===
    for n in 0..5 {
        orders
            .push_event(NewEvent::new(format!("order-{}", n), 1, "OrderCreated"), &orders_ctx, PushEventOptions::default())
            .await?;
    }

    let mut options = ListAggregateIdsOptions::default().limit(2);
    loop {
        let page = orders.list_aggregate_ids(options).await?;
        tracing::info!(aggregate_ids = ?page.aggregate_ids, "Aggregate page");
        match page.next_page_token {
            Some(token) => options = ListAggregateIdsOptions::default().page_token(token),
            None => break,
        }
    }

    println!("{}", metrics.gather_text()?);

    tracing::info!("🎉 Demo complete!");

    Ok(())
}
