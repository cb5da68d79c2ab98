//! End-to-end tests for the two-stage pipeline.
//!
//! Producer → MemoryQueue → IngestWorker → FailingStore (change feed) →
//! ChangeFeedWorker → RecordingPublisher
//!
//! The mocks implement the same traits as the Redpanda queue, the store
//! backends and the Redpanda publisher, so every production code path
//! runs except the network transports.

use integration_tests::{
    fixtures,
    mocks::{FailingStore, MemoryQueue, RecordingPublisher},
    setup::{pipeline_config, TestPipeline},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telemetry::health;
use tokio::sync::watch;
use worker::{Collaborators, SchedulerConfig, WorkerConfig, WorkerScheduler};

/// Every new order produces exactly one notification
#[tokio::test]
async fn test_orders_flow_to_topic() {
    let pipeline = TestPipeline::new();
    for order in fixtures::orders(12) {
        pipeline.queue.send_json(&order);
    }

    pipeline.drain_ingest().await;
    pipeline.drain_feed().await;

    assert_eq!(pipeline.store.inner().len(), 12);
    assert_eq!(pipeline.publisher.count(), 12);
    assert!(pipeline.queue.is_drained());

    let first = &pipeline.publisher.published()[0];
    assert_eq!(first.key, "ORD-0000");
    assert_eq!(first.body["new_record"]["order"]["total"], 0);
}

/// Redelivered and updated orders are not announced twice
#[tokio::test]
async fn test_duplicates_and_updates_are_not_announced() {
    let pipeline = TestPipeline::new();
    pipeline.queue.send_json(&fixtures::order("A1", 42));
    pipeline.queue.send_json(&fixtures::order("A1", 42));
    pipeline.queue.send_json(&fixtures::order("A1", 50));

    pipeline.drain_ingest().await;
    pipeline.drain_feed().await;

    assert_eq!(pipeline.store.inner().keys(), vec!["A1".to_string()]);
    assert_eq!(pipeline.publisher.published_keys(), vec!["A1"]);
    assert_eq!(
        pipeline.publisher.published()[0].body,
        json!({"new_record": {"orderID": "A1", "order": {"orderID": "A1", "total": 42}}})
    );
}

/// Unkeyed bodies are announced once per delivery
#[tokio::test]
async fn test_unkeyed_bodies_each_announced() {
    let pipeline = TestPipeline::new();
    pipeline.queue.send(fixtures::malformed_body());
    pipeline.queue.send(fixtures::malformed_body());

    pipeline.drain_ingest().await;
    pipeline.drain_feed().await;

    let keys = pipeline.publisher.published_keys();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
    for notification in pipeline.publisher.published() {
        assert_eq!(notification.body["new_record"]["order"], json!({"raw": "not-json"}));
    }
}

/// A failed write is neither stored nor announced until it succeeds
#[tokio::test]
async fn test_failed_write_announced_after_retry() {
    let pipeline = TestPipeline::new();
    pipeline.queue.send_json(&fixtures::order("A1", 1));
    pipeline.queue.send_json(&fixtures::order("B2", 2));
    pipeline.store.fail_key("B2");

    pipeline.ingest.run_once().await.unwrap();
    pipeline.drain_feed().await;
    assert_eq!(pipeline.publisher.published_keys(), vec!["A1"]);

    pipeline.store.clear_failures();
    pipeline.drain_ingest().await;
    pipeline.drain_feed().await;
    assert_eq!(pipeline.publisher.published_keys(), vec!["A1", "B2"]);
}

/// The scheduler runs both loops, reports health and stops on shutdown
#[tokio::test]
async fn test_scheduler_runs_until_shutdown() {
    let config = pipeline_config();
    let queue = Arc::new(MemoryQueue::default());
    let store = Arc::new(FailingStore::new(&config.store_table));
    let publisher = Arc::new(RecordingPublisher::new());

    for order in fixtures::orders(25) {
        queue.send_json(&order);
    }

    let scheduler = Arc::new(WorkerScheduler::new(
        SchedulerConfig {
            worker: WorkerConfig {
                idle_backoff: Duration::from_millis(5),
                retry_backoff: Duration::from_millis(5),
                ..WorkerConfig::from_pipeline(&config)
            },
            id_field: config.id_field.clone(),
            health_interval: Duration::from_millis(20),
        },
        Collaborators {
            queue: queue.clone(),
            store: store.clone(),
            feed: store.clone(),
            publisher: publisher.clone(),
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = scheduler.clone().start(shutdown_rx);

    tokio::time::timeout(Duration::from_secs(10), async {
        while publisher.count() < 25 || !health().is_ready() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline did not deliver all notifications in time");

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    assert_eq!(store.inner().len(), 25);
    assert!(queue.is_drained());
}
