//! Queue → store stage against the in-memory queue and store.
//!
//! Exercises the real IngestWorker and IngestConsumer: decoding, keying,
//! per-message failure isolation, acknowledgement and redelivery.

use integration_tests::{fixtures, setup::TestPipeline};
use record_store::{ChangeFeed, RecordStore};
use relay_core::{ChangeKind, PipelineConfig};
use serde_json::json;
use std::time::Duration;

/// Scenario A: keyed order is stored under its key, redelivery keeps one record
#[tokio::test]
async fn test_keyed_order_is_idempotent() {
    let pipeline = TestPipeline::new();
    let body = json!({"orderID": "A1", "total": 42});

    pipeline.queue.send_json(&body);
    pipeline.drain_ingest().await;

    // Producer sends the same message again (at-least-once)
    pipeline.queue.send_json(&body);
    pipeline.drain_ingest().await;

    let store = pipeline.store.inner();
    assert_eq!(store.keys(), vec!["A1".to_string()]);

    let record = store.get("A1").await.unwrap().unwrap();
    assert_eq!(
        record.to_document("orderID"),
        json!({"orderID": "A1", "order": {"orderID": "A1", "total": 42}})
    );
    assert!(pipeline.queue.is_drained());
}

/// Later write for the same key replaces the payload, no merge
#[tokio::test]
async fn test_last_write_wins() {
    let pipeline = TestPipeline::new();
    pipeline.queue.send_json(&json!({"orderID": "A1", "total": 1, "note": "first"}));
    pipeline.queue.send_json(&json!({"orderID": "A1", "total": 2}));
    pipeline.drain_ingest().await;

    let record = pipeline.store.get("A1").await.unwrap().unwrap();
    assert_eq!(record.payload.to_value(), json!({"orderID": "A1", "total": 2}));

    let kinds: Vec<_> = pipeline
        .store
        .read_changes(0, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![ChangeKind::Created, ChangeKind::Updated]);
}

/// Scenario B: malformed body is stored raw under a generated key
#[tokio::test]
async fn test_malformed_body_is_stored_raw() {
    let pipeline = TestPipeline::new();
    pipeline.queue.send(fixtures::malformed_body());

    let batches = pipeline.drain_ingest().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].succeeded, 1);

    let keys = pipeline.store.inner().keys();
    assert_eq!(keys.len(), 1);
    assert!(uuid::Uuid::parse_str(&keys[0]).is_ok(), "key should be a UUID");

    let record = pipeline.store.get(&keys[0]).await.unwrap().unwrap();
    assert_eq!(
        record.to_document("orderID"),
        json!({"orderID": keys[0], "order": {"raw": "not-json"}})
    );
}

/// Unkeyed order delivered twice produces two records
#[tokio::test]
async fn test_unkeyed_redelivery_duplicates() {
    let pipeline = TestPipeline::new();
    let body = fixtures::unkeyed_order(7);
    pipeline.queue.send_json(&body);
    pipeline.queue.send_json(&body);
    pipeline.drain_ingest().await;

    let keys = pipeline.store.inner().keys();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

/// Empty and non-string keys fall back to synthesized keys; numbers are kept
#[tokio::test]
async fn test_key_field_variants() {
    let pipeline = TestPipeline::new();
    pipeline.queue.send_json(&json!({"orderID": ""}));
    pipeline.queue.send_json(&json!({"orderID": null}));
    pipeline.queue.send_json(&json!({"orderID": 1234}));
    pipeline.drain_ingest().await;

    let keys = pipeline.store.inner().keys();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&"1234".to_string()));
}

/// Partial failure: one of N writes fails, only that message is redelivered
#[tokio::test]
async fn test_partial_batch_failure() {
    let pipeline = TestPipeline::new();
    for order in fixtures::orders(5) {
        pipeline.queue.send_json(&order);
    }
    pipeline.store.fail_key("ORD-0002");

    let stats = pipeline.ingest.run_once().await.unwrap();
    assert_eq!(stats.received, 5);
    assert_eq!(stats.succeeded, 4);

    assert_eq!(pipeline.store.inner().len(), 4);
    assert!(pipeline.store.get("ORD-0002").await.unwrap().is_none());
    assert_eq!(pipeline.queue.awaiting_redelivery(), 1);
    assert_eq!(pipeline.queue.committed_offset(), 2);

    // Store recovers; redelivery completes the batch
    pipeline.store.clear_failures();
    let retry = pipeline.ingest.run_once().await.unwrap();
    assert_eq!(retry.received, 1);
    assert_eq!(retry.succeeded, 1);
    assert_eq!(pipeline.store.inner().len(), 5);
    assert!(pipeline.queue.is_drained());
}

/// Persistent write failures end in the dead-letter collection
#[tokio::test]
async fn test_exhausted_message_is_dead_lettered() {
    let pipeline = TestPipeline::with_config(
        PipelineConfig {
            topic_id: "t".into(),
            ..PipelineConfig::default()
        },
        3,
    );
    pipeline.queue.send_json(&fixtures::order("BAD", 1));
    pipeline.queue.send_json(&fixtures::order("GOOD", 2));
    pipeline.store.fail_key("BAD");

    pipeline.drain_ingest().await;

    assert_eq!(pipeline.store.inner().keys(), vec!["GOOD".to_string()]);
    let dead = pipeline.queue.dead_letters();
    assert_eq!(dead.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&dead[0]).unwrap();
    assert_eq!(body["orderID"], "BAD");
    assert!(pipeline.queue.is_drained());
}

/// Batches are capped at the configured size
#[tokio::test]
async fn test_batch_size_is_respected() {
    let pipeline = TestPipeline::with_config(
        PipelineConfig {
            topic_id: "t".into(),
            batch_size: 4,
            ..PipelineConfig::default()
        },
        5,
    );
    for order in fixtures::orders(10) {
        pipeline.queue.send_json(&order);
    }

    let batches = pipeline.drain_ingest().await;
    let sizes: Vec<_> = batches.iter().map(|b| b.received).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(pipeline.store.inner().len(), 10);
}

/// A batch that overruns its time budget acknowledges nothing
#[tokio::test(start_paused = true)]
async fn test_timed_out_batch_is_redelivered_in_full() {
    let pipeline = TestPipeline::new();
    for order in fixtures::orders(3) {
        pipeline.queue.send_json(&order);
    }
    pipeline
        .store
        .set_write_delay(Some(pipeline.config.batch_timeout() + Duration::from_secs(1)));

    let stats = pipeline.ingest.run_once().await.unwrap();
    assert!(stats.timed_out);
    assert_eq!(pipeline.queue.awaiting_redelivery(), 3);
    assert_eq!(pipeline.queue.committed_offset(), 0);

    pipeline.store.set_write_delay(None);
    let retry = pipeline.ingest.run_once().await.unwrap();
    assert_eq!(retry.succeeded, 3);
    assert_eq!(pipeline.store.inner().len(), 3);
    assert!(pipeline.queue.is_drained());
}

/// Queue transport errors surface from run_once
#[tokio::test]
async fn test_queue_error_is_reported() {
    let pipeline = TestPipeline::new();
    pipeline.queue.set_fail_receive(true);

    let err = pipeline.ingest.run_once().await.unwrap_err();
    assert_eq!(err.error_code(), Some("QUEUE_001"));
}

/// A custom ID_FIELD keys records and names the document field
#[tokio::test]
async fn test_custom_id_field() {
    let pipeline = TestPipeline::with_config(
        PipelineConfig {
            topic_id: "t".into(),
            id_field: "sku".into(),
            store_table: "products".into(),
            ..PipelineConfig::default()
        },
        5,
    );
    pipeline.queue.send_json(&json!({"sku": "X-9", "qty": 3}));
    pipeline.drain_ingest().await;

    let record = pipeline.store.get("X-9").await.unwrap().unwrap();
    assert_eq!(
        record.to_document("sku"),
        json!({"sku": "X-9", "order": {"sku": "X-9", "qty": 3}})
    );
    assert_eq!(pipeline.store.inner().table(), "products");
}
