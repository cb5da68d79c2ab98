//! Notification topic adapter.

use crate::config::RedpandaConfig;
use crate::producer::TopicProducer;
use async_trait::async_trait;
use chrono::Utc;
use relay_core::{Error, Notification, Result};
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::time::Instant;
use telemetry::metrics;
use tracing::debug;

/// Header carrying the notification subject.
pub const SUBJECT_HEADER: &str = "subject";

/// Destination for new-record notifications.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publishes one notification. Returns only once the topic has accepted it.
    async fn publish(&self, notification: &Notification) -> Result<()>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Publishes notifications to a Redpanda topic, keyed by record key.
pub struct RedpandaPublisher {
    producer: TopicProducer,
}

impl RedpandaPublisher {
    pub fn new(config: RedpandaConfig, topic_id: impl Into<String>) -> Self {
        Self {
            producer: TopicProducer::new(config, topic_id),
        }
    }

    pub fn topic(&self) -> &str {
        self.producer.topic()
    }
}

/// Builds the broker record for a notification.
pub fn to_record(notification: &Notification) -> Result<Record> {
    let mut headers = BTreeMap::new();
    headers.insert(
        SUBJECT_HEADER.to_string(),
        notification.subject.clone().into_bytes(),
    );

    Ok(Record {
        key: Some(notification.key.clone().into_bytes()),
        value: Some(notification.body_bytes()?),
        headers,
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl NotificationPublisher for RedpandaPublisher {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let record = to_record(notification)?;
        let start = Instant::now();

        let offsets = self
            .producer
            .send(vec![record])
            .await
            .map_err(|e| Error::publish(&notification.key, e))?;

        let elapsed = start.elapsed();
        metrics().publish_latency_ms.observe(elapsed.as_millis() as u64);

        debug!(
            topic = %self.producer.topic(),
            key = %notification.key,
            offset = ?offsets.first(),
            latency_ms = %elapsed.as_millis(),
            "Published notification"
        );
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.producer.health_check().await
    }
}
