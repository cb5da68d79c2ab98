//! Inbound order queue on top of a Redpanda partition.
//!
//! The ingest stage expects queue semantics: messages are handed out, then
//! either acknowledged (gone for good) or released (handed out again later,
//! until `max_receive_count` is reached and the message is moved to the
//! dead-letter topic). [`DeliveryTracker`] keeps that state per partition;
//! this module wires it to the broker.
//!
//! Committed offsets are kept in memory only, so a restarted process
//! resumes from the configured start offset.

use crate::config::{RedpandaConfig, StartOffset};
use crate::connection::partition_client;
use crate::delivery::{DeliveryTracker, Pending};
use crate::producer::TopicProducer;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use relay_core::{AckToken, Error, RawMessage, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient};
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Source of raw messages for the ingest stage.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Returns up to `max` messages. An empty batch means nothing is
    /// available right now.
    async fn receive(&self, max: usize) -> Result<Vec<RawMessage>>;

    /// Removes successfully processed messages from the queue.
    async fn acknowledge(&self, tokens: &[AckToken]) -> Result<()>;

    /// Makes messages available for redelivery.
    async fn release(&self, tokens: &[AckToken]) -> Result<()>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Queue backed by one partition of a Redpanda topic.
pub struct RedpandaQueue {
    config: RedpandaConfig,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// `None` until the start offset has been resolved.
    tracker: Mutex<Option<DeliveryTracker>>,
    dead_letters: TopicProducer,
    /// Serializes `receive` so fetch positions are not raced.
    receiving: tokio::sync::Mutex<()>,
}

impl RedpandaQueue {
    pub fn new(config: RedpandaConfig) -> Self {
        info!(
            topic = %config.queue.topic,
            partition = config.queue.partition,
            dead_letter_topic = %config.queue.dead_letter_topic,
            max_receive_count = config.queue.max_receive_count,
            "Creating Redpanda queue"
        );

        let dead_letters = TopicProducer::new(config.clone(), config.queue.dead_letter_topic.clone());
        Self {
            config,
            partition_client: RwLock::new(None),
            tracker: Mutex::new(None),
            dead_letters,
            receiving: tokio::sync::Mutex::new(()),
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let queue = &self.config.queue;
        let client = partition_client(&self.config, &queue.topic, queue.partition)
            .await
            .map_err(Error::queue)?;

        let uninitialized = self.tracker.lock().is_none();
        if uninitialized {
            let at = match queue.start_offset {
                StartOffset::Earliest => OffsetAt::Earliest,
                StartOffset::Latest => OffsetAt::Latest,
            };
            let offset = client
                .get_offset(at)
                .await
                .map_err(|e| Error::queue(format!("Failed to get offset: {}", e)))?;

            *self.tracker.lock() = Some(DeliveryTracker::new(offset, queue.max_receive_count));

            info!(
                topic = %queue.topic,
                partition = queue.partition,
                offset,
                "Queue initialized at offset"
            );
        }

        {
            let mut guard = self.partition_client.write().await;
            *guard = Some(client.clone());
        }

        Ok(client)
    }

    fn with_tracker<T>(&self, f: impl FnOnce(&mut DeliveryTracker) -> T) -> Result<T> {
        let mut guard = self.tracker.lock();
        let tracker = guard
            .as_mut()
            .ok_or_else(|| Error::queue("Queue has not been read from yet"))?;
        Ok(f(tracker))
    }

    /// Moves exhausted messages to the dead-letter topic.
    ///
    /// A message that cannot be dead-lettered goes back to the tracker and
    /// is tried again on the next receive.
    async fn dead_letter(&self, exhausted: Vec<Pending>) {
        for pending in exhausted {
            let mut headers = BTreeMap::new();
            headers.insert(
                "source_topic".to_string(),
                self.config.queue.topic.clone().into_bytes(),
            );
            headers.insert(
                "source_offset".to_string(),
                pending.offset.to_string().into_bytes(),
            );
            headers.insert(
                "receive_count".to_string(),
                pending.receive_count.to_string().into_bytes(),
            );

            let record = Record {
                key: None,
                value: Some(pending.body.clone()),
                headers,
                timestamp: Utc::now(),
            };

            match self.dead_letters.send(vec![record]).await {
                Ok(_) => {
                    metrics().messages_dead_lettered.inc();
                    warn!(
                        offset = pending.offset,
                        receive_count = pending.receive_count,
                        dead_letter_topic = %self.dead_letters.topic(),
                        "Message exceeded max receive count, moved to dead-letter topic"
                    );
                }
                Err(e) => {
                    error!(offset = pending.offset, error = %e, "Failed to dead-letter message");
                    let _ = self.with_tracker(|t| t.restore(pending));
                }
            }
        }
    }

    fn update_in_flight(&self) {
        if let Ok(in_flight) = self.with_tracker(|t| t.in_flight()) {
            metrics().messages_in_flight.set(in_flight as u64);
        }
    }

    /// Drops the cached connection (for error recovery).
    pub async fn reset_connection(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
        info!("Queue connection reset");
    }
}

#[async_trait]
impl MessageQueue for RedpandaQueue {
    async fn receive(&self, max: usize) -> Result<Vec<RawMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let _receiving = self.receiving.lock().await;
        let client = self.ensure_connected().await?;

        let redeliveries = self.with_tracker(|t| t.take_redeliveries(max))?;
        if !redeliveries.exhausted.is_empty() {
            self.dead_letter(redeliveries.exhausted).await;
        }

        let mut messages = redeliveries.messages;
        let redelivered = messages.len();

        if messages.len() < max {
            let queue = &self.config.queue;
            let start = self.with_tracker(|t| t.next_fetch_offset())?;
            // Do not hold back redeliveries waiting for new records.
            let max_wait_ms = if messages.is_empty() {
                queue.fetch_wait_ms.min(i32::MAX as u64) as i32
            } else {
                0
            };

            let (records, high_watermark) = match client
                .fetch_records(start, 1..queue.fetch_max_bytes, max_wait_ms)
                .await
            {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!(offset = start, error = %e, "Fetch error");
                    self.reset_connection().await;
                    if messages.is_empty() {
                        return Err(Error::queue(format!("Failed to fetch records: {}", e)));
                    }
                    // Redeliveries are already in flight; hand them out.
                    (Vec::new(), start)
                }
            };

            self.with_tracker(|tracker| {
                for record in records {
                    if messages.len() >= max {
                        break;
                    }
                    match record.record.value {
                        Some(body) => {
                            if let Some(message) = tracker.admit(record.offset, body) {
                                messages.push(message);
                            }
                        }
                        None => tracker.skip(record.offset),
                    }
                }
            })?;

            debug!(
                offset_start = start,
                high_watermark,
                received = messages.len(),
                redelivered,
                "Received batch from queue"
            );
        }

        metrics().messages_received.inc_by(messages.len() as u64);
        self.update_in_flight();
        Ok(messages)
    }

    async fn acknowledge(&self, tokens: &[AckToken]) -> Result<()> {
        let (unknown, commit) = self.with_tracker(|tracker| {
            let unknown = tokens.iter().filter(|t| !tracker.acknowledge(t)).count();
            (unknown, tracker.commit_offset())
        })?;

        if unknown > 0 {
            warn!(unknown, "Acknowledged tokens that are not in flight");
        }
        debug!(acknowledged = tokens.len() - unknown, committed_offset = commit, "Acknowledged messages");
        self.update_in_flight();
        Ok(())
    }

    async fn release(&self, tokens: &[AckToken]) -> Result<()> {
        let unknown = self.with_tracker(|tracker| {
            tokens.iter().filter(|t| !tracker.release(t)).count()
        })?;

        if unknown > 0 {
            warn!(unknown, "Released tokens that are not in flight");
        }
        debug!(released = tokens.len() - unknown, "Released messages for redelivery");
        self.update_in_flight();
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.ensure_connected().await {
            Ok(_) => true,
            Err(e) => {
                error!("Queue health check failed: {}", e);
                false
            }
        }
    }
}
