//! Mock implementations for testing.
//!
//! Each mock implements the same trait as its production counterpart, so
//! the workers under test run their real code paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use record_store::{ChangeFeed, MemoryStore, RecordStore, UpsertOutcome};
use redpanda::{DeliveryTracker, MessageQueue, NotificationPublisher};
use relay_core::{AckToken, ChangeEvent, Error, Notification, RawMessage, Record, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory queue with the same redelivery and dead-letter rules as the
/// Redpanda queue.
pub struct MemoryQueue {
    log: Mutex<Vec<Vec<u8>>>,
    tracker: Mutex<DeliveryTracker>,
    dead_letters: Mutex<Vec<Vec<u8>>>,
    fail_receive: AtomicBool,
}

impl MemoryQueue {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            tracker: Mutex::new(DeliveryTracker::new(0, max_receive_count)),
            dead_letters: Mutex::new(Vec::new()),
            fail_receive: AtomicBool::new(false),
        }
    }

    /// Appends a message, as a producer would.
    pub fn send(&self, body: impl Into<Vec<u8>>) {
        self.log.lock().push(body.into());
    }

    pub fn send_json(&self, value: &serde_json::Value) {
        self.send(value.to_string());
    }

    /// Bodies moved to the dead-letter collection.
    pub fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.dead_letters.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.lock().in_flight()
    }

    pub fn awaiting_redelivery(&self) -> usize {
        self.tracker.lock().awaiting_redelivery()
    }

    /// Offset up to which every message is finished with.
    pub fn committed_offset(&self) -> i64 {
        self.tracker.lock().commit_offset()
    }

    /// True once every sent message has been acknowledged or dead-lettered.
    pub fn is_drained(&self) -> bool {
        self.committed_offset() == self.log.lock().len() as i64
    }

    pub fn set_fail_receive(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self, max: usize) -> Result<Vec<RawMessage>> {
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(Error::queue("Mock queue receive failure"));
        }

        let mut tracker = self.tracker.lock();
        let redeliveries = tracker.take_redeliveries(max);
        self.dead_letters
            .lock()
            .extend(redeliveries.exhausted.into_iter().map(|p| p.body));

        let mut messages = redeliveries.messages;
        let log = self.log.lock();
        let mut offset = tracker.next_fetch_offset();
        while messages.len() < max && (offset as usize) < log.len() {
            if let Some(message) = tracker.admit(offset, log[offset as usize].clone()) {
                messages.push(message);
            }
            offset += 1;
        }

        Ok(messages)
    }

    async fn acknowledge(&self, tokens: &[AckToken]) -> Result<()> {
        let mut tracker = self.tracker.lock();
        for token in tokens {
            tracker.acknowledge(token);
        }
        Ok(())
    }

    async fn release(&self, tokens: &[AckToken]) -> Result<()> {
        let mut tracker = self.tracker.lock();
        for token in tokens {
            tracker.release(token);
        }
        Ok(())
    }
}

/// Wraps a [`MemoryStore`] and fails writes on demand.
pub struct FailingStore {
    inner: MemoryStore,
    fail_keys: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    fail_feed: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl FailingStore {
    pub fn new(table: &str) -> Self {
        Self {
            inner: MemoryStore::new(table),
            fail_keys: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            fail_feed: AtomicBool::new(false),
            write_delay: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail every write for `key` until cleared.
    pub fn fail_key(&self, key: &str) {
        self.fail_keys.lock().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_keys.lock().clear();
        self.fail_all.store(false, Ordering::SeqCst);
        self.fail_feed.store(false, Ordering::SeqCst);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_feed(&self, fail: bool) {
        self.fail_feed.store(fail, Ordering::SeqCst);
    }

    /// Make every write sleep first (for time budget tests).
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    fn should_fail(&self, key: &str) -> bool {
        self.fail_all.load(Ordering::SeqCst) || self.fail_keys.lock().contains(key)
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn upsert(&self, record: Record) -> Result<UpsertOutcome> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail(&record.key) {
            return Err(Error::write(&record.key, "Mock store write failure"));
        }
        self.inner.upsert(record).await
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> bool {
        !self.fail_all.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFeed for FailingStore {
    async fn read_changes(&self, after: u64, limit: usize) -> Result<Vec<ChangeEvent>> {
        if self.fail_feed.load(Ordering::SeqCst) {
            return Err(Error::feed("Mock change feed failure"));
        }
        self.inner.read_changes(after, limit).await
    }

    async fn load_checkpoint(&self, consumer: &str) -> Result<u64> {
        self.inner.load_checkpoint(consumer).await
    }

    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> Result<()> {
        self.inner.save_checkpoint(consumer, sequence).await
    }
}

/// Publisher that captures notifications in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Notification>>,
    fail_keys: Mutex<HashSet<String>>,
    should_fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications accepted so far, in publish order.
    pub fn published(&self) -> Vec<Notification> {
        self.published.lock().clone()
    }

    pub fn published_keys(&self) -> Vec<String> {
        self.published.lock().iter().map(|n| n.key.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_key(&self, key: &str) {
        self.fail_keys.lock().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_keys.lock().clear();
        self.set_should_fail(false);
    }
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) || self.fail_keys.lock().contains(&notification.key) {
            return Err(Error::publish(&notification.key, "Mock publisher failure"));
        }
        self.published.lock().push(notification.clone());
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.should_fail.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_redelivers_then_dead_letters() {
        let queue = MemoryQueue::new(2);
        queue.send("poison");

        let first = queue.receive(10).await.unwrap();
        assert_eq!(first[0].receive_count(), 1);
        queue.release(&[first[0].token().clone()]).await.unwrap();

        let second = queue.receive(10).await.unwrap();
        assert_eq!(second[0].receive_count(), 2);
        queue.release(&[second[0].token().clone()]).await.unwrap();

        assert!(queue.receive(10).await.unwrap().is_empty());
        assert_eq!(queue.dead_letters(), vec![b"poison".to_vec()]);
        assert!(queue.is_drained());
    }

    #[tokio::test]
    async fn test_memory_queue_respects_max() {
        let queue = MemoryQueue::default();
        for i in 0..5 {
            queue.send(format!("m{}", i));
        }

        assert_eq!(queue.receive(3).await.unwrap().len(), 3);
        assert_eq!(queue.receive(3).await.unwrap().len(), 2);
        assert_eq!(queue.in_flight(), 5);
    }
}
