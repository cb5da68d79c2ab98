//! In-process store backend.
//!
//! Every mutation happens under one lock, so the change feed is a single
//! totally ordered log. Consumers must still only rely on per-key order.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{ChangeEvent, ChangeKind, Record, Result};
use std::collections::HashMap;
use tracing::debug;

use crate::traits::{ChangeFeed, RecordStore, UpsertOutcome};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, Record>,
    /// Sorted by sequence.
    changes: Vec<ChangeEvent>,
    last_sequence: u64,
    checkpoints: HashMap<String, u64>,
}

impl Inner {
    fn append(&mut self, kind: ChangeKind, key: &str, new_image: Option<Record>) -> u64 {
        self.last_sequence += 1;
        self.changes.push(ChangeEvent {
            kind,
            key: key.to_string(),
            new_image,
            sequence: self.last_sequence,
        });
        self.last_sequence
    }

    /// Drops events every registered consumer has moved past.
    fn compact(&mut self) {
        let Some(floor) = self.checkpoints.values().copied().min() else {
            return;
        };
        let cut = self.changes.partition_point(|e| e.sequence <= floor);
        self.changes.drain(..cut);
    }
}

/// Store that keeps records and the change feed in memory.
#[derive(Debug)]
pub struct MemoryStore {
    table: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all live records, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().records.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Highest sequence issued so far.
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().last_sequence
    }

    /// Number of change events still retained.
    pub fn retained_changes(&self) -> usize {
        self.inner.lock().changes.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: Record) -> Result<UpsertOutcome> {
        let mut inner = self.inner.lock();
        let key = record.key.clone();

        let outcome = if inner.records.contains_key(&key) {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Created
        };
        let kind = match outcome {
            UpsertOutcome::Created => ChangeKind::Created,
            UpsertOutcome::Replaced => ChangeKind::Updated,
        };

        inner.records.insert(key.clone(), record.clone());
        let sequence = inner.append(kind, &key, Some(record));

        debug!(table = %self.table, key = %key, sequence, kind = kind.as_str(), "Upserted record");
        Ok(outcome)
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.inner.lock().records.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.records.remove(key).is_none() {
            return Ok(false);
        }
        let sequence = inner.append(ChangeKind::Deleted, key, None);

        debug!(table = %self.table, key = %key, sequence, "Deleted record");
        Ok(true)
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn read_changes(&self, after: u64, limit: usize) -> Result<Vec<ChangeEvent>> {
        let inner = self.inner.lock();
        let start = inner.changes.partition_point(|e| e.sequence <= after);
        Ok(inner.changes[start..].iter().take(limit).cloned().collect())
    }

    async fn load_checkpoint(&self, consumer: &str) -> Result<u64> {
        Ok(self.inner.lock().checkpoints.get(consumer).copied().unwrap_or(0))
    }

    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner.checkpoints.entry(consumer.to_string()).or_insert(0);
        *entry = (*entry).max(sequence);
        inner.compact();
        Ok(())
    }
}
