//! Store seams used by the consumers.

use async_trait::async_trait;
use relay_core::{ChangeEvent, Record, Result};

/// What an upsert did to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No live record existed; a `created` event was emitted.
    Created,
    /// A live record was fully replaced; an `updated` event was emitted.
    Replaced,
}

/// Keyed record collection with last-write-wins upserts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts `record`, or fully replaces the record with the same key.
    async fn upsert(&self, record: Record) -> Result<UpsertOutcome>;

    /// Returns the live record for `key`.
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// Removes the record for `key`. Returns whether one existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Checks the backend is reachable.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Ordered change feed emitted by a [`RecordStore`].
///
/// Sequences start at 1; a checkpoint of 0 means "from the beginning".
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Returns up to `limit` events with `sequence > after`, in feed order.
    async fn read_changes(&self, after: u64, limit: usize) -> Result<Vec<ChangeEvent>>;

    /// Last sequence `consumer` has fully handled, or 0.
    async fn load_checkpoint(&self, consumer: &str) -> Result<u64>;

    /// Records that `consumer` has handled every event up to `sequence`.
    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> Result<()>;
}
