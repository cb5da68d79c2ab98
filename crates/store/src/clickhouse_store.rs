//! ClickHouse store backend.
//!
//! Records live in a `ReplacingMergeTree` whose version is the change
//! sequence, so the newest write for a key wins after merges and `FINAL`
//! reads see last-write-wins immediately. The change feed is a separate
//! append-only table ordered by sequence.
//!
//! Sequences come from each writer's clock (`max(last + 1, now_micros)`),
//! taken before the change row is inserted. With several writer processes
//! a row can therefore land after rows with higher sequences. The feed
//! only hands out rows older than the settle window, and each change-row
//! insert must finish within half of it, so a row is visible only once
//! every lower sequence has landed.
//!
//! Deployment requirement for more than one writer: a non-zero settle
//! window larger than the writers' clock skew plus the insert deadline.
//! A zero window disables both and is only safe for a single writer.

use async_trait::async_trait;
use chrono::Utc;
use clickhouse::{Client, Row};
use relay_core::{ChangeEvent, ChangeKind, Error, Payload, Record, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ClickHouseConfig;
use crate::health::{check_connection, init_schema};
use crate::schema::TableNames;
use crate::traits::{ChangeFeed, RecordStore, UpsertOutcome};

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct RecordRow {
    key: String,
    payload: String,
    deleted: u8,
    version: u64,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct ChangeRow {
    sequence: u64,
    key: String,
    kind: String,
    new_image: Option<String>,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct CheckpointRow {
    consumer: String,
    sequence: u64,
    updated_at: i64, // DateTime64(3) as milliseconds
}

impl ChangeRow {
    fn into_event(self) -> Result<ChangeEvent> {
        let kind = ChangeKind::parse(&self.kind)
            .ok_or_else(|| Error::feed(format!("unknown change kind: {}", self.kind)))?;
        let new_image = match self.new_image {
            Some(json) => Some(serde_json::from_str::<Record>(&json)?),
            None => None,
        };

        Ok(ChangeEvent {
            kind,
            key: self.key,
            new_image,
            sequence: self.sequence,
        })
    }
}

/// Highest sequence the feed may hand out when the clock reads `now_micros`.
fn visible_horizon(now_micros: u64, settle_window: Duration) -> u64 {
    if settle_window.is_zero() {
        return u64::MAX;
    }
    now_micros.saturating_sub(settle_window.as_micros() as u64)
}

fn now_micros() -> u64 {
    Utc::now().timestamp_micros().max(0) as u64
}

/// Store backed by ClickHouse tables for one collection.
pub struct ClickHouseStore {
    client: Client,
    tables: TableNames,
    settle_window: Duration,
    last_sequence: AtomicU64,
}

impl ClickHouseStore {
    /// Creates the collection's tables if needed and opens it, resuming the
    /// sequence clock from the feed.
    pub async fn open(config: &ClickHouseConfig, table: &str) -> Result<Self> {
        let client = config.client();
        let tables = TableNames::new(&config.database, table);
        init_schema(&client, &tables).await?;

        let last: u64 = client
            .query(&format!("SELECT max(sequence) FROM {}", tables.changes))
            .fetch_one()
            .await
            .map_err(|e| Error::feed(format!("Failed to read last sequence: {}", e)))?;

        debug!(
            records = %tables.records,
            last_sequence = last,
            settle_window_ms = config.settle_window_ms,
            "Opened ClickHouse store"
        );

        Ok(Self {
            client,
            tables,
            settle_window: config.settle_window(),
            last_sequence: AtomicU64::new(last),
        })
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn next_sequence(&self) -> u64 {
        let now = now_micros();
        let mut next = 0;
        let _ = self
            .last_sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                next = prev.saturating_add(1).max(now);
                Some(next)
            });
        next
    }

    async fn is_live(&self, key: &str) -> Result<bool> {
        let count: u64 = self
            .client
            .query(&format!(
                "SELECT count() FROM {} FINAL WHERE key = ? AND deleted = 0",
                self.tables.records
            ))
            .bind(key)
            .fetch_one()
            .await
            .map_err(|e| Error::write(key, format!("Lookup error: {}", e)))?;
        Ok(count > 0)
    }

    /// Inserts a change row, abandoning it once half the settle window has
    /// passed so it cannot land behind a visible row.
    async fn append_change(&self, row: ChangeRow) -> Result<()> {
        if self.settle_window.is_zero() {
            return self.insert_change(&row).await;
        }

        let deadline = self.settle_window / 2;
        timeout(deadline, self.insert_change(&row))
            .await
            .map_err(|_| {
                Error::write(
                    &row.key,
                    format!("change row not committed within {:?}", deadline),
                )
            })?
    }

    async fn insert_change(&self, row: &ChangeRow) -> Result<()> {
        let key = row.key.clone();
        let mut insert = self
            .client
            .insert(&self.tables.changes)
            .map_err(|e| Error::write(&key, format!("Insert error: {}", e)))?;
        insert
            .write(row)
            .await
            .map_err(|e| Error::write(&key, format!("Write error: {}", e)))?;
        insert
            .end()
            .await
            .map_err(|e| Error::write(&key, format!("End error: {}", e)))
    }

    async fn write_record(&self, row: RecordRow) -> Result<()> {
        let key = row.key.clone();
        let mut insert = self
            .client
            .insert(&self.tables.records)
            .map_err(|e| Error::write(&key, format!("Insert error: {}", e)))?;
        insert
            .write(&row)
            .await
            .map_err(|e| Error::write(&key, format!("Write error: {}", e)))?;
        insert
            .end()
            .await
            .map_err(|e| Error::write(&key, format!("End error: {}", e)))
    }
}

#[async_trait]
impl RecordStore for ClickHouseStore {
    async fn upsert(&self, record: Record) -> Result<UpsertOutcome> {
        let outcome = if self.is_live(&record.key).await? {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Created
        };
        let kind = match outcome {
            UpsertOutcome::Created => ChangeKind::Created,
            UpsertOutcome::Replaced => ChangeKind::Updated,
        };

        let sequence = self.next_sequence();
        let image = serde_json::to_string(&record)?;
        let payload = serde_json::to_string(&record.payload)?;

        // Change row first: if the record write then fails, the retry
        // emits a second creation event instead of none.
        self.append_change(ChangeRow {
            sequence,
            key: record.key.clone(),
            kind: kind.as_str().to_string(),
            new_image: Some(image),
        })
        .await?;

        self.write_record(RecordRow {
            key: record.key.clone(),
            payload,
            deleted: 0,
            version: sequence,
        })
        .await?;

        debug!(key = %record.key, sequence, kind = kind.as_str(), "Upserted record");
        Ok(outcome)
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let row: Option<RecordRow> = self
            .client
            .query(&format!(
                "SELECT key, payload, deleted, version FROM {} FINAL WHERE key = ?",
                self.tables.records
            ))
            .bind(key)
            .fetch_optional()
            .await
            .map_err(|e| Error::internal(format!("Query error: {}", e)))?;

        match row {
            Some(row) if row.deleted == 0 => {
                let payload: Payload = serde_json::from_str(&row.payload)?;
                Ok(Some(Record::new(row.key, payload)))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        if !self.is_live(key).await? {
            return Ok(false);
        }

        let sequence = self.next_sequence();
        self.append_change(ChangeRow {
            sequence,
            key: key.to_string(),
            kind: ChangeKind::Deleted.as_str().to_string(),
            new_image: None,
        })
        .await?;

        // Tombstone: the payload is ignored once deleted = 1.
        self.write_record(RecordRow {
            key: key.to_string(),
            payload: String::new(),
            deleted: 1,
            version: sequence,
        })
        .await?;

        debug!(key = %key, sequence, "Deleted record");
        Ok(true)
    }

    async fn health_check(&self) -> bool {
        check_connection(&self.client).await
    }
}

#[async_trait]
impl ChangeFeed for ClickHouseStore {
    async fn read_changes(&self, after: u64, limit: usize) -> Result<Vec<ChangeEvent>> {
        let rows: Vec<ChangeRow> = self
            .client
            .query(&format!(
                "SELECT sequence, key, kind, new_image FROM {} \
                 WHERE sequence > ? AND sequence <= ? ORDER BY sequence LIMIT ?",
                self.tables.changes
            ))
            .bind(after)
            .bind(visible_horizon(now_micros(), self.settle_window))
            .bind(limit as u64)
            .fetch_all()
            .await
            .map_err(|e| Error::feed(format!("Query error: {}", e)))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let sequence = row.sequence;
            match row.into_event() {
                Ok(event) => events.push(event),
                Err(e) => {
                    // Stop before the bad row so the checkpoint cannot pass it.
                    warn!(sequence, error = %e, "Unreadable change row");
                    if events.is_empty() {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(events)
    }

    async fn load_checkpoint(&self, consumer: &str) -> Result<u64> {
        let sequence: Option<u64> = self
            .client
            .query(&format!(
                "SELECT sequence FROM {} FINAL WHERE consumer = ?",
                self.tables.checkpoints
            ))
            .bind(consumer)
            .fetch_optional()
            .await
            .map_err(|e| Error::feed(format!("Checkpoint query error: {}", e)))?;
        Ok(sequence.unwrap_or(0))
    }

    async fn save_checkpoint(&self, consumer: &str, sequence: u64) -> Result<()> {
        let row = CheckpointRow {
            consumer: consumer.to_string(),
            sequence,
            updated_at: Utc::now().timestamp_millis(),
        };

        let mut insert = self
            .client
            .insert(&self.tables.checkpoints)
            .map_err(|e| Error::feed(format!("Insert error: {}", e)))?;
        insert
            .write(&row)
            .await
            .map_err(|e| Error::feed(format!("Write error: {}", e)))?;
        insert
            .end()
            .await
            .map_err(|e| Error::feed(format!("End error: {}", e)))
    }
}
