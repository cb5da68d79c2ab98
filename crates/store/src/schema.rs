//! ClickHouse table layout for one store collection.
//!
//! - `<table>`: live records, `ReplacingMergeTree` keyed by record key so
//!   the highest `version` wins (last-write-wins upsert)
//! - `<table>_changes`: append-only change feed ordered by `sequence`
//! - `feed_checkpoints`: last handled sequence per feed consumer

/// Fully qualified table names for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub records: String,
    pub changes: String,
    pub checkpoints: String,
}

impl TableNames {
    pub fn new(database: &str, table: &str) -> Self {
        Self {
            records: format!("{}.{}", database, table),
            changes: format!("{}.{}_changes", database, table),
            checkpoints: format!("{}.feed_checkpoints", database),
        }
    }

    /// DDL statements, in creation order.
    pub fn ddl(&self) -> Vec<String> {
        vec![
            format!(
                r#"
CREATE TABLE IF NOT EXISTS {} (
    key String,
    -- Tagged payload JSON (structured or raw fallback)
    payload String,
    deleted UInt8,
    version UInt64
)
ENGINE = ReplacingMergeTree(version)
ORDER BY key
"#,
                self.records
            ),
            format!(
                r#"
CREATE TABLE IF NOT EXISTS {} (
    sequence UInt64,
    key String,
    kind LowCardinality(String),
    -- Record JSON; NULL for deletions
    new_image Nullable(String),
    created_at DateTime DEFAULT now()
)
ENGINE = MergeTree()
ORDER BY sequence
TTL created_at + INTERVAL 7 DAY
"#,
                self.changes
            ),
            format!(
                r#"
CREATE TABLE IF NOT EXISTS {} (
    consumer String,
    sequence UInt64,
    updated_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY consumer
"#,
                self.checkpoints
            ),
        ]
    }
}
