//! Keyed record store with an ordered change feed.
//!
//! Two backends implement [`RecordStore`] and [`ChangeFeed`]:
//! - [`MemoryStore`]: in-process, used for local runs and tests
//! - [`ClickHouseStore`]: `ReplacingMergeTree` records plus an append-only
//!   changes table

pub mod clickhouse_store;
pub mod config;
pub mod health;
pub mod memory;
pub mod schema;
pub mod traits;

pub use clickhouse_store::ClickHouseStore;
pub use config::*;
pub use memory::MemoryStore;
pub use traits::*;
