//! Settings for the ClickHouse store backend.

use clickhouse::Client;
use relay_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Where the ClickHouse backend keeps a collection, and how long the
/// change feed waits before handing out fresh rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Existing database holding the record, changes and checkpoint tables
    #[serde(default = "default_database")]
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Change rows younger than this are not yet visible on the feed.
    /// 0 assumes a single writer process.
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "relay".to_string()
}

fn default_settle_window_ms() -> u64 {
    5_000
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            username: None,
            password: None,
            settle_window_ms: default_settle_window_ms(),
        }
    }
}

impl ClickHouseConfig {
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    /// Applies the `RELAY_CLICKHOUSE_*` variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RELAY_CLICKHOUSE_URL") {
            self.url = url;
        }
        if let Some(database) = lookup("RELAY_CLICKHOUSE_DATABASE") {
            self.database = database;
        }
        if let Some(username) = lookup("RELAY_CLICKHOUSE_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = lookup("RELAY_CLICKHOUSE_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(ms) = lookup("RELAY_CLICKHOUSE_SETTLE_WINDOW_MS") {
            self.settle_window_ms = ms.trim().parse().map_err(|_| {
                Error::config(format!("RELAY_CLICKHOUSE_SETTLE_WINDOW_MS is not a number: {}", ms))
            })?;
        }
        Ok(())
    }

    /// Builds an HTTP client for the configured database.
    pub(crate) fn client(&self) -> Client {
        let mut client = Client::default()
            .with_url(&self.url)
            .with_database(&self.database);
        if let Some(user) = &self.username {
            client = client.with_user(user);
        }
        if let Some(password) = &self.password {
            client = client.with_password(password);
        }

        info!(url = %self.url, database = %self.database, "Created ClickHouse client");
        client
    }
}
