//! ClickHouse health checks and schema bootstrap.

use crate::schema::TableNames;
use clickhouse::Client;
use relay_core::{Error, Result};
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &Client) -> bool {
    match client.query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "ClickHouse health check failed");
            false
        }
    }
}

/// Create the collection's tables if missing. The database must exist.
pub async fn init_schema(client: &Client, tables: &TableNames) -> Result<()> {
    for ddl in tables.ddl() {
        client
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| Error::internal(format!("Failed to execute DDL: {}", e)))?;
    }

    debug!(records = %tables.records, "ClickHouse schema initialized");
    Ok(())
}
