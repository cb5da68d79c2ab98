//! Queue → store stage.
//!
//! Each message is decoded (falling back to a raw-wrapped payload), keyed,
//! and upserted on its own. One message failing never affects the others.

use record_store::{RecordStore, UpsertOutcome};
use relay_core::{AckToken, BatchResult, KeySource, Payload, RawMessage, Record, Result};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};

/// Persists queue messages into the record store.
pub struct IngestConsumer {
    store: Arc<dyn RecordStore>,
    id_field: String,
}

impl IngestConsumer {
    pub fn new(store: Arc<dyn RecordStore>, id_field: impl Into<String>) -> Self {
        Self {
            store,
            id_field: id_field.into(),
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Processes every message in the batch and reports per-message outcomes.
    ///
    /// The caller acknowledges the succeeded tokens and leaves the rest for
    /// redelivery.
    pub async fn process_batch(&self, messages: Vec<RawMessage>) -> BatchResult<AckToken> {
        let mut result = BatchResult::with_capacity(messages.len());

        for message in messages {
            let token = message.token().clone();
            let receive_count = message.receive_count();

            match self.process_message(message).await {
                Ok((key, outcome)) => {
                    metrics().messages_processed.inc();
                    info!(
                        token = %token,
                        key = %key,
                        receive_count,
                        outcome = ?outcome,
                        "Message stored"
                    );
                    result.processed(token);
                }
                Err(e) => {
                    metrics().messages_failed.inc();
                    warn!(
                        token = %token,
                        receive_count,
                        error = %e,
                        code = e.error_code().unwrap_or("UNKNOWN"),
                        "Message failed, leaving for redelivery"
                    );
                    result.failed(token, &e);
                }
            }
        }

        result
    }

    async fn process_message(&self, message: RawMessage) -> Result<(String, UpsertOutcome)> {
        let payload = Payload::decode(&message.body);
        if payload.is_raw_fallback() {
            metrics().raw_fallbacks.inc();
            debug!(token = %message.token(), "Body is not a JSON object, wrapping raw");
        }

        let (record, source) = Record::from_payload(payload, &self.id_field);
        if source == KeySource::Synthesized {
            metrics().synthesized_keys.inc();
            // Redelivery of this message will produce another record.
            warn!(
                token = %message.token(),
                synthesized_key = %record.key,
                id_field = %self.id_field,
                receive_count = message.receive_count(),
                "No usable key in message, synthesized one"
            );
        }

        let key = record.key.clone();
        let start = Instant::now();
        let written = self.store.upsert(record).await;
        metrics().store_latency_ms.observe(start.elapsed().as_millis() as u64);

        match written {
            Ok(outcome) => {
                metrics().records_written.inc();
                Ok((key, outcome))
            }
            Err(e) => {
                metrics().store_write_errors.inc();
                Err(e)
            }
        }
    }
}
