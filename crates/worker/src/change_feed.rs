//! Change feed → topic stage.

use redpanda::NotificationPublisher;
use relay_core::{BatchResult, ChangeEvent, Error, Notification, Result};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};

/// Publishes a notification for every record creation on the feed.
pub struct ChangeFeedConsumer {
    publisher: Arc<dyn NotificationPublisher>,
    id_field: String,
}

impl ChangeFeedConsumer {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, id_field: impl Into<String>) -> Self {
        Self {
            publisher,
            id_field: id_field.into(),
        }
    }

    /// Handles events in delivered order, keyed by sequence.
    ///
    /// Updates and deletes are ignored. A failed publish fails that event
    /// only; the caller must not checkpoint past it.
    pub async fn process_change_batch(&self, events: &[ChangeEvent]) -> BatchResult<u64> {
        let mut result = BatchResult::with_capacity(events.len());
        metrics().change_events_received.inc_by(events.len() as u64);

        for event in events {
            if !event.is_creation() {
                metrics().change_events_ignored.inc();
                debug!(
                    sequence = event.sequence,
                    key = %event.key,
                    kind = event.kind.as_str(),
                    "Ignoring non-creation change"
                );
                result.ignored(event.sequence);
                continue;
            }

            match self.notify(event).await {
                Ok(()) => {
                    metrics().notifications_published.inc();
                    info!(sequence = event.sequence, key = %event.key, "Notification published");
                    result.processed(event.sequence);
                }
                Err(e) => {
                    metrics().publish_errors.inc();
                    warn!(
                        sequence = event.sequence,
                        key = %event.key,
                        error = %e,
                        code = e.error_code().unwrap_or("UNKNOWN"),
                        "Notification failed"
                    );
                    result.failed(event.sequence, &e);
                }
            }
        }

        result
    }

    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        let image = event
            .new_image
            .as_ref()
            .ok_or_else(|| Error::MissingImage(event.key.clone()))?;

        let notification = Notification::new_record(image, &self.id_field);
        self.publisher.publish(&notification).await
    }
}
