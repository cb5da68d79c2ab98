//! Long-running loops around the two consumers.
//!
//! Each loop pulls one batch, runs it under the batch time budget, then
//! settles it: the ingest loop acknowledges or releases queue messages, the
//! feed loop advances its checkpoint.

use crate::change_feed::ChangeFeedConsumer;
use crate::ingest::IngestConsumer;
use record_store::ChangeFeed;
use redpanda::MessageQueue;
use relay_core::{AckToken, Error, PipelineConfig, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Checkpoint name used by the notification stage.
pub const NOTIFIER_CHECKPOINT: &str = "new-order-notifier";

/// Loop settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum messages or events per batch
    pub batch_size: usize,
    /// Time budget for one batch
    pub batch_timeout: Duration,
    /// Pause after an empty batch
    pub idle_backoff: Duration,
    /// Pause after an error or a batch where nothing succeeded
    pub retry_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_secs(30),
            idle_backoff: Duration::from_millis(250),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_timeout: config.batch_timeout(),
            ..Self::default()
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub received: usize,
    pub succeeded: usize,
    pub timed_out: bool,
}

impl BatchStats {
    fn pause(&self, config: &WorkerConfig) -> Option<Duration> {
        if self.received == 0 {
            Some(config.idle_backoff)
        } else if self.succeeded < self.received {
            Some(config.retry_backoff)
        } else {
            None
        }
    }
}

/// Sleeps for `duration` unless shutdown is signalled first.
///
/// Returns true when the loop should stop.
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Queue → store loop.
pub struct IngestWorker {
    queue: Arc<dyn MessageQueue>,
    consumer: IngestConsumer,
    config: WorkerConfig,
}

impl IngestWorker {
    pub fn new(queue: Arc<dyn MessageQueue>, consumer: IngestConsumer, config: WorkerConfig) -> Self {
        Self {
            queue,
            consumer,
            config,
        }
    }

    /// Receives, processes and settles one batch.
    ///
    /// When the budget elapses every message in the batch is released, so
    /// the whole batch is redelivered.
    pub async fn run_once(&self) -> Result<BatchStats> {
        let messages = self.queue.receive(self.config.batch_size).await?;
        if messages.is_empty() {
            return Ok(BatchStats::default());
        }

        let received = messages.len();
        let tokens: Vec<AckToken> = messages.iter().map(|m| m.token().clone()).collect();
        let start = Instant::now();

        let processed = timeout(self.config.batch_timeout, self.consumer.process_batch(messages)).await;
        metrics()
            .ingest_batch_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        let result = match processed {
            Ok(result) => result,
            Err(_) => {
                metrics().batch_timeouts.inc();
                warn!(
                    received,
                    error = %Error::Timeout(self.config.batch_timeout),
                    "Releasing whole ingest batch"
                );
                self.queue.release(&tokens).await?;
                return Ok(BatchStats {
                    received,
                    succeeded: 0,
                    timed_out: true,
                });
            }
        };

        let succeeded: Vec<AckToken> = result.succeeded().cloned().collect();
        let failed: Vec<AckToken> = result.failed_ids().cloned().collect();

        // Failures are released even when the acknowledgement fails.
        let acked = if succeeded.is_empty() {
            Ok(())
        } else {
            self.queue.acknowledge(&succeeded).await
        };
        if !failed.is_empty() {
            self.queue.release(&failed).await?;
        }
        acked?;

        debug!(
            received,
            acknowledged = succeeded.len(),
            released = failed.len(),
            "Settled ingest batch"
        );

        Ok(BatchStats {
            received,
            succeeded: succeeded.len(),
            timed_out: false,
        })
    }

    /// Runs until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            budget_ms = %self.config.batch_timeout.as_millis(),
            id_field = %self.consumer.id_field(),
            "Ingest worker starting"
        );

        while !*shutdown.borrow() {
            let wait = match self.run_once().await {
                Ok(stats) => stats.pause(&self.config),
                Err(e) => {
                    error!(error = %e, "Ingest batch error");
                    Some(self.config.retry_backoff)
                }
            };

            if let Some(wait) = wait {
                if pause(&mut shutdown, wait).await {
                    break;
                }
            }
        }

        info!("Ingest worker stopped");
    }
}

/// Change feed → topic loop.
pub struct ChangeFeedWorker {
    feed: Arc<dyn ChangeFeed>,
    consumer: ChangeFeedConsumer,
    checkpoint_name: String,
    config: WorkerConfig,
}

impl ChangeFeedWorker {
    pub fn new(feed: Arc<dyn ChangeFeed>, consumer: ChangeFeedConsumer, config: WorkerConfig) -> Self {
        Self {
            feed,
            consumer,
            checkpoint_name: NOTIFIER_CHECKPOINT.to_string(),
            config,
        }
    }

    pub fn with_checkpoint_name(mut self, name: impl Into<String>) -> Self {
        self.checkpoint_name = name.into();
        self
    }

    /// Reads, publishes and checkpoints one batch.
    ///
    /// The checkpoint moves to the last event before the first failure and
    /// stays put when the budget elapses.
    pub async fn run_once(&self) -> Result<BatchStats> {
        let checkpoint = self.feed.load_checkpoint(&self.checkpoint_name).await?;
        let events = self
            .feed
            .read_changes(checkpoint, self.config.batch_size)
            .await?;
        if events.is_empty() {
            return Ok(BatchStats::default());
        }

        let received = events.len();
        let start = Instant::now();
        let processed = timeout(
            self.config.batch_timeout,
            self.consumer.process_change_batch(&events),
        )
        .await;
        metrics()
            .feed_batch_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        let result = match processed {
            Ok(result) => result,
            Err(_) => {
                metrics().batch_timeouts.inc();
                warn!(
                    received,
                    checkpoint,
                    error = %Error::Timeout(self.config.batch_timeout),
                    "Change batch abandoned, checkpoint unchanged"
                );
                return Ok(BatchStats {
                    received,
                    succeeded: 0,
                    timed_out: true,
                });
            }
        };

        let succeeded = result
            .items()
            .iter()
            .take_while(|i| i.status.is_success())
            .count();

        if let Some(&sequence) = result.last_contiguous_success() {
            self.feed
                .save_checkpoint(&self.checkpoint_name, sequence)
                .await?;
            metrics().feed_checkpoint.set(sequence);
            debug!(from = checkpoint, to = sequence, "Advanced change feed checkpoint");
        }

        if succeeded < received {
            warn!(
                checkpoint = result.last_contiguous_success().copied().unwrap_or(checkpoint),
                failed = result.failure_count(),
                "Change batch had failures, will retry from checkpoint"
            );
        }

        Ok(BatchStats {
            received,
            succeeded,
            timed_out: false,
        })
    }

    /// Runs until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            checkpoint_name = %self.checkpoint_name,
            batch_size = self.config.batch_size,
            budget_ms = %self.config.batch_timeout.as_millis(),
            "Change feed worker starting"
        );

        while !*shutdown.borrow() {
            let wait = match self.run_once().await {
                Ok(stats) => stats.pause(&self.config),
                Err(e) => {
                    error!(error = %e, "Change feed batch error");
                    Some(self.config.retry_backoff)
                }
            };

            if let Some(wait) = wait {
                if pause(&mut shutdown, wait).await {
                    break;
                }
            }
        }

        info!("Change feed worker stopped");
    }
}
