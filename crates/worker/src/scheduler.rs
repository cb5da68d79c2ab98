//! Starts the pipeline workers and keeps component health current.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};

use record_store::{ChangeFeed, RecordStore};
use redpanda::{MessageQueue, NotificationPublisher};
use telemetry::health;

use crate::change_feed::ChangeFeedConsumer;
use crate::ingest::IngestConsumer;
use crate::runner::{ChangeFeedWorker, IngestWorker, WorkerConfig};

/// Shared clients, constructed once per process.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn MessageQueue>,
    pub store: Arc<dyn RecordStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub publisher: Arc<dyn NotificationPublisher>,
}

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker: WorkerConfig,
    /// Payload field holding the idempotency key
    pub id_field: String,
    /// Health probe interval
    pub health_interval: Duration,
}

/// Runs both pipeline stages plus the health monitor.
pub struct WorkerScheduler {
    config: SchedulerConfig,
    collaborators: Collaborators,
}

impl WorkerScheduler {
    pub fn new(config: SchedulerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Spawns all workers. They stop once `shutdown` turns true.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        let c = &self.collaborators;

        let ingest = IngestWorker::new(
            c.queue.clone(),
            IngestConsumer::new(c.store.clone(), self.config.id_field.clone()),
            self.config.worker.clone(),
        );
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { ingest.run(rx).await }));
        info!("Ingest worker started");

        let feed = ChangeFeedWorker::new(
            c.feed.clone(),
            ChangeFeedConsumer::new(c.publisher.clone(), self.config.id_field.clone()),
            self.config.worker.clone(),
        );
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { feed.run(rx).await }));
        info!("Change feed worker started");

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_health_monitor(shutdown).await;
        }));

        info!("Background workers started");
        handles
    }

    /// Probes every collaborator once and records the result.
    pub async fn refresh_health(&self) {
        let c = &self.collaborators;
        let registry = health();

        let probes = [
            (&registry.queue, c.queue.health_check().await),
            (&registry.store, c.store.health_check().await),
            (&registry.topic, c.publisher.health_check().await),
        ];

        for (component, healthy) in probes {
            match (healthy, component.is_healthy()) {
                (true, _) => component.set_healthy(),
                (false, was_healthy) => {
                    if was_healthy {
                        warn!(component = component.name(), "Component became unhealthy");
                    }
                    component.set_unhealthy("health check failed");
                }
            }
        }
    }

    async fn run_health_monitor(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.health_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_health().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
