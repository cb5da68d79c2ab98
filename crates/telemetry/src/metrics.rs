//! In-process pipeline metrics.
//!
//! Counters and latency histograms are plain atomics so the hot path never
//! takes a lock. The `/metrics` endpoint serves a [`MetricsSnapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram with fixed millisecond buckets.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 30s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 30000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds. Values past the last bound land in
    /// the last bucket.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns `(upper_bound_ms, count)` pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the relay.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingest side
    pub messages_received: Counter,
    pub messages_processed: Counter,
    pub messages_failed: Counter,
    pub raw_fallbacks: Counter,
    pub synthesized_keys: Counter,
    pub messages_dead_lettered: Counter,

    // Store
    pub records_written: Counter,
    pub store_write_errors: Counter,

    // Change feed side
    pub change_events_received: Counter,
    pub change_events_ignored: Counter,
    pub notifications_published: Counter,
    pub publish_errors: Counter,

    // Batches
    pub batch_timeouts: Counter,

    // Latency histograms
    pub store_latency_ms: Histogram,
    pub publish_latency_ms: Histogram,
    pub ingest_batch_latency_ms: Histogram,
    pub feed_batch_latency_ms: Histogram,

    // Gauges
    pub messages_in_flight: Gauge,
    pub feed_checkpoint: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub raw_fallbacks: u64,
    pub synthesized_keys: u64,
    pub messages_dead_lettered: u64,
    pub records_written: u64,
    pub store_write_errors: u64,
    pub change_events_received: u64,
    pub change_events_ignored: u64,
    pub notifications_published: u64,
    pub publish_errors: u64,
    pub batch_timeouts: u64,
    pub store_latency_mean_ms: f64,
    pub publish_latency_mean_ms: f64,
    pub ingest_batch_latency_mean_ms: f64,
    pub feed_batch_latency_mean_ms: f64,
    pub messages_in_flight: u64,
    pub feed_checkpoint: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            messages_received: self.messages_received.get(),
            messages_processed: self.messages_processed.get(),
            messages_failed: self.messages_failed.get(),
            raw_fallbacks: self.raw_fallbacks.get(),
            synthesized_keys: self.synthesized_keys.get(),
            messages_dead_lettered: self.messages_dead_lettered.get(),
            records_written: self.records_written.get(),
            store_write_errors: self.store_write_errors.get(),
            change_events_received: self.change_events_received.get(),
            change_events_ignored: self.change_events_ignored.get(),
            notifications_published: self.notifications_published.get(),
            publish_errors: self.publish_errors.get(),
            batch_timeouts: self.batch_timeouts.get(),
            store_latency_mean_ms: self.store_latency_ms.mean(),
            publish_latency_mean_ms: self.publish_latency_ms.mean(),
            ingest_batch_latency_mean_ms: self.ingest_batch_latency_ms.mean(),
            feed_batch_latency_mean_ms: self.feed_batch_latency_ms.mean(),
            messages_in_flight: self.messages_in_flight.get(),
            feed_checkpoint: self.feed_checkpoint.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
