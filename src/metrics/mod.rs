use crate::registry::Registry;
use crate::wire::Category;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Tracks relay activity counters
#[derive(Clone)]
pub struct RelayMetrics {
    /// Records received from sensors and fanned out
    records_relayed: Arc<AtomicU64>,

    /// Individual copies successfully written to peers
    deliveries: Arc<AtomicU64>,

    /// Copies that failed to write (peer dropped)
    send_failures: Arc<AtomicU64>,

    /// Registrations refused (unknown category, registry full, bad first record)
    rejected_registrations: Arc<AtomicU64>,

    /// Departure notices broadcast
    departures: Arc<AtomicU64>,

    /// Records relayed per category
    per_category: Arc<DashMap<Category, u64>>,

    started_at: DateTime<Utc>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            records_relayed: Arc::new(AtomicU64::new(0)),
            deliveries: Arc::new(AtomicU64::new(0)),
            send_failures: Arc::new(AtomicU64::new(0)),
            rejected_registrations: Arc::new(AtomicU64::new(0)),
            departures: Arc::new(AtomicU64::new(0)),
            per_category: Arc::new(DashMap::new()),
            started_at: Utc::now(),
        }
    }

    pub fn record_relayed(&self, category: Category) {
        self.records_relayed.fetch_add(1, Ordering::Relaxed);
        *self.per_category.entry(category).or_insert(0) += 1;
    }

    pub fn record_deliveries(&self, delivered: usize, failed: usize) {
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        self.send_failures.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_rejected_registration(&self) {
        self.rejected_registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_departure(&self) {
        self.departures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_for(&self, category: Category) -> u64 {
        self.per_category.get(&category).map(|v| *v).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_relayed: self.records_relayed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            rejected_registrations: self.rejected_registrations.load(Ordering::Relaxed),
            departures: self.departures.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of relay counters at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub records_relayed: u64,
    pub deliveries: u64,
    pub send_failures: u64,
    pub rejected_registrations: u64,
    pub departures: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
}

/// Periodically log relay counters and live connection counts.
///
/// Runs until the task is aborted.
pub async fn run_metrics_reporter(
    metrics: RelayMetrics,
    registry: Arc<Registry>,
    interval_seconds: u64,
) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));

    // Missed ticks are skipped, never replayed
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot = metrics.snapshot();
        info!(
            temperature = registry.len(Category::Temperature),
            humidity = registry.len(Category::Humidity),
            air_quality = registry.len(Category::AirQuality),
            records_relayed = snapshot.records_relayed,
            deliveries = snapshot.deliveries,
            send_failures = snapshot.send_failures,
            rejected_registrations = snapshot.rejected_registrations,
            departures = snapshot.departures,
            uptime_seconds = snapshot.uptime_seconds,
            "Relay metrics"
        );
    }
}
