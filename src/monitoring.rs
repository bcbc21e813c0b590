//! Ingestion statistics for the activity tracker
//!
//! Counts how many events of each kind were applied or discarded, how many
//! alerts reached the sink, and how many sweeps ran. The numbers cover the
//! process lifetime, like the tallies themselves.

use crate::events::{EventKind, Timestamp};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Applied/discarded counts for one event kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub applied: u64,
    pub ignored: u64,
}

/// Point-in-time view of the ingestion counters
#[derive(Debug, Clone)]
pub struct IngestionMetrics {
    /// Events that changed tracker state
    pub events_applied: u64,
    /// Events discarded as duplicates, mismatches or malformed readings
    pub events_ignored: u64,
    /// Breakdown per event kind
    pub per_kind: BTreeMap<EventKind, KindCounts>,
    /// Alerts accepted by the sink
    pub alerts_delivered: u64,
    /// Alerts the sink failed to deliver
    pub alerts_failed: u64,
    /// Alerts held back by the rate limit, whatever happened to them later
    pub alerts_queued: u64,
    /// Queued alerts evicted because the queue was full
    pub alerts_dropped: u64,
    /// Share of finished alerts that were delivered, as a percentage (0-100)
    pub alert_success_rate: f64,
    /// Completed inactivity sweeps
    pub sweeps_completed: u64,
    /// Timestamp when these metrics were collected
    pub timestamp: Timestamp,
}

#[derive(Debug, Default)]
struct Counters {
    per_kind: BTreeMap<EventKind, KindCounts>,
    alerts_delivered: u64,
    alerts_failed: u64,
    alerts_queued: u64,
    alerts_dropped: u64,
    sweeps_completed: u64,
}

/// Thread-safe collector of ingestion statistics
#[derive(Debug, Default)]
pub struct IngestionMonitor {
    counters: Mutex<Counters>,
}

impl IngestionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one event
    pub fn record_event(&self, kind: EventKind, applied: bool) {
        let mut counters = self.lock();
        let entry = counters.per_kind.entry(kind).or_default();
        if applied {
            entry.applied += 1;
        } else {
            entry.ignored += 1;
        }
    }

    /// Record the result of an alert delivery attempt
    pub fn record_alert(&self, delivered: bool) {
        debug!("Recording alert delivery result: delivered={}", delivered);
        let mut counters = self.lock();
        if delivered {
            counters.alerts_delivered += 1;
        } else {
            counters.alerts_failed += 1;
        }
    }

    /// Record an alert that was accepted but held back
    ///
    /// Its final result is recorded later through `record_alert` or
    /// `record_alert_dropped`.
    pub fn record_alert_queued(&self) {
        self.lock().alerts_queued += 1;
    }

    /// Record a queued alert that was evicted without being delivered
    pub fn record_alert_dropped(&self) {
        self.lock().alerts_dropped += 1;
    }

    /// Record a finished inactivity sweep
    pub fn record_sweep(&self) {
        self.lock().sweeps_completed += 1;
    }

    /// Collect the current counters and log a one-line summary
    pub fn collect_metrics(&self) -> IngestionMetrics {
        let counters = self.lock();

        let events_applied = counters.per_kind.values().map(|c| c.applied).sum();
        let events_ignored = counters.per_kind.values().map(|c| c.ignored).sum();
        let attempts =
            counters.alerts_delivered + counters.alerts_failed + counters.alerts_dropped;
        let alert_success_rate = if attempts == 0 {
            100.0
        } else {
            counters.alerts_delivered as f64 / attempts as f64 * 100.0
        };

        let metrics = IngestionMetrics {
            events_applied,
            events_ignored,
            per_kind: counters.per_kind.clone(),
            alerts_delivered: counters.alerts_delivered,
            alerts_failed: counters.alerts_failed,
            alerts_queued: counters.alerts_queued,
            alerts_dropped: counters.alerts_dropped,
            alert_success_rate,
            sweeps_completed: counters.sweeps_completed,
            timestamp: Utc::now(),
        };
        drop(counters);

        info!(
            "Ingestion metrics: applied={}, ignored={}, alerts={}/{} (queued={}, dropped={}), sweeps={}",
            metrics.events_applied,
            metrics.events_ignored,
            metrics.alerts_delivered,
            attempts,
            metrics.alerts_queued,
            metrics.alerts_dropped,
            metrics.sweeps_completed
        );

        if metrics.alert_success_rate < 90.0 {
            warn!(
                "Low alert delivery success rate: {:.1}%",
                metrics.alert_success_rate
            );
        }

        metrics
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
