use crate::alerts::{AlertSink, DeliveryStatus, RateLimiter};
use crate::config::AlertsConfig;
use crate::error::AlertError;
use crate::events::Timestamp;
use crate::monitoring::IngestionMonitor;
use chrono::Utc;
use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Longest message forwarded to the inner sink, in bytes
const MAX_MESSAGE_LEN: usize = 1024;

/// Rate-limited front for another alert sink
///
/// A sweep over a colony of silent hamsters can raise dozens of alerts at once.
/// The AlertManager forwards at most `max_per_minute` of them to the inner sink
/// and parks the rest in a bounded FIFO queue. Queued alerts go out on the next
/// delivery, or when `tick()` is called after capacity frees up.
///
/// The manager is itself an `AlertSink`, so the tracker does not know whether it
/// talks to a bare sink or to a rate-limited one. The dispatch lock only covers
/// the queue and the limiter; the inner sink is always called after it is
/// released, so a slow delivery never holds up other callers.
pub struct AlertManager {
    /// Sink that actually delivers messages
    inner: Box<dyn AlertSink>,
    /// Limiter and queue, guarded together
    state: Mutex<DispatchState>,
    /// Maximum number of alerts held back while rate limited
    max_queue_size: usize,
    /// Receives the final result of alerts that were queued
    monitor: Option<Arc<IngestionMonitor>>,
}

#[derive(Debug)]
struct DispatchState {
    rate_limiter: RateLimiter,
    queue: VecDeque<String>,
}

impl AlertManager {
    /// Create a manager in front of `inner`
    ///
    /// # Arguments
    ///
    /// * `inner` - Sink receiving the messages that pass the rate limit
    /// * `max_per_minute` - Maximum number of deliveries per rolling minute
    /// * `max_queue_size` - Maximum number of alerts to hold while rate limited
    pub fn new(inner: Box<dyn AlertSink>, max_per_minute: usize, max_queue_size: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(DispatchState {
                rate_limiter: RateLimiter::per_minute(max_per_minute),
                queue: VecDeque::new(),
            }),
            max_queue_size,
            monitor: None,
        }
    }

    /// Create a manager using the `[alerts]` configuration section
    pub fn from_config(inner: Box<dyn AlertSink>, config: &AlertsConfig) -> Self {
        Self::new(inner, config.rate_limit_per_minute, config.max_queue_size)
    }

    /// Report drops and late deliveries of queued alerts to `monitor`
    pub fn with_monitor(mut self, monitor: Arc<IngestionMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Deliver or queue a message as of `now`
    ///
    /// Queued alerts are flushed first so ordering is preserved.
    ///
    /// # Errors
    ///
    /// Returns the inner sink's error when an immediate delivery fails. A
    /// queued message reports `DeliveryStatus::Queued`; its final result goes
    /// to the monitor.
    pub fn deliver_at(&self, message: &str, now: Timestamp) -> Result<DeliveryStatus, AlertError> {
        let message = truncate_text(message, MAX_MESSAGE_LEN);

        let (backlog, send_immediately) = {
            let mut state = self.lock_state();
            let backlog = Self::take_sendable(&mut state, now);

            if state.queue.is_empty() && state.rate_limiter.can_send_at(now) {
                state.rate_limiter.record_at(now);
                (backlog, true)
            } else {
                self.enqueue(&mut state, message.clone());
                (backlog, false)
            }
        };

        self.send_backlog(backlog, now);

        if send_immediately {
            self.send(&message, now).map(|()| DeliveryStatus::Delivered)
        } else {
            Ok(DeliveryStatus::Queued)
        }
    }

    /// Flush queued alerts that fit in the rate limit as of `now`
    ///
    /// Meant to be called periodically so held-back alerts still go out when no
    /// new alert arrives.
    ///
    /// # Returns
    ///
    /// Number of queued alerts handed to the inner sink
    pub fn tick_at(&self, now: Timestamp) -> usize {
        let backlog = Self::take_sendable(&mut self.lock_state(), now);
        self.send_backlog(backlog, now)
    }

    /// Flush queued alerts using the current time
    pub fn tick(&self) -> usize {
        self.tick_at(Utc::now())
    }

    /// Number of alerts waiting for rate-limit capacity
    pub fn queued_alert_count(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Number of deliveries inside the rate-limit window ending at `now`
    pub fn delivered_count_at(&self, now: Timestamp) -> usize {
        self.lock_state().rate_limiter.count_at(now)
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop every queued alert the limiter admits and reserve its slot
    fn take_sendable(state: &mut DispatchState, now: Timestamp) -> Vec<String> {
        let mut batch = Vec::new();

        while state.rate_limiter.can_send_at(now) {
            match state.queue.pop_front() {
                Some(message) => {
                    state.rate_limiter.record_at(now);
                    batch.push(message);
                }
                None => break,
            }
        }

        batch
    }

    /// Deliver previously queued alerts; must be called without the dispatch lock
    fn send_backlog(&self, backlog: Vec<String>, now: Timestamp) -> usize {
        let processed = backlog.len();

        for message in backlog {
            let delivered = self.send(&message, now).is_ok();
            if let Some(monitor) = &self.monitor {
                monitor.record_alert(delivered);
            }
        }

        if processed > 0 {
            info!("Processed {} queued alerts", processed);
        }

        processed
    }

    fn enqueue(&self, state: &mut DispatchState, message: String) {
        if state.queue.len() >= self.max_queue_size {
            if let Some(dropped) = state.queue.pop_front() {
                warn!("Alert queue full, dropping oldest alert: {}", dropped);
                if let Some(monitor) = &self.monitor {
                    monitor.record_alert_dropped();
                }
            }
        }
        info!("Queued alert due to rate limit: {}", message);
        state.queue.push_back(message);
    }

    /// Hand one message to the inner sink using a slot reserved at `now`
    ///
    /// A failed delivery gives its slot back.
    fn send(&self, message: &str, now: Timestamp) -> Result<(), AlertError> {
        match self.inner.deliver(message) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to deliver alert '{}': {}", message, e);
                self.lock_state().rate_limiter.release_at(now);
                Err(e)
            }
        }
    }
}

impl AlertSink for AlertManager {
    fn deliver(&self, message: &str) -> Result<DeliveryStatus, AlertError> {
        self.deliver_at(message, Utc::now())
    }
}

/// Truncate text to at most `max_length` bytes, ending with "..."
///
/// Cuts on a UTF-8 character boundary.
fn truncate_text(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        return text.to_string();
    }

    let mut truncate_at = max_length.saturating_sub(3);
    while truncate_at > 0 && !text.is_char_boundary(truncate_at) {
        truncate_at -= 1;
    }

    format!("{}...", &text[..truncate_at])
}
