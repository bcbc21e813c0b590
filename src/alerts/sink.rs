use crate::error::AlertError;
use log::warn;
use std::sync::{Arc, Mutex, PoisonError};

/// What happened to a message handed to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The message reached its destination
    Delivered,
    /// The message was accepted but held back, e.g. by a rate limit
    Queued,
}

/// Capability used by the tracker to report anomalies
///
/// Implementations decide how a message reaches a human. Delivery is best-effort:
/// callers log and drop failures instead of retrying.
#[cfg_attr(test, mockall::automock)]
pub trait AlertSink: Send + Sync {
    /// Deliver a single human-readable alert message
    fn deliver(&self, message: &str) -> Result<DeliveryStatus, AlertError>;
}

/// Alert sink that writes every alert to the application log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn deliver(&self, message: &str) -> Result<DeliveryStatus, AlertError> {
        warn!("ALERT: {}", message);
        Ok(DeliveryStatus::Delivered)
    }
}

/// Alert sink that keeps every delivered message in memory
///
/// Clones share the same message buffer, so a clone can be handed to the
/// tracker while this handle is inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlertSink {
    messages: Arc<Mutex<Vec<String>>>,
    fail_deliveries: bool,
}

impl RecordingAlertSink {
    /// Create a sink that accepts every message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that records every message but reports each delivery as failed
    pub fn failing() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            fail_deliveries: true,
        }
    }

    /// All messages received so far, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of messages received so far
    pub fn count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of received messages containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }

    /// Forget all recorded messages
    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AlertSink for RecordingAlertSink {
    fn deliver(&self, message: &str) -> Result<DeliveryStatus, AlertError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());

        if self.fail_deliveries {
            Err(AlertError::DeliveryFailed(
                "recording sink configured to fail".to_string(),
            ))
        } else {
            Ok(DeliveryStatus::Delivered)
        }
    }
}
