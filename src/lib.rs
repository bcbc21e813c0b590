/// Error types for event ingestion, alerting and configuration
pub mod error;

/// Inbound sensor events and their wire format
pub mod events;

/// Alert sink capability and rate-limited dispatch
pub mod alerts;

/// Live hamster and sensor state under a single lock
pub mod tracker;

/// Periodic inactivity checks
pub mod sweeper;

/// Daily activity reports
pub mod report;

/// Ingestion statistics
pub mod monitoring;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use alerts::{AlertManager, AlertSink, DeliveryStatus, LogAlertSink, RecordingAlertSink};
pub use config::Config;
pub use error::{AlertError, ConfigError, DecodeError, SubmitError, SweeperError, ValidationError};
pub use events::{EventKind, HamsterEvent, Timestamp};
pub use report::{DailyReport, DailyReporter, HamsterStats, ReportGenerator};
pub use sweeper::{InactivitySweeper, SweepSettings};
pub use tracker::{ActivityTracker, EventOutcome, TrackerSnapshot};
