//! Alert sink capability, rate-limited dispatch and test doubles

pub mod alert_manager;
pub mod rate_limiter;
pub mod sink;

pub use alert_manager::AlertManager;
pub use rate_limiter::RateLimiter;
pub use sink::{AlertSink, DeliveryStatus, LogAlertSink, RecordingAlertSink};
