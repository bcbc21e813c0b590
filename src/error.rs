use thiserror::Error;

/// Errors raised while decoding an external event payload
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Event payload has no \"type\" discriminator")]
    MissingDiscriminator,

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised when a decoded event is structurally unusable
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Identifier field '{field}' must not be empty")]
    EmptyIdentifier { field: &'static str },
}

/// Errors returned to the transport when submitting an event
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors that can occur when delivering alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to deliver alert: {0}")]
    DeliveryFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors that can occur while running the background sweeper
#[derive(Error, Debug)]
pub enum SweeperError {
    #[error("Failed to spawn sweeper thread: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Sweeper thread failed to join: {0}")]
    JoinFailed(String),
}
