//! Core event types for the hamster activity tracker
//!
//! This module defines the closed set of sensor events the tracker understands,
//! together with decoding from the JSON wire shape used by the transport layer.

use crate::error::{DecodeError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Discriminator values accepted in the `type` field
const KNOWN_EVENT_TYPES: [&str; 4] = ["HamsterEnter", "HamsterExit", "WheelSpin", "SensorFailure"];

/// A single activity event reported by the wheel sensors
///
/// Encoded on the wire as a JSON object tagged by `type`, with camelCase fields:
/// `{"type":"WheelSpin","wheelId":"w1","durationMs":12000}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum HamsterEvent {
    /// Hamster begins occupying a wheel
    HamsterEnter { hamster_id: String, wheel_id: String },
    /// Hamster stops occupying a wheel
    HamsterExit { hamster_id: String, wheel_id: String },
    /// Wheel reports a spin of the given duration
    WheelSpin { wheel_id: String, duration_ms: i64 },
    /// Sensor reports a malfunction
    SensorFailure { sensor_id: String, error_code: i32 },
}

/// Variant name without payload, used for counting and logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    HamsterEnter,
    HamsterExit,
    WheelSpin,
    SensorFailure,
}

impl HamsterEvent {
    /// Decode an event from its JSON representation
    ///
    /// Distinguishes a missing discriminator and an unknown discriminator from
    /// a known variant with missing or mistyped fields.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the payload is not a JSON object describing one
    /// of the known event variants.
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(payload)?;

        let event_type = match value.get("type") {
            Some(serde_json::Value::String(event_type)) => event_type.as_str(),
            Some(other) => {
                return Err(DecodeError::InvalidPayload(format!(
                    "\"type\" must be a string, got {}",
                    other
                )))
            }
            None => return Err(DecodeError::MissingDiscriminator),
        };

        if !KNOWN_EVENT_TYPES.contains(&event_type) {
            return Err(DecodeError::UnknownEventType(event_type.to_string()));
        }

        serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload(e.to_string()))
    }

    /// Check that every identifier field carries a usable value
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyIdentifier` naming the first blank field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let ids: Vec<(&'static str, &str)> = match self {
            HamsterEvent::HamsterEnter {
                hamster_id,
                wheel_id,
            }
            | HamsterEvent::HamsterExit {
                hamster_id,
                wheel_id,
            } => vec![("hamsterId", hamster_id.as_str()), ("wheelId", wheel_id.as_str())],
            HamsterEvent::WheelSpin { wheel_id, .. } => vec![("wheelId", wheel_id.as_str())],
            HamsterEvent::SensorFailure { sensor_id, .. } => {
                vec![("sensorId", sensor_id.as_str())]
            }
        };

        match ids.iter().find(|(_, id)| id.trim().is_empty()) {
            Some(&(field, _)) => Err(ValidationError::EmptyIdentifier { field }),
            None => Ok(()),
        }
    }

    /// The payload-free kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            HamsterEvent::HamsterEnter { .. } => EventKind::HamsterEnter,
            HamsterEvent::HamsterExit { .. } => EventKind::HamsterExit,
            HamsterEvent::WheelSpin { .. } => EventKind::WheelSpin,
            HamsterEvent::SensorFailure { .. } => EventKind::SensorFailure,
        }
    }

    /// The wheel sensor this event refers to
    ///
    /// Wheels and their sensors share one identifier space.
    pub fn sensor_id(&self) -> &str {
        match self {
            HamsterEvent::HamsterEnter { wheel_id, .. }
            | HamsterEvent::HamsterExit { wheel_id, .. }
            | HamsterEvent::WheelSpin { wheel_id, .. } => wheel_id,
            HamsterEvent::SensorFailure { sensor_id, .. } => sensor_id,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::HamsterEnter => "HamsterEnter",
            EventKind::HamsterExit => "HamsterExit",
            EventKind::WheelSpin => "WheelSpin",
            EventKind::SensorFailure => "SensorFailure",
        };
        f.write_str(name)
    }
}
