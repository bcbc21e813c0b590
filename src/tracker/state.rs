//! Live tracker state and the per-event transition rules
//!
//! Everything here is plain data mutated through `&mut self`; the caller is
//! responsible for serializing access (see `ActivityTracker`).

use crate::events::{HamsterEvent, Timestamp};
use std::collections::HashMap;

/// Spin time that counts as one completed round
pub const ROUND_DURATION_MS: i64 = 5000;

/// Per-hamster occupancy and liveness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HamsterState {
    /// Wheel the hamster currently occupies, if any
    pub current_wheel: Option<String>,
    /// Last accepted enter, exit or credited spin
    pub last_activity: Timestamp,
}

/// Per-sensor liveness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorState {
    /// Last event naming this sensor
    pub last_event: Timestamp,
    /// False once a failure has been reported; never reset
    pub working: bool,
    /// Code from the most recent failure report
    pub last_error_code: Option<i32>,
}

/// Accumulated activity for the current reporting period
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HamsterTally {
    /// Whole rounds credited from wheel spins
    pub rounds: u64,
    /// Accepted wheel entries
    pub entries: u32,
    /// Accepted wheel exits
    pub exits: u32,
    /// Total duration of the spins that were credited
    pub active_duration_ms: u64,
    /// Time of the last credited spin
    pub last_spin: Option<Timestamp>,
}

/// Why an event left occupancy and tallies untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Enter from a hamster already sitting in a wheel
    AlreadyInWheel { wheel_id: String },
    /// Enter into a wheel held by another hamster
    WheelOccupied { occupant: String },
    /// Exit naming a wheel the hamster is not in
    ExitMismatch,
    /// Spin with zero or negative duration
    NonPositiveDuration,
    /// Spin on an empty wheel
    NoOccupant,
    /// Spin shorter than one round
    PartialRound,
}

/// Effect of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Entered,
    Exited,
    Credited { hamster_id: String, rounds: u64 },
    SensorFailed { alert: String },
    Ignored(IgnoreReason),
}

impl EventOutcome {
    /// Whether the event changed hamster or sensor-failure state
    pub fn is_applied(&self) -> bool {
        !matches!(self, EventOutcome::Ignored(_))
    }

    /// Alert text that must be delivered for this outcome
    pub fn alert(&self) -> Option<&str> {
        match self {
            EventOutcome::SensorFailed { alert } => Some(alert.as_str()),
            _ => None,
        }
    }
}

/// All mutable tracker state
///
/// `occupancy` mirrors `hamsters[*].current_wheel`: a wheel maps to a hamster
/// exactly when that hamster claims the wheel.
#[derive(Debug, Clone, Default)]
pub struct TrackerState {
    pub(crate) hamsters: HashMap<String, HamsterState>,
    pub(crate) sensors: HashMap<String, SensorState>,
    pub(crate) occupancy: HashMap<String, String>,
    pub(crate) tallies: HashMap<String, HamsterTally>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event observed at `now`
    ///
    /// The sensor named by the event is refreshed first, whether or not the
    /// event itself is accepted.
    pub fn apply(&mut self, event: &HamsterEvent, now: Timestamp) -> EventOutcome {
        self.touch_sensor(event.sensor_id(), now);

        match event {
            HamsterEvent::HamsterEnter {
                hamster_id,
                wheel_id,
            } => self.enter(hamster_id, wheel_id, now),
            HamsterEvent::HamsterExit {
                hamster_id,
                wheel_id,
            } => self.exit(hamster_id, wheel_id, now),
            HamsterEvent::WheelSpin {
                wheel_id,
                duration_ms,
            } => self.spin(wheel_id, *duration_ms, now),
            HamsterEvent::SensorFailure {
                sensor_id,
                error_code,
            } => self.fail_sensor(sensor_id, *error_code),
        }
    }

    fn enter(&mut self, hamster_id: &str, wheel_id: &str, now: Timestamp) -> EventOutcome {
        if let Some(current) = self
            .hamsters
            .get(hamster_id)
            .and_then(|state| state.current_wheel.as_ref())
        {
            return EventOutcome::Ignored(IgnoreReason::AlreadyInWheel {
                wheel_id: current.clone(),
            });
        }

        if let Some(occupant) = self.occupancy.get(wheel_id) {
            return EventOutcome::Ignored(IgnoreReason::WheelOccupied {
                occupant: occupant.clone(),
            });
        }

        self.hamsters.insert(
            hamster_id.to_string(),
            HamsterState {
                current_wheel: Some(wheel_id.to_string()),
                last_activity: now,
            },
        );
        self.occupancy
            .insert(wheel_id.to_string(), hamster_id.to_string());
        self.tallies
            .entry(hamster_id.to_string())
            .or_default()
            .entries += 1;

        EventOutcome::Entered
    }

    fn exit(&mut self, hamster_id: &str, wheel_id: &str, now: Timestamp) -> EventOutcome {
        match self.hamsters.get_mut(hamster_id) {
            Some(state) if state.current_wheel.as_deref() == Some(wheel_id) => {
                state.current_wheel = None;
                state.last_activity = now;
            }
            _ => return EventOutcome::Ignored(IgnoreReason::ExitMismatch),
        }

        self.occupancy.remove(wheel_id);
        self.tallies
            .entry(hamster_id.to_string())
            .or_default()
            .exits += 1;

        EventOutcome::Exited
    }

    fn spin(&mut self, wheel_id: &str, duration_ms: i64, now: Timestamp) -> EventOutcome {
        if duration_ms <= 0 {
            return EventOutcome::Ignored(IgnoreReason::NonPositiveDuration);
        }

        let hamster_id = match self.occupancy.get(wheel_id) {
            Some(hamster_id) => hamster_id.clone(),
            None => return EventOutcome::Ignored(IgnoreReason::NoOccupant),
        };

        let rounds = (duration_ms / ROUND_DURATION_MS) as u64;
        if rounds == 0 {
            return EventOutcome::Ignored(IgnoreReason::PartialRound);
        }

        // Tallies saturate instead of overflowing
        let tally = self.tallies.entry(hamster_id.clone()).or_default();
        tally.rounds = tally.rounds.saturating_add(rounds);
        tally.active_duration_ms = tally.active_duration_ms.saturating_add(duration_ms as u64);
        tally.last_spin = Some(now);

        if let Some(state) = self.hamsters.get_mut(&hamster_id) {
            state.last_activity = now;
        }

        EventOutcome::Credited { hamster_id, rounds }
    }

    fn fail_sensor(&mut self, sensor_id: &str, error_code: i32) -> EventOutcome {
        if let Some(sensor) = self.sensors.get_mut(sensor_id) {
            sensor.working = false;
            sensor.last_error_code = Some(error_code);
        }

        EventOutcome::SensorFailed {
            alert: format!("Sensor {} failed (error: {})", sensor_id, error_code),
        }
    }

    /// Advance a sensor's last-seen time, creating it on first sight
    ///
    /// Out-of-order timestamps never move last-seen backwards.
    fn touch_sensor(&mut self, sensor_id: &str, now: Timestamp) {
        let sensor = self
            .sensors
            .entry(sensor_id.to_string())
            .or_insert_with(|| SensorState {
                last_event: now,
                working: true,
                last_error_code: None,
            });

        if now > sensor.last_event {
            sensor.last_event = now;
        }
    }
}
