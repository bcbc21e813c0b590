use crate::events::Timestamp;
use crate::tracker::state::{HamsterState, HamsterTally, SensorState, TrackerState};
use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet};

/// Point-in-time copy of the tracker state
///
/// Taken under the tracker lock, so it always reflects a whole number of
/// applied events. Maps are ordered for stable reports and alert order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    /// When the copy was taken
    pub taken_at: Timestamp,
    pub hamsters: BTreeMap<String, HamsterState>,
    pub sensors: BTreeMap<String, SensorState>,
    /// Wheel id to occupying hamster id
    pub occupancy: BTreeMap<String, String>,
    pub tallies: BTreeMap<String, HamsterTally>,
}

impl TrackerSnapshot {
    pub(crate) fn capture(state: &TrackerState, taken_at: Timestamp) -> Self {
        Self {
            taken_at,
            hamsters: state
                .hamsters
                .iter()
                .map(|(id, hamster)| (id.clone(), hamster.clone()))
                .collect(),
            sensors: state
                .sensors
                .iter()
                .map(|(id, sensor)| (id.clone(), sensor.clone()))
                .collect(),
            occupancy: state
                .occupancy
                .iter()
                .map(|(wheel, hamster)| (wheel.clone(), hamster.clone()))
                .collect(),
            tallies: state
                .tallies
                .iter()
                .map(|(id, tally)| (id.clone(), tally.clone()))
                .collect(),
        }
    }

    /// Every hamster the tracker knows about, in id order
    pub fn hamster_ids(&self) -> BTreeSet<&str> {
        self.hamsters
            .keys()
            .chain(self.tallies.keys())
            .map(String::as_str)
            .collect()
    }

    /// Rounds credited to `hamster_id`, zero when none
    pub fn rounds_for(&self, hamster_id: &str) -> u64 {
        self.tallies
            .get(hamster_id)
            .map(|tally| tally.rounds)
            .unwrap_or(0)
    }

    /// Hamster currently occupying `wheel_id`
    pub fn occupant_of(&self, wheel_id: &str) -> Option<&str> {
        self.occupancy.get(wheel_id).map(String::as_str)
    }

    /// Check that the occupancy index and hamster states agree in both directions
    pub fn is_consistent(&self) -> bool {
        let index_matches_claims = self.occupancy.iter().all(|(wheel, hamster)| {
            self.hamsters
                .get(hamster)
                .and_then(|state| state.current_wheel.as_ref())
                == Some(wheel)
        });

        let claims_match_index = self.hamsters.iter().all(|(hamster, state)| {
            match &state.current_wheel {
                Some(wheel) => self.occupancy.get(wheel) == Some(hamster),
                None => true,
            }
        });

        index_matches_claims && claims_match_index
    }

    /// Alert messages for entities that went quiet before `now`
    ///
    /// A hamster is stale when its last activity is more than `hamster_threshold`
    /// old. A sensor is stale when it is still working and its last event is
    /// more than `sensor_threshold` old; failed sensors were reported at failure
    /// time and are skipped.
    pub fn inactivity_alerts(
        &self,
        now: Timestamp,
        hamster_threshold: Duration,
        sensor_threshold: Duration,
    ) -> Vec<String> {
        let hamster_alerts = self.hamsters.iter().filter_map(|(id, state)| {
            let idle = now - state.last_activity;
            (idle > hamster_threshold).then(|| {
                format!("Hamster {} inactive for {} minutes", id, idle.num_minutes())
            })
        });

        let sensor_alerts = self
            .sensors
            .iter()
            .filter(|(_, sensor)| sensor.working)
            .filter_map(|(id, sensor)| {
                let silent = now - sensor.last_event;
                (silent > sensor_threshold).then(|| {
                    format!("Sensor {} inactive for {} minutes", id, silent.num_minutes())
                })
            });

        hamster_alerts.chain(sensor_alerts).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HamsterEvent;
    use chrono::Utc;

    fn build_state(events: &[HamsterEvent], at: Timestamp) -> TrackerState {
        let mut state = TrackerState::new();
        for event in events {
            state.apply(event, at);
        }
        state
    }

    fn enter(hamster: &str, wheel: &str) -> HamsterEvent {
        HamsterEvent::HamsterEnter {
            hamster_id: hamster.to_string(),
            wheel_id: wheel.to_string(),
        }
    }

    #[test]
    fn test_capture_copies_everything() {
        let now = Utc::now();
        let state = build_state(
            &[
                enter("h1", "w1"),
                HamsterEvent::WheelSpin {
                    wheel_id: "w1".to_string(),
                    duration_ms: 12000,
                },
            ],
            now,
        );

        let snapshot = TrackerSnapshot::capture(&state, now);

        assert_eq!(snapshot.taken_at, now);
        assert_eq!(snapshot.rounds_for("h1"), 2);
        assert_eq!(snapshot.rounds_for("nobody"), 0);
        assert_eq!(snapshot.occupant_of("w1"), Some("h1"));
        assert_eq!(snapshot.hamster_ids().into_iter().collect::<Vec<_>>(), vec!["h1"]);
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_is_consistent_detects_dangling_index_entry() {
        let now = Utc::now();
        let state = build_state(&[enter("h1", "w1")], now);
        let mut snapshot = TrackerSnapshot::capture(&state, now);

        snapshot
            .occupancy
            .insert("w2".to_string(), "h1".to_string());

        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn test_is_consistent_detects_missing_index_entry() {
        let now = Utc::now();
        let state = build_state(&[enter("h1", "w1")], now);
        let mut snapshot = TrackerSnapshot::capture(&state, now);

        snapshot.occupancy.clear();

        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn test_inactivity_alerts_respect_thresholds() {
        let start = Utc::now();
        let state = build_state(&[enter("h1", "w1")], start);
        let snapshot = TrackerSnapshot::capture(&state, start);

        // Exactly at the threshold nothing is reported
        let alerts = snapshot.inactivity_alerts(
            start + Duration::minutes(60),
            Duration::minutes(60),
            Duration::minutes(60),
        );
        assert!(alerts.is_empty());

        let alerts = snapshot.inactivity_alerts(
            start + Duration::minutes(61),
            Duration::minutes(60),
            Duration::minutes(30),
        );
        assert_eq!(
            alerts,
            vec![
                "Hamster h1 inactive for 61 minutes".to_string(),
                "Sensor w1 inactive for 61 minutes".to_string(),
            ]
        );
    }

    #[test]
    fn test_inactivity_alerts_skip_failed_sensors() {
        let start = Utc::now();
        let state = build_state(
            &[HamsterEvent::SensorFailure {
                sensor_id: "w1".to_string(),
                error_code: 7,
            }],
            start,
        );
        let snapshot = TrackerSnapshot::capture(&state, start);

        let alerts = snapshot.inactivity_alerts(
            start + Duration::hours(5),
            Duration::minutes(60),
            Duration::minutes(30),
        );

        assert!(alerts.is_empty());
    }
}
