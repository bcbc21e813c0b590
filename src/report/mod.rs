//! Daily aggregate view of hamster activity
//!
//! A report is a pure projection of a tracker snapshot. Building one never
//! touches live state, so reports can be produced while events keep arriving.

pub mod generator;

pub use generator::{DailyReporter, ReportGenerator};

use crate::tracker::TrackerSnapshot;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-hamster line of the daily report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HamsterStats {
    pub hamster_id: String,
    pub total_rounds: u64,
    /// True when `total_rounds` exceeds the configured active threshold
    pub is_active: bool,
    pub entries: u32,
    pub exits: u32,
    pub active_duration_ms: u64,
}

/// Activity of every known hamster for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub hamster_stats: BTreeMap<String, HamsterStats>,
}

impl DailyReport {
    /// Project `snapshot` into a report for `date`
    ///
    /// Hamsters that never had a round credited appear with zero rounds.
    pub fn from_snapshot(snapshot: &TrackerSnapshot, date: NaiveDate, active_threshold: u64) -> Self {
        let hamster_stats = snapshot
            .hamster_ids()
            .into_iter()
            .map(|id| {
                let tally = snapshot.tallies.get(id).cloned().unwrap_or_default();
                let stats = HamsterStats {
                    hamster_id: id.to_string(),
                    total_rounds: tally.rounds,
                    is_active: tally.rounds > active_threshold,
                    entries: tally.entries,
                    exits: tally.exits,
                    active_duration_ms: tally.active_duration_ms,
                };
                (id.to_string(), stats)
            })
            .collect();

        Self {
            date,
            hamster_stats,
        }
    }

    /// Number of hamsters flagged active
    pub fn active_count(&self) -> usize {
        self.hamster_stats.values().filter(|s| s.is_active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HamsterEvent;
    use crate::tracker::TrackerState;
    use chrono::Utc;

    fn snapshot_after(events: &[HamsterEvent]) -> TrackerSnapshot {
        let now = Utc::now();
        let mut state = TrackerState::new();
        for event in events {
            state.apply(event, now);
        }
        TrackerSnapshot::capture(&state, now)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn test_empty_snapshot_gives_empty_report() {
        let report = DailyReport::from_snapshot(&snapshot_after(&[]), day(), 0);

        assert_eq!(report.date, day());
        assert!(report.hamster_stats.is_empty());
        assert_eq!(report.active_count(), 0);
    }

    #[test]
    fn test_hamster_without_rounds_is_listed_inactive() {
        let snapshot = snapshot_after(&[HamsterEvent::HamsterEnter {
            hamster_id: "h1".to_string(),
            wheel_id: "w1".to_string(),
        }]);

        let report = DailyReport::from_snapshot(&snapshot, day(), 0);

        let stats = &report.hamster_stats["h1"];
        assert_eq!(stats.total_rounds, 0);
        assert!(!stats.is_active);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let snapshot = snapshot_after(&[
            HamsterEvent::HamsterEnter {
                hamster_id: "h1".to_string(),
                wheel_id: "w1".to_string(),
            },
            HamsterEvent::WheelSpin {
                wheel_id: "w1".to_string(),
                duration_ms: 5000,
            },
        ]);
        let report = DailyReport::from_snapshot(&snapshot, day(), 0);

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["date"], "2024-03-14");
        assert_eq!(json["hamsterStats"]["h1"]["hamsterId"], "h1");
        assert_eq!(json["hamsterStats"]["h1"]["totalRounds"], 1);
        assert_eq!(json["hamsterStats"]["h1"]["isActive"], true);
        assert_eq!(json["hamsterStats"]["h1"]["activeDurationMs"], 5000);
    }
}
