use crate::alerts::{AlertSink, DeliveryStatus};
use crate::error::{SubmitError, ValidationError};
use crate::events::{HamsterEvent, Timestamp};
use crate::monitoring::IngestionMonitor;
use crate::tracker::snapshot::TrackerSnapshot;
use crate::tracker::state::{EventOutcome, TrackerState};
use chrono::{Duration, Utc};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Owner of all live hamster, sensor and tally state
///
/// Every event is applied under one exclusive lock, so each event's effect is
/// atomic with respect to other writers and to snapshots. The lock is never
/// held while talking to the alert sink: alert text is produced under the lock
/// and delivered after it is released.
pub struct ActivityTracker {
    /// State guarded by the tracker lock
    state: Mutex<TrackerState>,
    /// Destination for failure and inactivity alerts
    alert_sink: Arc<dyn AlertSink>,
    /// Ingestion statistics
    monitor: Arc<IngestionMonitor>,
}

impl ActivityTracker {
    /// Create an empty tracker reporting to `alert_sink`
    pub fn new(alert_sink: Arc<dyn AlertSink>) -> Self {
        Self::with_monitor(alert_sink, Arc::new(IngestionMonitor::new()))
    }

    /// Create an empty tracker sharing an existing ingestion monitor
    pub fn with_monitor(alert_sink: Arc<dyn AlertSink>, monitor: Arc<IngestionMonitor>) -> Self {
        Self {
            state: Mutex::new(TrackerState::new()),
            alert_sink,
            monitor,
        }
    }

    /// Ingestion statistics collected by this tracker
    pub fn monitor(&self) -> &Arc<IngestionMonitor> {
        &self.monitor
    }

    /// Apply an event observed now
    pub fn apply_event(&self, event: &HamsterEvent) -> EventOutcome {
        self.apply_event_at(event, Utc::now())
    }

    /// Apply an event observed at `now`
    ///
    /// Semantically invalid events (duplicate enters, mismatched exits,
    /// non-positive or empty-wheel spins) are discarded and reported through
    /// the returned outcome, never as an error.
    pub fn apply_event_at(&self, event: &HamsterEvent, now: Timestamp) -> EventOutcome {
        let outcome = self.lock_state().apply(event, now);

        self.monitor.record_event(event.kind(), outcome.is_applied());

        match &outcome {
            EventOutcome::Ignored(reason) => {
                debug!("Discarded {} event: {:?}", event.kind(), reason)
            }
            EventOutcome::Credited { hamster_id, rounds } => {
                debug!("Credited {} rounds to hamster {}", rounds, hamster_id)
            }
            _ => debug!("Applied {} event", event.kind()),
        }

        if let Some(alert) = outcome.alert() {
            self.notify(alert);
        }

        outcome
    }

    /// Validate and apply an already decoded event
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if an identifier is blank. The event is not
    /// applied in that case.
    pub fn submit(&self, event: &HamsterEvent) -> Result<EventOutcome, ValidationError> {
        event.validate()?;
        Ok(self.apply_event(event))
    }

    /// Decode, validate and apply a JSON event payload
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Decode` for malformed payloads and
    /// `SubmitError::Validation` for blank identifiers.
    pub fn submit_json(&self, payload: &str) -> Result<EventOutcome, SubmitError> {
        let event = HamsterEvent::from_json(payload)?;
        Ok(self.submit(&event)?)
    }

    /// Copy the current state
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.lock_state();
        TrackerSnapshot::capture(&state, Utc::now())
    }

    /// Alert on every hamster and working sensor that has been quiet too long
    ///
    /// Works on a snapshot, so ingestion continues while alerts are delivered.
    ///
    /// # Returns
    ///
    /// Number of alerts raised
    pub fn check_inactive(
        &self,
        now: Timestamp,
        hamster_threshold: Duration,
        sensor_threshold: Duration,
    ) -> usize {
        let alerts = self
            .snapshot()
            .inactivity_alerts(now, hamster_threshold, sensor_threshold);

        for alert in &alerts {
            self.notify(alert);
        }

        alerts.len()
    }

    /// Hand one alert to the sink, logging and dropping failures
    fn notify(&self, message: &str) {
        match self.alert_sink.deliver(message) {
            Ok(DeliveryStatus::Delivered) => self.monitor.record_alert(true),
            Ok(DeliveryStatus::Queued) => {
                debug!("Alert held back by the sink: {}", message);
                self.monitor.record_alert_queued();
            }
            Err(e) => {
                error!("Alert delivery failed for '{}': {}", message, e);
                self.monitor.record_alert(false);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Tracker lock was poisoned, continuing with last consistent state");
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::sink::MockAlertSink;
    use crate::alerts::{AlertManager, RecordingAlertSink};
    use crate::error::{AlertError, DecodeError};
    use crate::tracker::state::IgnoreReason;
    use std::thread;

    fn tracker_with_recorder() -> (ActivityTracker, RecordingAlertSink) {
        let recorder = RecordingAlertSink::new();
        let tracker = ActivityTracker::new(Arc::new(recorder.clone()));
        (tracker, recorder)
    }

    fn enter(hamster: &str, wheel: &str) -> HamsterEvent {
        HamsterEvent::HamsterEnter {
            hamster_id: hamster.to_string(),
            wheel_id: wheel.to_string(),
        }
    }

    fn exit(hamster: &str, wheel: &str) -> HamsterEvent {
        HamsterEvent::HamsterExit {
            hamster_id: hamster.to_string(),
            wheel_id: wheel.to_string(),
        }
    }

    fn spin(wheel: &str, duration_ms: i64) -> HamsterEvent {
        HamsterEvent::WheelSpin {
            wheel_id: wheel.to_string(),
            duration_ms,
        }
    }

    fn failure(sensor: &str, error_code: i32) -> HamsterEvent {
        HamsterEvent::SensorFailure {
            sensor_id: sensor.to_string(),
            error_code,
        }
    }

    #[test]
    fn test_enter_then_spin_credits_rounds() {
        let (tracker, recorder) = tracker_with_recorder();

        tracker.apply_event(&enter("h1", "w1"));
        tracker.apply_event(&spin("w1", 12000));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.rounds_for("h1"), 2);
        assert!(snapshot.is_consistent());
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn test_spin_without_occupant_leaves_tallies_unchanged() {
        let (tracker, _recorder) = tracker_with_recorder();
        tracker.apply_event(&enter("h1", "w1"));
        tracker.apply_event(&spin("w1", 5000));
        let before = tracker.snapshot().tallies;

        let outcome = tracker.apply_event(&spin("w2", 50000));

        assert_eq!(outcome, EventOutcome::Ignored(IgnoreReason::NoOccupant));
        assert_eq!(tracker.snapshot().tallies, before);
    }

    #[test]
    fn test_non_positive_spin_refreshes_sensor_only() {
        let (tracker, _recorder) = tracker_with_recorder();
        let start = Utc::now();
        tracker.apply_event_at(&enter("h1", "w1"), start);

        let later = start + Duration::minutes(10);
        tracker.apply_event_at(&spin("w1", 0), later);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.rounds_for("h1"), 0);
        assert_eq!(snapshot.occupant_of("w1"), Some("h1"));
        assert_eq!(snapshot.hamsters["h1"].last_activity, start);
        assert_eq!(snapshot.sensors["w1"].last_event, later);
    }

    #[test]
    fn test_mismatched_exit_keeps_occupancy() {
        let (tracker, _recorder) = tracker_with_recorder();
        tracker.apply_event(&enter("h1", "w1"));

        let outcome = tracker.apply_event(&exit("h1", "w2"));

        assert_eq!(outcome, EventOutcome::Ignored(IgnoreReason::ExitMismatch));
        assert_eq!(tracker.snapshot().occupant_of("w1"), Some("h1"));
    }

    #[test]
    fn test_sensor_failure_alerts_exactly_once_and_is_not_swept() {
        let (tracker, recorder) = tracker_with_recorder();
        let start = Utc::now();

        tracker.apply_event_at(&failure("s1", 7), start);

        let snapshot = tracker.snapshot();
        assert!(!snapshot.sensors["s1"].working);
        assert_eq!(recorder.count(), 1);
        assert_eq!(recorder.count_containing("s1"), 1);
        assert_eq!(recorder.count_containing("7"), 1);

        let raised = tracker.check_inactive(
            start + Duration::hours(3),
            Duration::minutes(60),
            Duration::minutes(30),
        );
        assert_eq!(raised, 0);
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn test_alert_delivery_failure_does_not_fail_ingestion() {
        let recorder = RecordingAlertSink::failing();
        let tracker = ActivityTracker::new(Arc::new(recorder.clone()));

        let outcome = tracker.apply_event(&failure("w1", 3));

        assert!(outcome.is_applied());
        assert_eq!(recorder.count(), 1);

        let metrics = tracker.monitor().collect_metrics();
        assert_eq!(metrics.alerts_failed, 1);
        assert_eq!(metrics.alerts_delivered, 0);
    }

    #[test]
    fn test_failure_alert_goes_through_sink_capability() {
        let mut sink = MockAlertSink::new();
        sink.expect_deliver()
            .withf(|message| message == "Sensor w4 failed (error: 12)")
            .times(1)
            .returning(|_| Ok(DeliveryStatus::Delivered));

        let tracker = ActivityTracker::new(Arc::new(sink));
        tracker.apply_event(&failure("w4", 12));
    }

    #[test]
    fn test_sink_is_not_called_for_regular_events() {
        let mut sink = MockAlertSink::new();
        sink.expect_deliver().times(0);

        let tracker = ActivityTracker::new(Arc::new(sink));
        tracker.apply_event(&enter("h1", "w1"));
        tracker.apply_event(&spin("w1", 25000));
        tracker.apply_event(&exit("h1", "w1"));
    }

    #[test]
    fn test_sink_error_is_swallowed() {
        let mut sink = MockAlertSink::new();
        sink.expect_deliver()
            .times(2)
            .returning(|_| Err(AlertError::DeliveryFailed("smtp down".to_string())));

        let tracker = ActivityTracker::new(Arc::new(sink));
        let start = Utc::now();
        tracker.apply_event_at(&enter("h1", "w1"), start);

        let raised = tracker.check_inactive(
            start + Duration::minutes(90),
            Duration::minutes(60),
            Duration::minutes(60),
        );

        assert_eq!(raised, 2);
    }

    #[test]
    fn test_rate_limited_alerts_are_not_counted_as_delivered() {
        let monitor = Arc::new(IngestionMonitor::new());
        let recorder = RecordingAlertSink::new();
        let manager = AlertManager::new(Box::new(recorder.clone()), 1, 1)
            .with_monitor(Arc::clone(&monitor));
        let tracker = ActivityTracker::with_monitor(Arc::new(manager), Arc::clone(&monitor));

        tracker.apply_event(&failure("w1", 1));
        tracker.apply_event(&failure("w2", 2));
        tracker.apply_event(&failure("w3", 3));

        // w2 was queued, then evicted by w3; w3 is still waiting
        let metrics = monitor.collect_metrics();
        assert_eq!(metrics.alerts_delivered, 1);
        assert_eq!(metrics.alerts_queued, 2);
        assert_eq!(metrics.alerts_dropped, 1);
        assert!((metrics.alert_success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(recorder.messages(), vec!["Sensor w1 failed (error: 1)"]);
    }

    #[test]
    fn test_check_inactive_only_reports_stale_hamsters() {
        let (tracker, recorder) = tracker_with_recorder();
        let start = Utc::now();

        tracker.apply_event_at(&enter("sleepy", "w1"), start);
        tracker.apply_event_at(&enter("busy", "w2"), start + Duration::minutes(50));

        let raised = tracker.check_inactive(
            start + Duration::minutes(61),
            Duration::minutes(60),
            Duration::hours(24),
        );

        assert_eq!(raised, 1);
        assert_eq!(
            recorder.messages(),
            vec!["Hamster sleepy inactive for 61 minutes"]
        );
    }

    #[test]
    fn test_submit_json_paths() {
        let (tracker, _recorder) = tracker_with_recorder();

        let outcome = tracker
            .submit_json(r#"{"type":"HamsterEnter","hamsterId":"h1","wheelId":"w1"}"#)
            .unwrap();
        assert_eq!(outcome, EventOutcome::Entered);

        let result = tracker.submit_json(r#"{"type":"Teleport","hamsterId":"h1"}"#);
        assert!(matches!(
            result,
            Err(SubmitError::Decode(DecodeError::UnknownEventType(_)))
        ));

        let result =
            tracker.submit_json(r#"{"type":"HamsterEnter","hamsterId":"","wheelId":"w1"}"#);
        assert!(matches!(result, Err(SubmitError::Validation(_))));

        // Rejected submissions never reach the state
        assert_eq!(tracker.snapshot().hamsters.len(), 1);
    }

    #[test]
    fn test_submit_rejects_blank_ids_without_side_effects() {
        let (tracker, _recorder) = tracker_with_recorder();

        let result = tracker.submit(&spin(" ", 10000));

        assert_eq!(
            result,
            Err(ValidationError::EmptyIdentifier { field: "wheelId" })
        );
        assert!(tracker.snapshot().sensors.is_empty());
    }

    #[test]
    fn test_monitor_counts_outcomes() {
        let (tracker, _recorder) = tracker_with_recorder();

        tracker.apply_event(&enter("h1", "w1"));
        tracker.apply_event(&enter("h1", "w1"));
        tracker.apply_event(&spin("w1", 100));

        let metrics = tracker.monitor().collect_metrics();
        assert_eq!(metrics.events_applied, 1);
        assert_eq!(metrics.events_ignored, 2);
    }

    #[test]
    fn test_concurrent_spins_lose_no_rounds() {
        let (tracker, _recorder) = tracker_with_recorder();
        let tracker = Arc::new(tracker);
        tracker.apply_event(&enter("h1", "w1"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..200 {
                        // 1, 2 or 3 rounds depending on the thread
                        tracker.apply_event(&spin("w1", 5000 * (i % 3 + 1)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let expected: u64 = (0..8).map(|i| 200 * (i % 3 + 1) as u64).sum();
        assert_eq!(tracker.snapshot().rounds_for("h1"), expected);
    }

    #[test]
    fn test_snapshots_stay_consistent_under_concurrent_writers() {
        let (tracker, _recorder) = tracker_with_recorder();
        let tracker = Arc::new(tracker);

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    let hamster = format!("h{}", i);
                    for n in 0..300 {
                        let wheel = format!("w{}", n % 3);
                        tracker.apply_event(&enter(&hamster, &wheel));
                        tracker.apply_event(&spin(&wheel, 5000));
                        tracker.apply_event(&exit(&hamster, &wheel));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            assert!(tracker.snapshot().is_consistent());
        }

        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = tracker.snapshot();
        assert!(snapshot.is_consistent());
        assert!(snapshot.occupancy.is_empty());
    }
}
