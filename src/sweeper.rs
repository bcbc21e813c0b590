use crate::config::SweeperConfig;
use crate::error::SweeperError;
use crate::events::Timestamp;
use crate::tracker::ActivityTracker;
use chrono::Utc;
use log::{debug, error, info};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Schedule and staleness thresholds for the inactivity sweeper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// Pause between two sweeps
    pub interval: Duration,
    /// Hamsters idle longer than this are reported
    pub hamster_threshold: chrono::Duration,
    /// Working sensors silent longer than this are reported
    pub sensor_threshold: chrono::Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self::from(&SweeperConfig::default())
    }
}

impl From<&SweeperConfig> for SweepSettings {
    fn from(config: &SweeperConfig) -> Self {
        Self {
            interval: config.interval(),
            hamster_threshold: config.hamster_threshold(),
            sensor_threshold: config.sensor_threshold(),
        }
    }
}

/// Background task that periodically reports inactive hamsters and sensors
///
/// Each sweep works on a tracker snapshot, so ingestion is never blocked for
/// the duration of alert delivery. A stale entity is reported again on every
/// sweep until it produces activity.
pub struct InactivitySweeper {
    tracker: Arc<ActivityTracker>,
    settings: SweepSettings,
    /// Shutdown signal for the sweep thread
    stop_sender: Option<Sender<()>>,
    /// Handle to the sweep thread
    thread_handle: Option<JoinHandle<()>>,
}

impl InactivitySweeper {
    pub fn new(tracker: Arc<ActivityTracker>, settings: SweepSettings) -> Self {
        Self {
            tracker,
            settings,
            stop_sender: None,
            thread_handle: None,
        }
    }

    /// Run a single sweep as of `now`
    ///
    /// # Returns
    ///
    /// Number of alerts raised
    pub fn sweep_once(tracker: &ActivityTracker, settings: &SweepSettings, now: Timestamp) -> usize {
        let raised =
            tracker.check_inactive(now, settings.hamster_threshold, settings.sensor_threshold);
        tracker.monitor().record_sweep();

        if raised > 0 {
            info!("Inactivity sweep raised {} alerts", raised);
        } else {
            debug!("Inactivity sweep found nothing stale");
        }

        raised
    }

    /// Start sweeping in a background thread
    ///
    /// Calling `start` on a running sweeper does nothing.
    ///
    /// # Errors
    ///
    /// Returns `SweeperError::SpawnFailed` if the thread cannot be created.
    pub fn start(&mut self) -> Result<(), SweeperError> {
        if self.is_running() {
            info!("InactivitySweeper already running, skipping start");
            return Ok(());
        }

        info!(
            "Starting InactivitySweeper with interval: {:?}",
            self.settings.interval
        );

        let (stop_sender, stop_receiver) = mpsc::channel::<()>();
        let tracker = Arc::clone(&self.tracker);
        let settings = self.settings;

        let handle = thread::Builder::new()
            .name("inactivity-sweeper".to_string())
            .spawn(move || {
                info!("Inactivity sweeper thread started");

                loop {
                    match stop_receiver.recv_timeout(settings.interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            info!("Inactivity sweeper thread received shutdown signal");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            Self::sweep_once(&tracker, &settings, Utc::now());
                            tracker.monitor().collect_metrics();
                        }
                    }
                }

                info!("Inactivity sweeper thread stopped");
            })?;

        self.stop_sender = Some(stop_sender);
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop the background thread and wait for it to finish
    ///
    /// A sweep in progress completes before the thread exits. Stopping a
    /// sweeper that is not running does nothing.
    ///
    /// # Errors
    ///
    /// Returns `SweeperError::JoinFailed` if the sweep thread panicked.
    pub fn stop(&mut self) -> Result<(), SweeperError> {
        if let Some(sender) = self.stop_sender.take() {
            debug!("Signaling InactivitySweeper thread to stop");
            if sender.send(()).is_err() {
                debug!("Sweeper thread already gone");
            }
        }

        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| {
                error!("Failed to join InactivitySweeper thread");
                SweeperError::JoinFailed("inactivity-sweeper thread panicked".to_string())
            })?;
            info!("InactivitySweeper stopped successfully");
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }
}

impl Drop for InactivitySweeper {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Error stopping InactivitySweeper on drop: {}", e);
        }
    }
}
