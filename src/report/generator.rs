use crate::report::DailyReport;
use crate::tracker::ActivityTracker;
use chrono::{NaiveDate, Utc};
use log::debug;
use std::sync::Arc;

/// Source of daily reports
pub trait ReportGenerator: Send + Sync {
    /// Build the report for `date` from the current tally
    fn generate_daily_report(&self, date: NaiveDate) -> DailyReport;

    /// Build the report for `date`, or for today (UTC) when none is given
    fn daily_report(&self, date: Option<NaiveDate>) -> DailyReport {
        self.generate_daily_report(date.unwrap_or_else(|| Utc::now().date_naive()))
    }
}

/// Report generator reading from a live tracker
///
/// Tallies cover the process lifetime, so the date only labels the report.
pub struct DailyReporter {
    tracker: Arc<ActivityTracker>,
    active_threshold: u64,
}

impl DailyReporter {
    pub fn new(tracker: Arc<ActivityTracker>, active_threshold: u64) -> Self {
        Self {
            tracker,
            active_threshold,
        }
    }

    pub fn active_threshold(&self) -> u64 {
        self.active_threshold
    }
}

impl ReportGenerator for DailyReporter {
    fn generate_daily_report(&self, date: NaiveDate) -> DailyReport {
        let snapshot = self.tracker.snapshot();
        let report = DailyReport::from_snapshot(&snapshot, date, self.active_threshold);
        debug!(
            "Generated report for {}: {} hamsters, {} active",
            date,
            report.hamster_stats.len(),
            report.active_count()
        );
        report
    }
}
