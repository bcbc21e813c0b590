pub mod activity_tracker;
pub mod snapshot;
pub mod state;

pub use activity_tracker::ActivityTracker;
pub use snapshot::TrackerSnapshot;
pub use state::{
    EventOutcome, HamsterState, HamsterTally, IgnoreReason, SensorState, TrackerState,
    ROUND_DURATION_MS,
};
