//! Constants for interpreting simulator-defined codes
//!
//! These values come from the LMU / rFactor 2 shared memory layout. They are
//! opaque identifiers: compare them, never do arithmetic on them.

// Pit states reported per vehicle in the scoring block
pub mod pit_state {
    pub const NONE: i32 = 0;
    pub const REQUEST: i32 = 1;
    pub const ENTERING: i32 = 2;
    pub const STOPPED: i32 = 4;
    pub const EXITING: i32 = 5;
}

// Global yellow flag states (full course caution sequence)
pub mod yellow_flag {
    pub const INVALID: i32 = -1;
    pub const NONE: i32 = 0;
    pub const PENDING: i32 = 1;
    pub const PITS_CLOSED: i32 = 2;
    pub const PIT_LEAD_LAP: i32 = 3;
    pub const PITS_OPEN: i32 = 4;
    pub const LAST_LAP: i32 = 5;
    pub const RESUME: i32 = 6;
    pub const RACE_HALT: i32 = 7;
}

// Impact magnitude thresholds for damage severity buckets
pub mod impact {
    pub const MODERATE_THRESHOLD: f64 = 100.0;
    pub const SERIOUS_THRESHOLD: f64 = 1000.0;
}
