//! Opaque pit state code

use serde::{Deserialize, Serialize};

use super::lmu_codes::pit_state;

/// Simulator pit state for one vehicle.
///
/// Wraps the raw code so it can only be compared, not used in arithmetic.
/// The only semantic distinction the pipeline relies on is "on track"
/// ([`PitState::NONE`]) versus any pit phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitState(i32);

impl PitState {
    pub const NONE: PitState = PitState(pit_state::NONE);
    pub const REQUEST: PitState = PitState(pit_state::REQUEST);
    pub const ENTERING: PitState = PitState(pit_state::ENTERING);
    pub const STOPPED: PitState = PitState(pit_state::STOPPED);
    pub const EXITING: PitState = PitState(pit_state::EXITING);

    pub const fn from_code(code: i32) -> Self {
        PitState(code)
    }

    /// Raw simulator code
    pub const fn code(self) -> i32 {
        self.0
    }

    /// True for any pit phase (request, entering, stopped, exiting, or unknown non-zero codes)
    pub fn in_pit(self) -> bool {
        self != PitState::NONE
    }
}

impl From<i32> for PitState {
    fn from(code: i32) -> Self {
        PitState::from_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_none_is_on_track() {
        assert!(!PitState::NONE.in_pit());
        for state in [PitState::REQUEST, PitState::ENTERING, PitState::STOPPED, PitState::EXITING] {
            assert!(state.in_pit());
        }
        assert!(PitState::from_code(42).in_pit());
    }

    #[test]
    fn serializes_as_raw_code() {
        assert_eq!(serde_json::to_string(&PitState::STOPPED).unwrap(), "4");
        let parsed: PitState = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, PitState::ENTERING);
    }
}
