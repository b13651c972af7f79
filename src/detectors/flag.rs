//! Sector, yellow, and per-vehicle flag detection

use serde_json::json;
use std::collections::HashMap;

use super::EventDetector;
use crate::types::{EventType, Snapshot, TelemetryEvent};

/// Vehicle id used for session-wide flag events
pub const GLOBAL_VEHICLE_ID: i32 = 0;

/// Emits `flag_change` for sector flag, global yellow, and per-vehicle flag
/// changes. Sector numbers in payloads are 1-based.
#[derive(Debug, Default)]
pub struct FlagChangeDetector {
    sector_flags: Option<Vec<i32>>,
    yellow_flag: Option<i32>,
    vehicle_flags: HashMap<i32, i32>,
}

impl FlagChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventDetector for FlagChangeDetector {
    fn name(&self) -> &'static str {
        "flag_change"
    }

    fn detect(&mut self, snapshot: &Snapshot) -> Vec<TelemetryEvent> {
        let Some(scoring) = snapshot.scoring.as_ref() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        let mut emit = |vehicle_id: i32, payload: serde_json::Value| {
            events.push(TelemetryEvent::new(
                snapshot.session_id.clone(),
                vehicle_id,
                snapshot.timestamp,
                EventType::FlagChange,
                payload,
            ));
        };

        if let Some(previous) = &self.sector_flags {
            for (i, (old, new)) in previous.iter().zip(&scoring.sector_flags).enumerate() {
                if old != new {
                    emit(
                        GLOBAL_VEHICLE_ID,
                        json!({
                            "flag_type": "sector",
                            "sector": i + 1,
                            "old_state": old,
                            "new_state": new,
                        }),
                    );
                }
            }
        }
        self.sector_flags = Some(scoring.sector_flags.clone());

        let yellow = scoring.yellow_flag_state;
        if let Some(previous) = self.yellow_flag.replace(yellow).filter(|p| *p != yellow) {
            emit(
                GLOBAL_VEHICLE_ID,
                json!({ "flag_type": "yellow_flag", "old_state": previous, "new_state": yellow }),
            );
        }

        for vehicle in &scoring.vehicles {
            let id = vehicle.vehicle_id;
            if let Some(previous) = self.vehicle_flags.insert(id, vehicle.flag) {
                if previous != vehicle.flag {
                    emit(
                        id,
                        json!({
                            "flag_type": "vehicle",
                            "vehicle_id": id,
                            "old_state": previous,
                            "new_state": vehicle.flag,
                        }),
                    );
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SnapshotBuilder;
    use crate::types::lmu_codes::yellow_flag;
    use proptest::prelude::*;

    fn flags(sectors: [i32; 3], yellow: i32) -> Snapshot {
        SnapshotBuilder::new("s1").vehicle(0).sector_flags(sectors).yellow_flag(yellow).build()
    }

    #[test]
    fn first_snapshot_is_baseline() {
        let mut detector = FlagChangeDetector::new();
        assert!(detector.detect(&flags([1, 1, 1], yellow_flag::PENDING)).is_empty());
    }

    #[test]
    fn sector_change_reports_one_based_index() {
        let mut detector = FlagChangeDetector::new();
        detector.detect(&flags([0, 0, 0], yellow_flag::NONE));

        let events = detector.detect(&flags([0, 0, 1], yellow_flag::NONE));
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.vehicle_id, GLOBAL_VEHICLE_ID);
        assert_eq!(event.payload_str("flag_type"), Some("sector"));
        assert_eq!(event.payload_i64("sector"), Some(3));
        assert_eq!(event.payload_i64("old_state"), Some(0));
        assert_eq!(event.payload_i64("new_state"), Some(1));
    }

    #[test]
    fn yellow_flag_change() {
        let mut detector = FlagChangeDetector::new();
        detector.detect(&flags([0, 0, 0], yellow_flag::NONE));

        let events = detector.detect(&flags([0, 0, 0], yellow_flag::PITS_CLOSED));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload_str("flag_type"), Some("yellow_flag"));
        assert_eq!(events[0].payload_i64("new_state"), Some(i64::from(yellow_flag::PITS_CLOSED)));

        assert!(detector.detect(&flags([0, 0, 0], yellow_flag::PITS_CLOSED)).is_empty());
    }

    #[test]
    fn vehicle_flag_change_carries_vehicle_id() {
        let mut detector = FlagChangeDetector::new();
        let with_flag =
            |flag| SnapshotBuilder::new("s1").vehicle_flag(0, 0).vehicle_flag(4, flag).build();
        detector.detect(&with_flag(0));

        let events = detector.detect(&with_flag(6));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].vehicle_id, 4);
        assert_eq!(events[0].payload_str("flag_type"), Some("vehicle"));
        assert_eq!(events[0].payload_i64("vehicle_id"), Some(4));
        assert_eq!(events[0].payload_i64("new_state"), Some(6));
    }

    #[test]
    fn missing_scoring_is_no_change() {
        let mut detector = FlagChangeDetector::new();
        detector.detect(&flags([0, 0, 0], yellow_flag::NONE));

        let mut snapshot = flags([1, 1, 1], yellow_flag::RESUME);
        snapshot.scoring = None;
        assert!(detector.detect(&snapshot).is_empty());

        // Baseline untouched by the gap
        assert_eq!(detector.detect(&flags([1, 0, 0], yellow_flag::NONE)).len(), 1);
    }

    #[test]
    fn short_sector_array_compares_common_prefix() {
        let mut detector = FlagChangeDetector::new();
        detector.detect(&flags([0, 0, 0], yellow_flag::NONE));

        let mut snapshot = flags([1, 1, 1], yellow_flag::NONE);
        if let Some(scoring) = snapshot.scoring.as_mut() {
            scoring.sector_flags = vec![1];
        }
        assert_eq!(detector.detect(&snapshot).len(), 1);
    }

    proptest! {
        #[test]
        fn k_sector_changes_plus_yellow(
            before in prop::array::uniform3(0i32..3),
            after in prop::array::uniform3(0i32..3),
            yellow_before in -1i32..8,
            yellow_after in -1i32..8,
        ) {
            let mut detector = FlagChangeDetector::new();
            detector.detect(&flags(before, yellow_before));

            let k = before.iter().zip(&after).filter(|(a, b)| a != b).count();
            let yellow = usize::from(yellow_before != yellow_after);
            prop_assert_eq!(detector.detect(&flags(after, yellow_after)).len(), k + yellow);
        }
    }
}
