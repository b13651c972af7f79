//! Impact, flat tyre, and detached wheel detection

use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

use super::EventDetector;
use crate::config::DamageThresholds;
use crate::types::{EventType, Snapshot, TelemetryEvent, VehicleTelemetry, WheelPosition};

/// Impact severity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactSeverity {
    Minor,
    Moderate,
    Serious,
}

impl ImpactSeverity {
    /// Bucket a magnitude; thresholds are lower bounds of each bucket
    pub fn classify(magnitude: f64, thresholds: &DamageThresholds) -> Self {
        if magnitude >= thresholds.serious_threshold {
            ImpactSeverity::Serious
        } else if magnitude >= thresholds.moderate_threshold {
            ImpactSeverity::Moderate
        } else {
            ImpactSeverity::Minor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImpactSeverity::Minor => "minor",
            ImpactSeverity::Moderate => "moderate",
            ImpactSeverity::Serious => "serious",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DamageState {
    last_impact_time: f64,
    flat: [bool; 4],
    detached: [bool; 4],
}

impl DamageState {
    fn observe(vehicle: &VehicleTelemetry) -> Self {
        let mut state = Self { last_impact_time: vehicle.last_impact_time, ..Self::default() };
        for (i, wheel) in vehicle.wheels.iter().take(4).enumerate() {
            state.flat[i] = wheel.flat;
            state.detached[i] = wheel.detached;
        }
        state
    }
}

/// Emits `damage` for each new impact, plus `flat_tire` and
/// `wheel_detached` when a wheel newly enters that condition.
///
/// An impact is new when its timestamp differs from the last reported one
/// and its magnitude is positive.
#[derive(Debug, Default)]
pub struct DamageDetector {
    thresholds: DamageThresholds,
    vehicles: HashMap<i32, DamageState>,
}

impl DamageDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: DamageThresholds) -> Self {
        Self { thresholds, vehicles: HashMap::new() }
    }

    fn event(
        snapshot: &Snapshot,
        vehicle_id: i32,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> TelemetryEvent {
        TelemetryEvent::new(
            snapshot.session_id.clone(),
            vehicle_id,
            snapshot.timestamp,
            event_type,
            payload,
        )
    }
}

impl EventDetector for DamageDetector {
    fn name(&self) -> &'static str {
        "damage"
    }

    fn detect(&mut self, snapshot: &Snapshot) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();

        for vehicle in &snapshot.all_vehicles {
            let id = vehicle.vehicle_id;
            let Some(previous) = self.vehicles.get_mut(&id) else {
                self.vehicles.insert(id, DamageState::observe(vehicle));
                continue;
            };

            let magnitude = vehicle.last_impact_magnitude;
            if vehicle.last_impact_time != previous.last_impact_time && magnitude > 0.0 {
                let severity = ImpactSeverity::classify(magnitude, &self.thresholds);
                let mut payload = json!({
                    "severity": severity.as_str(),
                    "magnitude": magnitude,
                    "impact_time": vehicle.last_impact_time,
                });
                if let Some(dents) = vehicle.dent_severity.as_ref().filter(|d| !d.is_empty()) {
                    payload["dent_severity"] = json!(dents);
                }
                events.push(Self::event(snapshot, id, EventType::Damage, payload));
                previous.last_impact_time = vehicle.last_impact_time;
            }

            for (i, wheel) in vehicle.wheels.iter().take(4).enumerate() {
                let label = WheelPosition::ALL[i].label();

                if wheel.flat && !previous.flat[i] {
                    let payload = json!({ "wheel": label, "vehicle_id": id });
                    events.push(Self::event(snapshot, id, EventType::FlatTire, payload));
                }
                previous.flat[i] = wheel.flat;

                if wheel.detached && !previous.detached[i] {
                    let payload = json!({ "wheel": label, "vehicle_id": id });
                    events.push(Self::event(snapshot, id, EventType::WheelDetached, payload));
                }
                previous.detached[i] = wheel.detached;
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SnapshotBuilder;
    use proptest::prelude::*;

    fn impact(magnitude: f64, time: f64) -> Snapshot {
        SnapshotBuilder::new("s1").impact(0, magnitude, time).build()
    }

    #[test]
    fn severity_buckets() {
        let thresholds = DamageThresholds::default();
        assert_eq!(ImpactSeverity::classify(99.9, &thresholds), ImpactSeverity::Minor);
        assert_eq!(ImpactSeverity::classify(100.0, &thresholds), ImpactSeverity::Moderate);
        assert_eq!(ImpactSeverity::classify(999.0, &thresholds), ImpactSeverity::Moderate);
        assert_eq!(ImpactSeverity::classify(1000.0, &thresholds), ImpactSeverity::Serious);
    }

    #[test]
    fn new_impact_is_reported_once() {
        let mut detector = DamageDetector::new();
        detector.detect(&impact(0.0, 0.0));

        let events = detector.detect(&impact(450.0, 12.25));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Damage);
        assert_eq!(events[0].payload_str("severity"), Some("moderate"));
        assert_eq!(events[0].payload_f64("magnitude"), Some(450.0));
        assert_eq!(events[0].payload_f64("impact_time"), Some(12.25));
        assert!(events[0].payload.get("dent_severity").is_none());

        assert!(detector.detect(&impact(450.0, 12.25)).is_empty());
    }

    #[test]
    fn dent_severity_is_included_when_present() {
        let mut detector = DamageDetector::new();
        detector.detect(&impact(0.0, 0.0));

        let snapshot =
            SnapshotBuilder::new("s1").impact(0, 1500.0, 3.0).dents(0, vec![0, 1, 2, 0]).build();
        let events = detector.detect(&snapshot);

        assert_eq!(events[0].payload_str("severity"), Some("serious"));
        assert_eq!(events[0].payload["dent_severity"], json!([0, 1, 2, 0]));
    }

    #[test]
    fn zero_magnitude_is_ignored_until_reported() {
        let mut detector = DamageDetector::new();
        detector.detect(&impact(0.0, 0.0));

        assert!(detector.detect(&impact(0.0, 5.0)).is_empty());
        // Time was not recorded, so a positive magnitude at the same time fires
        assert_eq!(detector.detect(&impact(50.0, 5.0)).len(), 1);
    }

    #[test]
    fn custom_thresholds_apply() {
        let thresholds = DamageThresholds { moderate_threshold: 10.0, serious_threshold: 20.0 };
        let mut detector = DamageDetector::with_thresholds(thresholds);
        detector.detect(&impact(0.0, 0.0));
        let events = detector.detect(&impact(25.0, 1.0));
        assert_eq!(events[0].payload_str("severity"), Some("serious"));
    }

    #[test]
    fn flat_and_detached_fire_on_transition_only() {
        let mut detector = DamageDetector::new();
        detector.detect(&SnapshotBuilder::new("s1").vehicle(0).build());

        let damaged = SnapshotBuilder::new("s1")
            .flat(0, WheelPosition::FrontLeft)
            .flat(0, WheelPosition::RearRight)
            .detached(0, WheelPosition::FrontRight)
            .build();
        let events = detector.detect(&damaged);

        let flats: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::FlatTire)
            .filter_map(|e| e.payload_str("wheel"))
            .collect();
        assert_eq!(flats, vec!["FL", "RR"]);

        let detached: Vec<_> =
            events.iter().filter(|e| e.event_type == EventType::WheelDetached).collect();
        assert_eq!(detached.len(), 1);
        assert_eq!(detached[0].payload_str("wheel"), Some("FR"));
        assert_eq!(detached[0].payload_i64("vehicle_id"), Some(0));

        assert!(detector.detect(&damaged).is_empty());
    }

    #[test]
    fn repaired_wheel_can_fail_again() {
        let mut detector = DamageDetector::new();
        let flat = SnapshotBuilder::new("s1").flat(0, WheelPosition::RearLeft).build();
        let repaired = SnapshotBuilder::new("s1").vehicle(0).build();

        detector.detect(&repaired);
        assert_eq!(detector.detect(&flat).len(), 1);
        assert!(detector.detect(&repaired).is_empty());
        assert_eq!(detector.detect(&flat).len(), 1);
    }

    #[test]
    fn missing_wheels_are_no_change() {
        let mut detector = DamageDetector::new();
        detector.detect(&SnapshotBuilder::new("s1").no_wheels(0).build());
        assert!(detector.detect(&SnapshotBuilder::new("s1").no_wheels(0).build()).is_empty());

        // Wheels appearing already flat are a transition from the default state
        let flat = SnapshotBuilder::new("s1").flat(0, WheelPosition::FrontLeft).build();
        let events = detector.detect(&flat);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn combined_transition_yields_multiple_events() {
        let mut detector = DamageDetector::new();
        detector.detect(&SnapshotBuilder::new("s1").vehicle(0).build());

        let snapshot = SnapshotBuilder::new("s1")
            .impact(0, 80.0, 2.0)
            .flat(0, WheelPosition::FrontLeft)
            .detached(0, WheelPosition::FrontLeft)
            .build();
        let types: Vec<_> = detector.detect(&snapshot).into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Damage, EventType::FlatTire, EventType::WheelDetached]);
    }

    proptest! {
        #[test]
        fn at_most_one_event_per_impact_time(times in prop::collection::vec(0u8..6, 1..50)) {
            let mut detector = DamageDetector::new();
            detector.detect(&impact(0.0, 0.0));

            let mut last = 0.0;
            let mut expected = 0;
            let mut emitted = 0;
            for t in times {
                let time = f64::from(t);
                if time != last {
                    expected += 1;
                    last = time;
                }
                emitted += detector.detect(&impact(300.0, time)).len();
            }
            prop_assert_eq!(emitted, expected);
        }
    }
}
