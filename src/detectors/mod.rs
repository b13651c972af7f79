//! Event detectors
//!
//! Each detector is a small state machine keyed by vehicle id. It compares
//! the incoming [`Snapshot`] against the values it saw last and emits zero or
//! more [`TelemetryEvent`]s. Missing data (no scoring block, empty wheel
//! list, absent dent array) is treated as "no change".
//!
//! Detectors take `&mut self`; a single instance is meant to be driven by
//! one task in snapshot order.

mod damage;
mod flag;
mod lap;
mod pit;

pub use damage::{DamageDetector, ImpactSeverity};
pub use flag::FlagChangeDetector;
pub use lap::LapTransitionDetector;
pub use pit::PitStopDetector;

use tracing::trace;

use crate::config::DamageThresholds;
use crate::types::{Snapshot, TelemetryEvent};

/// Stateful snapshot-to-event transformer
pub trait EventDetector: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Compare `snapshot` with the previously seen state and return any
    /// events. The first observation of a vehicle only records a baseline.
    fn detect(&mut self, snapshot: &Snapshot) -> Vec<TelemetryEvent>;
}

/// All detectors run in a fixed order over each snapshot
pub struct DetectorSet {
    detectors: Vec<Box<dyn EventDetector>>,
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::new(DamageThresholds::default())
    }
}

impl DetectorSet {
    /// Lap, pit, damage, and flag detectors
    pub fn new(damage: DamageThresholds) -> Self {
        Self {
            detectors: vec![
                Box::new(LapTransitionDetector::new()),
                Box::new(PitStopDetector::new()),
                Box::new(DamageDetector::with_thresholds(damage)),
                Box::new(FlagChangeDetector::new()),
            ],
        }
    }

    /// Append a custom detector; it runs after the built-in ones
    pub fn with_detector(mut self, detector: impl EventDetector + 'static) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector over the snapshot, concatenating their events
    pub fn detect(&mut self, snapshot: &Snapshot) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();
        for detector in &mut self.detectors {
            let found = detector.detect(snapshot);
            if !found.is_empty() {
                trace!(detector = detector.name(), count = found.len(), "Events detected");
            }
            events.extend(found);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SnapshotBuilder;
    use crate::types::{EventType, PitState};

    #[test]
    fn set_runs_all_detectors_in_order() {
        let mut set = DetectorSet::default();
        assert_eq!(set.len(), 4);

        let baseline = SnapshotBuilder::new("s1").lap(0, 1).sector_flags([0, 0, 0]).build();
        assert!(set.detect(&baseline).is_empty());

        let next = SnapshotBuilder::new("s1")
            .lap(0, 2)
            .pit(0, PitState::ENTERING)
            .impact(0, 250.0, 31.5)
            .sector_flags([0, 1, 0])
            .build();
        let types: Vec<_> = set.detect(&next).into_iter().map(|e| e.event_type).collect();

        assert_eq!(
            types,
            vec![EventType::LapComplete, EventType::PitEntry, EventType::Damage, EventType::FlagChange]
        );
    }

    struct CountingDetector(usize);

    impl EventDetector for CountingDetector {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn detect(&mut self, _snapshot: &Snapshot) -> Vec<TelemetryEvent> {
            self.0 += 1;
            Vec::new()
        }
    }

    #[test]
    fn custom_detectors_are_invoked() {
        let mut set = DetectorSet::default().with_detector(CountingDetector(0));
        assert_eq!(set.len(), 5);
        set.detect(&SnapshotBuilder::new("s1").vehicle(0).build());
        assert!(!set.is_empty());
    }
}
