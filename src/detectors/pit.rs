//! Pit entry and exit detection

use serde_json::json;
use std::collections::HashMap;

use super::EventDetector;
use crate::types::{EventType, PitState, Snapshot, TelemetryEvent};

/// Emits `pit_entry` on leaving the track for any pit phase and `pit_exit`
/// on returning to it. Moves between pit phases are silent.
#[derive(Debug, Default)]
pub struct PitStopDetector {
    vehicles: HashMap<i32, PitState>,
}

impl PitStopDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pit_state(&self, vehicle_id: i32) -> Option<PitState> {
        self.vehicles.get(&vehicle_id).copied()
    }
}

impl EventDetector for PitStopDetector {
    fn name(&self) -> &'static str {
        "pit_stop"
    }

    fn detect(&mut self, snapshot: &Snapshot) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();

        for scoring in snapshot.scoring_vehicles() {
            let current = scoring.pit_state;
            let Some(previous) = self.vehicles.insert(scoring.vehicle_id, current) else {
                continue;
            };

            let event = match (previous.in_pit(), current.in_pit()) {
                (false, true) => Some((
                    EventType::PitEntry,
                    json!({ "lap": scoring.lap_number, "pit_state": current.code() }),
                )),
                (true, false) => Some((
                    EventType::PitExit,
                    json!({ "lap": scoring.lap_number, "previous_pit_state": previous.code() }),
                )),
                _ => None,
            };

            if let Some((event_type, payload)) = event {
                events.push(TelemetryEvent::new(
                    snapshot.session_id.clone(),
                    scoring.vehicle_id,
                    snapshot.timestamp,
                    event_type,
                    payload,
                ));
            }
        }

        events
    }
}
