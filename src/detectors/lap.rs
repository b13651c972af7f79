//! Lap transition detection

use serde_json::json;
use std::collections::HashMap;

use super::EventDetector;
use crate::types::{EventType, Snapshot, TelemetryEvent};

#[derive(Debug, Clone, Copy)]
struct LapState {
    lap_number: i32,
    /// Fuel when `lap_number` began
    fuel: f64,
}

/// Emits `lap_complete` whenever a vehicle's lap number moves forward.
///
/// A jump of several laps (reconnect) still yields one event, for the lap
/// just before the new one. A backwards move (session reset) silently
/// resets the baseline.
#[derive(Debug, Default)]
pub struct LapTransitionDetector {
    vehicles: HashMap<i32, LapState>,
}

impl LapTransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last lap number recorded for a vehicle
    pub fn lap_number(&self, vehicle_id: i32) -> Option<i32> {
        self.vehicles.get(&vehicle_id).map(|s| s.lap_number)
    }
}

impl EventDetector for LapTransitionDetector {
    fn name(&self) -> &'static str {
        "lap_transition"
    }

    fn detect(&mut self, snapshot: &Snapshot) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();

        for scoring in snapshot.scoring_vehicles() {
            let fuel = snapshot.vehicle(scoring.vehicle_id).map_or(0.0, |v| v.fuel);
            let current = LapState { lap_number: scoring.lap_number, fuel };

            let Some(previous) = self.vehicles.get_mut(&scoring.vehicle_id) else {
                self.vehicles.insert(scoring.vehicle_id, current);
                continue;
            };

            if scoring.lap_number > previous.lap_number {
                events.push(TelemetryEvent::new(
                    snapshot.session_id.clone(),
                    scoring.vehicle_id,
                    snapshot.timestamp,
                    EventType::LapComplete,
                    json!({
                        "lap_number": scoring.lap_number - 1,
                        "lap_time": scoring.last_lap_time,
                        "best_lap_time": scoring.best_lap_time,
                        "fuel_at_start": previous.fuel,
                        "fuel_at_end": fuel,
                    }),
                ));
                *previous = current;
            } else if scoring.lap_number < previous.lap_number {
                *previous = current;
            }
        }

        events
    }
}
