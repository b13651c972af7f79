//! Test utilities: snapshot fixtures and a scriptable telemetry source
//!
//! Shared by unit tests and the benchmark harness.

#![cfg(any(test, feature = "benchmark"))]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::source::TelemetrySource;
use crate::types::{
    PitState, ScoringInfo, SessionMetadata, Snapshot, VehicleScoring, VehicleTelemetry,
    WheelPosition,
};
use crate::{Result, TelemetryError};

/// Fixed base instant so fixtures are reproducible
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 14, 14, 0, 0).single().unwrap_or_default()
}

/// Snapshot with one player vehicle (id 0) on lap 1, 50 L of fuel, and
/// session metadata for a 7 km circuit.
pub fn snapshot_with_player(session_id: &str) -> Snapshot {
    SnapshotBuilder::new(session_id).vehicle(0).build()
}

/// Fluent builder for snapshots used in detector and writer tests.
///
/// Every vehicle touched through the builder gets both a telemetry record
/// and a scoring entry. Vehicle 0 is the player.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new(session_id: &str) -> Self {
        let snapshot = Snapshot::new(session_id, fixture_time())
            .with_session(SessionMetadata {
                start_time: fixture_time(),
                session_type: "Race".to_string(),
                track_name: "Circuit de la Sarthe".to_string(),
                car_name: "Hypercar".to_string(),
                num_vehicles: 0,
                track_length: 7000.0,
            })
            .with_scoring(ScoringInfo::default());
        Self { snapshot }
    }

    /// Offset the timestamp from the fixture base
    pub fn at_millis(mut self, millis: i64) -> Self {
        self.snapshot.timestamp = fixture_time() + ChronoDuration::milliseconds(millis);
        self
    }

    /// Ensure a vehicle exists (lap 1, 50 L fuel)
    pub fn vehicle(mut self, vehicle_id: i32) -> Self {
        self.ensure(vehicle_id);
        self
    }

    pub fn lap(mut self, vehicle_id: i32, lap_number: i32) -> Self {
        self.scoring_mut(vehicle_id).lap_number = lap_number;
        self
    }

    pub fn lap_times(mut self, vehicle_id: i32, last: f64, best: f64) -> Self {
        let scoring = self.scoring_mut(vehicle_id);
        scoring.last_lap_time = last;
        scoring.best_lap_time = best;
        self
    }

    pub fn pit(mut self, vehicle_id: i32, state: PitState) -> Self {
        self.scoring_mut(vehicle_id).pit_state = state;
        self
    }

    pub fn vehicle_flag(mut self, vehicle_id: i32, flag: i32) -> Self {
        self.scoring_mut(vehicle_id).flag = flag;
        self
    }

    pub fn fuel(mut self, vehicle_id: i32, liters: f64) -> Self {
        self.vehicle_mut(vehicle_id).fuel = liters;
        self
    }

    pub fn speed(mut self, vehicle_id: i32, kph: f64) -> Self {
        self.vehicle_mut(vehicle_id).speed = kph;
        self
    }

    pub fn impact(mut self, vehicle_id: i32, magnitude: f64, time: f64) -> Self {
        let vehicle = self.vehicle_mut(vehicle_id);
        vehicle.last_impact_magnitude = magnitude;
        vehicle.last_impact_time = time;
        self
    }

    pub fn dents(mut self, vehicle_id: i32, dents: Vec<u8>) -> Self {
        self.vehicle_mut(vehicle_id).dent_severity = Some(dents);
        self
    }

    pub fn flat(mut self, vehicle_id: i32, position: WheelPosition) -> Self {
        if let Some(wheel) = self.vehicle_mut(vehicle_id).wheels.get_mut(position.index()) {
            wheel.flat = true;
        }
        self
    }

    pub fn detached(mut self, vehicle_id: i32, position: WheelPosition) -> Self {
        if let Some(wheel) = self.vehicle_mut(vehicle_id).wheels.get_mut(position.index()) {
            wheel.detached = true;
        }
        self
    }

    /// Remove all wheel records from a vehicle
    pub fn no_wheels(mut self, vehicle_id: i32) -> Self {
        self.vehicle_mut(vehicle_id).wheels.clear();
        self
    }

    pub fn sector_flags(mut self, flags: [i32; 3]) -> Self {
        self.scoring().sector_flags = flags.to_vec();
        self
    }

    pub fn yellow_flag(mut self, state: i32) -> Self {
        self.scoring().yellow_flag_state = state;
        self
    }

    pub fn build(mut self) -> Snapshot {
        // Player copy mirrors the entry in `all_vehicles`
        self.snapshot.player_vehicle =
            self.snapshot.all_vehicles.iter().find(|v| v.is_player).cloned();
        let count = self.snapshot.all_vehicles.len() as i32;
        if let Some(session) = self.snapshot.session.as_mut() {
            session.num_vehicles = count;
        }
        self.scoring().num_vehicles = count;
        self.snapshot
    }

    fn ensure(&mut self, vehicle_id: i32) {
        if self.snapshot.vehicle(vehicle_id).is_none() {
            let mut vehicle = VehicleTelemetry::new(vehicle_id);
            vehicle.fuel = 50.0;
            if vehicle_id == 0 {
                vehicle.is_player = true;
                self.snapshot = std::mem::take(&mut self.snapshot).with_player(vehicle);
            } else {
                self.snapshot = std::mem::take(&mut self.snapshot).with_vehicle(vehicle);
            }
        }

        let scoring = self.scoring();
        if !scoring.vehicles.iter().any(|v| v.vehicle_id == vehicle_id) {
            let mut entry = VehicleScoring::new(vehicle_id);
            entry.lap_number = 1;
            scoring.vehicles.push(entry);
        }
    }

    fn scoring(&mut self) -> &mut ScoringInfo {
        self.snapshot.scoring.get_or_insert_with(ScoringInfo::default)
    }

    fn scoring_mut(&mut self, vehicle_id: i32) -> &mut VehicleScoring {
        self.ensure(vehicle_id);
        let vehicles = &mut self.scoring().vehicles;
        let index = vehicles.iter().position(|v| v.vehicle_id == vehicle_id).unwrap_or(0);
        &mut vehicles[index]
    }

    fn vehicle_mut(&mut self, vehicle_id: i32) -> &mut VehicleTelemetry {
        self.ensure(vehicle_id);
        let index = self
            .snapshot
            .all_vehicles
            .iter()
            .position(|v| v.vehicle_id == vehicle_id)
            .unwrap_or(0);
        &mut self.snapshot.all_vehicles[index]
    }
}

/// What a [`ScriptedSource`] hands out
#[derive(Debug)]
enum Script {
    Repeat(Snapshot),
    Sequence(VecDeque<Snapshot>),
}

/// A [`TelemetrySource`] whose availability, responses, and failures are
/// controlled by the test.
#[derive(Debug)]
pub struct ScriptedSource {
    available: AtomicBool,
    script: Mutex<Script>,
    failures_pending: AtomicUsize,
    read_calls: AtomicUsize,
}

impl ScriptedSource {
    /// Return a clone of `snapshot` on every read
    pub fn repeating(snapshot: Snapshot) -> Self {
        Self::with_script(Script::Repeat(snapshot))
    }

    /// Return each snapshot once, in order, then `Ok(None)`
    pub fn sequence(snapshots: Vec<Snapshot>) -> Self {
        Self::with_script(Script::Sequence(snapshots.into()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            available: AtomicBool::new(true),
            script: Mutex::new(script),
            failures_pending: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `count` reads return an error
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Append snapshots to a sequence script
    pub fn push(&self, snapshot: Snapshot) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *script {
            Script::Sequence(queue) => queue.push_back(snapshot),
            Script::Repeat(current) => *current = snapshot,
        }
    }

    /// Number of times `read_snapshot` was invoked
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ScriptedSource {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn read_snapshot(&self) -> Result<Option<Snapshot>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TelemetryError::source_failed("scripted failure"));
        }

        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        Ok(match &mut *script {
            Script::Repeat(snapshot) => Some(snapshot.clone()),
            Script::Sequence(queue) => queue.pop_front(),
        })
    }
}
