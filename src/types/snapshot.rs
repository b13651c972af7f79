//! Snapshot model: one simulation tick across all vehicles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PitState;

/// Full telemetry state for one simulation tick.
///
/// Built once per read and never mutated after it leaves the stage that
/// produced it. [`Snapshot::all_vehicles`] contains the player vehicle whenever
/// [`Snapshot::player_vehicle`] is set; use [`Snapshot::with_player`] to keep
/// both in step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Capture time (UTC)
    pub timestamp: DateTime<Utc>,

    /// Session identifier, stable for the session's lifetime
    pub session_id: String,

    /// Static session metadata
    pub session: Option<SessionMetadata>,

    /// Player vehicle telemetry, if the player is in a car
    pub player_vehicle: Option<VehicleTelemetry>,

    /// Every vehicle with telemetry, player included
    pub all_vehicles: Vec<VehicleTelemetry>,

    /// Timing, positions and flags
    pub scoring: Option<ScoringInfo>,
}

impl Snapshot {
    /// Create an empty snapshot for a session at the given instant.
    pub fn new(session_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, session_id: session_id.into(), ..Self::default() }
    }

    /// Set the player vehicle, inserting it into `all_vehicles` (replacing any
    /// entry with the same id).
    pub fn with_player(mut self, vehicle: VehicleTelemetry) -> Self {
        self.all_vehicles.retain(|v| v.vehicle_id != vehicle.vehicle_id);
        self.all_vehicles.insert(0, vehicle.clone());
        self.player_vehicle = Some(vehicle);
        self
    }

    /// Add a non-player vehicle.
    pub fn with_vehicle(mut self, vehicle: VehicleTelemetry) -> Self {
        self.all_vehicles.push(vehicle);
        self
    }

    pub fn with_session(mut self, session: SessionMetadata) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringInfo) -> Self {
        self.scoring = Some(scoring);
        self
    }

    /// Look up telemetry for a vehicle id.
    pub fn vehicle(&self, vehicle_id: i32) -> Option<&VehicleTelemetry> {
        self.all_vehicles
            .iter()
            .find(|v| v.vehicle_id == vehicle_id)
            .or_else(|| self.player_vehicle.as_ref().filter(|p| p.vehicle_id == vehicle_id))
    }

    /// Scoring rows, empty when the scoring block is missing.
    pub fn scoring_vehicles(&self) -> &[VehicleScoring] {
        self.scoring.as_ref().map(|s| s.vehicles.as_slice()).unwrap_or(&[])
    }
}

/// Session metadata (static for the session)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub start_time: DateTime<Utc>,
    pub session_type: String,
    pub track_name: String,
    pub car_name: String,
    pub num_vehicles: i32,
    /// Track length in meters
    pub track_length: f64,
}

/// Per-vehicle physics, inputs and damage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub vehicle_id: i32,
    pub is_player: bool,
    pub elapsed_time: f64,

    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,

    /// Speed in km/h
    pub speed: f64,
    pub local_vel_x: f64,
    pub local_vel_y: f64,
    pub local_vel_z: f64,

    pub rpm: f64,
    pub gear: i32,
    pub throttle: f64,
    pub brake: f64,
    pub steering: f64,
    /// Fuel in liters
    pub fuel: f64,

    /// Per-zone dent severity, when the simulator reports it
    pub dent_severity: Option<Vec<u8>>,
    pub last_impact_magnitude: f64,
    pub last_impact_time: f64,

    /// Wheels in [`WheelPosition`] order; may be shorter than four on partial data
    pub wheels: Vec<Wheel>,
}

impl Default for VehicleTelemetry {
    fn default() -> Self {
        Self {
            vehicle_id: 0,
            is_player: false,
            elapsed_time: 0.0,
            pos_x: 0.0,
            pos_y: 0.0,
            pos_z: 0.0,
            speed: 0.0,
            local_vel_x: 0.0,
            local_vel_y: 0.0,
            local_vel_z: 0.0,
            rpm: 0.0,
            gear: 0,
            throttle: 0.0,
            brake: 0.0,
            steering: 0.0,
            fuel: 0.0,
            dent_severity: None,
            last_impact_magnitude: 0.0,
            last_impact_time: 0.0,
            wheels: vec![Wheel::default(); WheelPosition::ALL.len()],
        }
    }
}

impl VehicleTelemetry {
    pub fn new(vehicle_id: i32) -> Self {
        Self { vehicle_id, ..Self::default() }
    }

    /// Wheel at a position, if present.
    pub fn wheel(&self, position: WheelPosition) -> Option<&Wheel> {
        self.wheels.get(position.index())
    }
}

/// Tyre, brake and suspension state for one corner
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wheel {
    pub temp_inner: f64,
    pub temp_mid: f64,
    pub temp_outer: f64,
    pub wear: f64,
    pub pressure: f64,
    pub flat: bool,
    pub detached: bool,
    pub brake_temp: f64,
    pub susp_deflection: f64,
}

/// Corner of the car, in storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelPosition {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelPosition {
    pub const ALL: [WheelPosition; 4] = [
        WheelPosition::FrontLeft,
        WheelPosition::FrontRight,
        WheelPosition::RearLeft,
        WheelPosition::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            WheelPosition::FrontLeft => 0,
            WheelPosition::FrontRight => 1,
            WheelPosition::RearLeft => 2,
            WheelPosition::RearRight => 3,
        }
    }

    /// Short label used in event payloads
    pub fn label(self) -> &'static str {
        match self {
            WheelPosition::FrontLeft => "FL",
            WheelPosition::FrontRight => "FR",
            WheelPosition::RearLeft => "RL",
            WheelPosition::RearRight => "RR",
        }
    }
}

/// Scoring block: flags and per-vehicle timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringInfo {
    pub session_type: i32,
    pub num_vehicles: i32,

    /// Sector flag states, one per sector
    pub sector_flags: Vec<i32>,
    pub yellow_flag_state: i32,

    pub wind_speed: f64,
    pub wind_direction: f64,

    pub vehicles: Vec<VehicleScoring>,
}

impl Default for ScoringInfo {
    fn default() -> Self {
        Self {
            session_type: 0,
            num_vehicles: 0,
            sector_flags: vec![0; 3],
            yellow_flag_state: 0,
            wind_speed: 0.0,
            wind_direction: 0.0,
            vehicles: Vec::new(),
        }
    }
}

/// Per-vehicle timing and scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleScoring {
    pub vehicle_id: i32,
    pub driver_name: String,
    pub vehicle_class: String,

    pub lap_number: i32,
    pub best_lap_time: f64,
    pub last_lap_time: f64,
    pub current_lap_time: f64,

    pub place: i32,
    pub lap_distance: f64,
    pub time_behind_leader: f64,
    pub time_behind_next: f64,

    pub flag: i32,
    pub pit_state: PitState,
}

impl VehicleScoring {
    pub fn new(vehicle_id: i32) -> Self {
        Self { vehicle_id, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_player_keeps_vehicle_list_in_step() {
        let mut player = VehicleTelemetry::new(0);
        player.is_player = true;
        let snapshot = Snapshot::new("s1", Utc::now())
            .with_vehicle(VehicleTelemetry::new(7))
            .with_player(player.clone());

        assert_eq!(snapshot.player_vehicle.as_ref(), Some(&player));
        assert_eq!(snapshot.all_vehicles.len(), 2);
        assert_eq!(snapshot.all_vehicles[0].vehicle_id, 0);
        assert!(snapshot.vehicle(7).is_some());
    }

    #[test]
    fn with_player_replaces_existing_entry() {
        let mut stale = VehicleTelemetry::new(0);
        stale.fuel = 10.0;
        let mut fresh = VehicleTelemetry::new(0);
        fresh.fuel = 20.0;

        let snapshot = Snapshot::new("s1", Utc::now()).with_player(stale).with_player(fresh);

        assert_eq!(snapshot.all_vehicles.len(), 1);
        assert_eq!(snapshot.all_vehicles[0].fuel, 20.0);
    }

    #[test]
    fn missing_blocks_read_as_empty() {
        let snapshot = Snapshot::new("s1", Utc::now());
        assert!(snapshot.scoring_vehicles().is_empty());
        assert!(snapshot.vehicle(0).is_none());

        let vehicle = VehicleTelemetry { wheels: Vec::new(), ..VehicleTelemetry::new(3) };
        assert!(vehicle.wheel(WheelPosition::RearRight).is_none());
    }
}
