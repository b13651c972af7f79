//! Shared memory telemetry source
//!
//! Bridges a [`SharedMemoryReader`] (the process-level reader that maps the
//! simulator's shared memory) to [`TelemetrySource`]. Each read converts the
//! flat [`RawSample`] into a full [`Snapshot`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace};

use crate::Result;
use crate::source::TelemetrySource;
use crate::types::{
    PitState, ScoringInfo, SessionMetadata, Snapshot, VehicleScoring, VehicleTelemetry, Wheel,
};

/// Process-level access to the simulator's shared memory.
///
/// Implemented outside this crate by the platform reader.
pub trait SharedMemoryReader: Send + Sync + 'static {
    /// Whether the shared memory block is mapped and the simulator is live
    fn is_connected(&self) -> bool;

    /// Most recent sample, if one has been captured
    fn latest_sample(&self) -> Option<RawSample>;
}

/// Flat sample as captured from shared memory (player-centric)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,

    pub speed_kph: f64,
    pub fuel_liters: f64,
    pub brake: f64,
    pub throttle: f64,
    pub steering: f64,
    pub rpm: f64,
    pub gear: i32,
    pub elapsed_time: f64,

    /// World X position
    pub latitude: f64,
    pub pos_y: f64,
    /// World Z position
    pub longitude: f64,

    /// Mid-tread temperature per wheel (FL, FR, RL, RR)
    pub tyre_temps_c: Option<Vec<f64>>,
    pub tyre_wear: Option<Vec<f64>>,
    pub tyre_pressure: Option<Vec<f64>>,
    pub tyre_flat: Option<Vec<bool>>,
    pub wheel_detached: Option<Vec<bool>>,
    pub brake_temps_c: Option<Vec<f64>>,
    pub susp_deflection: Option<Vec<f64>>,

    /// Base64-encoded per-zone dent severity bytes
    pub dent_severity: Option<String>,
    pub last_impact_magnitude: f64,
    pub last_impact_time: f64,

    pub track_name: Option<String>,
    pub session_type: Option<String>,
    pub vehicle_class: Option<String>,
    pub driver_name: Option<String>,
    pub track_length: f64,
    pub num_vehicles: i32,

    pub lap_number: i32,
    pub best_lap_time: f64,
    pub last_lap_time: f64,
    pub place: i32,
    pub lap_distance: f64,
    pub time_behind_leader: f64,
    pub time_behind_next: f64,
    pub flag: i32,
    pub pit_state: i32,

    pub sector_flags: Option<Vec<i32>>,
    pub yellow_flag_state: i32,

    pub other_vehicles: Vec<RawVehicle>,
}

/// Opponent data carried alongside the player sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVehicle {
    pub vehicle_id: i32,
    pub driver_name: Option<String>,
    pub vehicle_class: Option<String>,
    pub speed: f64,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub place: i32,
    pub lap_number: i32,
    pub best_lap_time: f64,
    pub last_lap_time: f64,
    pub lap_distance: f64,
    pub time_behind_leader: f64,
    pub time_behind_next: f64,
    pub flag: i32,
    pub pit_state: i32,
}

/// Player vehicle id in snapshots built from shared memory
pub const PLAYER_VEHICLE_ID: i32 = 0;

/// Telemetry source backed by shared memory
pub struct SharedMemorySource<R: SharedMemoryReader> {
    reader: Arc<R>,

    /// Session id, generated on the first successful read
    session_id: OnceLock<String>,
}

impl<R: SharedMemoryReader> SharedMemorySource<R> {
    /// Create a source over a reader; the caller keeps ownership of the
    /// reader's lifetime through the shared handle.
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader, session_id: OnceLock::new() }
    }

    /// Session id assigned to this source, once a sample has been read
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    fn session_id_or_init(&self) -> &str {
        self.session_id.get_or_init(|| {
            let id = generate_session_id(Utc::now());
            info!(session_id = %id, "Live session detected");
            id
        })
    }

    fn map_to_snapshot(&self, sample: &RawSample) -> Snapshot {
        let player = map_player_vehicle(sample);
        let mut scoring_vehicles = vec![map_player_scoring(sample)];
        let mut snapshot =
            Snapshot::new(self.session_id_or_init(), sample.timestamp).with_player(player);

        for other in &sample.other_vehicles {
            snapshot = snapshot.with_vehicle(map_other_vehicle(other));
            scoring_vehicles.push(map_other_scoring(other));
        }

        let num_vehicles = if sample.num_vehicles > 0 {
            sample.num_vehicles
        } else {
            snapshot.all_vehicles.len() as i32
        };

        snapshot
            .with_session(SessionMetadata {
                start_time: sample.timestamp,
                session_type: sample.session_type.clone().unwrap_or_default(),
                track_name: sample.track_name.clone().unwrap_or_default(),
                car_name: sample.vehicle_class.clone().unwrap_or_default(),
                num_vehicles,
                track_length: sample.track_length,
            })
            .with_scoring(ScoringInfo {
                num_vehicles,
                sector_flags: sample.sector_flags.clone().unwrap_or_else(|| vec![0; 3]),
                yellow_flag_state: sample.yellow_flag_state,
                vehicles: scoring_vehicles,
                ..ScoringInfo::default()
            })
    }
}

#[async_trait::async_trait]
impl<R: SharedMemoryReader> TelemetrySource for SharedMemorySource<R> {
    fn is_available(&self) -> bool {
        self.reader.is_connected()
    }

    async fn read_snapshot(&self) -> Result<Option<Snapshot>> {
        let Some(sample) = self.reader.latest_sample() else {
            debug!("No telemetry sample available from shared memory");
            return Ok(None);
        };

        let snapshot = self.map_to_snapshot(&sample);
        trace!(
            session_id = %snapshot.session_id,
            vehicles = snapshot.all_vehicles.len(),
            "Mapped shared memory sample"
        );
        Ok(Some(snapshot))
    }
}

/// Session id of the form `lmu_<yyyyMMdd_HHmmss>_<8 hex chars>`
fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("lmu_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

fn map_player_vehicle(sample: &RawSample) -> VehicleTelemetry {
    let mut vehicle = VehicleTelemetry {
        vehicle_id: PLAYER_VEHICLE_ID,
        is_player: true,
        speed: sample.speed_kph,
        fuel: sample.fuel_liters,
        brake: sample.brake,
        throttle: sample.throttle,
        steering: sample.steering,
        pos_x: sample.latitude,
        pos_y: sample.pos_y,
        pos_z: sample.longitude,
        elapsed_time: sample.elapsed_time,
        rpm: sample.rpm,
        gear: sample.gear,
        last_impact_magnitude: sample.last_impact_magnitude,
        last_impact_time: sample.last_impact_time,
        dent_severity: decode_dent_severity(sample.dent_severity.as_deref()),
        ..VehicleTelemetry::default()
    };

    map_wheel_arrays(&mut vehicle.wheels, sample);
    vehicle
}

fn map_player_scoring(sample: &RawSample) -> VehicleScoring {
    VehicleScoring {
        vehicle_id: PLAYER_VEHICLE_ID,
        driver_name: sample.driver_name.clone().unwrap_or_default(),
        vehicle_class: sample.vehicle_class.clone().unwrap_or_default(),
        lap_number: sample.lap_number,
        best_lap_time: sample.best_lap_time,
        last_lap_time: sample.last_lap_time,
        place: sample.place,
        lap_distance: sample.lap_distance,
        time_behind_leader: sample.time_behind_leader,
        time_behind_next: sample.time_behind_next,
        flag: sample.flag,
        pit_state: PitState::from_code(sample.pit_state),
        ..VehicleScoring::default()
    }
}

fn map_other_vehicle(other: &RawVehicle) -> VehicleTelemetry {
    VehicleTelemetry {
        vehicle_id: other.vehicle_id,
        is_player: false,
        speed: other.speed,
        pos_x: other.pos_x,
        pos_y: other.pos_y,
        pos_z: other.pos_z,
        ..VehicleTelemetry::default()
    }
}

fn map_other_scoring(other: &RawVehicle) -> VehicleScoring {
    VehicleScoring {
        vehicle_id: other.vehicle_id,
        driver_name: other.driver_name.clone().unwrap_or_default(),
        vehicle_class: other.vehicle_class.clone().unwrap_or_default(),
        lap_number: other.lap_number,
        best_lap_time: other.best_lap_time,
        last_lap_time: other.last_lap_time,
        place: other.place,
        lap_distance: other.lap_distance,
        time_behind_leader: other.time_behind_leader,
        time_behind_next: other.time_behind_next,
        flag: other.flag,
        pit_state: PitState::from_code(other.pit_state),
        ..VehicleScoring::default()
    }
}

/// Copy per-wheel arrays into the wheel records.
///
/// Tyre temperatures fill as many wheels as provided; the other arrays are
/// only applied when they cover all four wheels.
fn map_wheel_arrays(wheels: &mut [Wheel], sample: &RawSample) {
    fn at<T: Copy>(values: &Option<Vec<T>>, i: usize) -> Option<T> {
        values.as_ref().filter(|v| v.len() >= 4).and_then(|v| v.get(i).copied())
    }

    if let Some(temps) = &sample.tyre_temps_c {
        for (wheel, temp) in wheels.iter_mut().zip(temps) {
            wheel.temp_mid = *temp;
        }
    }

    for (i, wheel) in wheels.iter_mut().enumerate() {
        if let Some(wear) = at(&sample.tyre_wear, i) {
            wheel.wear = wear;
        }
        if let Some(pressure) = at(&sample.tyre_pressure, i) {
            wheel.pressure = pressure;
        }
        if let Some(flat) = at(&sample.tyre_flat, i) {
            wheel.flat = flat;
        }
        if let Some(detached) = at(&sample.wheel_detached, i) {
            wheel.detached = detached;
        }
        if let Some(temp) = at(&sample.brake_temps_c, i) {
            wheel.brake_temp = temp;
        }
        if let Some(deflection) = at(&sample.susp_deflection, i) {
            wheel.susp_deflection = deflection;
        }
    }
}

/// Decode base64 dent severity; absent or malformed input yields `None`.
fn decode_dent_severity(encoded: Option<&str>) -> Option<Vec<u8>> {
    let encoded = encoded.filter(|s| !s.is_empty())?;
    match STANDARD.decode(encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            debug!("Ignoring malformed dent severity: {}", e);
            None
        }
    }
}
