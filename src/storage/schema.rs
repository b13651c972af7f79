//! Table definitions
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision so they
//! sort lexically.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

pub(crate) const SESSIONS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        session_id   TEXT PRIMARY KEY,
        start_time   TEXT NOT NULL,
        track_name   TEXT NOT NULL,
        session_type TEXT NOT NULL,
        num_vehicles INTEGER NOT NULL,
        track_length REAL NOT NULL
    )";

pub(crate) const LAPS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS laps (
        session_id    TEXT NOT NULL,
        vehicle_id    INTEGER NOT NULL,
        lap_number    INTEGER NOT NULL,
        lap_time      REAL,
        sector1_time  REAL,
        sector2_time  REAL,
        sector3_time  REAL,
        best_lap_time REAL,
        fuel_at_start REAL,
        fuel_at_end   REAL,
        avg_speed     REAL,
        PRIMARY KEY (session_id, vehicle_id, lap_number)
    )";

pub(crate) const SAMPLES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS telemetry_samples (
        session_id   TEXT NOT NULL,
        vehicle_id   INTEGER NOT NULL,
        timestamp    TEXT NOT NULL,
        elapsed_time REAL,
        pos_x REAL, pos_y REAL, pos_z REAL,
        speed REAL, local_vel_x REAL, local_vel_y REAL, local_vel_z REAL,
        local_accel_x REAL, local_accel_y REAL, local_accel_z REAL,
        rpm REAL, gear INTEGER, throttle REAL, brake REAL, steering REAL,
        fuel REAL, turbo_boost REAL,
        fl_temp_inner REAL, fl_temp_mid REAL, fl_temp_outer REAL,
        fr_temp_inner REAL, fr_temp_mid REAL, fr_temp_outer REAL,
        rl_temp_inner REAL, rl_temp_mid REAL, rl_temp_outer REAL,
        rr_temp_inner REAL, rr_temp_mid REAL, rr_temp_outer REAL,
        fl_wear REAL, fr_wear REAL, rl_wear REAL, rr_wear REAL,
        fl_pressure REAL, fr_pressure REAL, rl_pressure REAL, rr_pressure REAL,
        fl_brake_temp REAL, fr_brake_temp REAL, rl_brake_temp REAL, rr_brake_temp REAL,
        fl_susp_deflection REAL, fr_susp_deflection REAL,
        rl_susp_deflection REAL, rr_susp_deflection REAL,
        PRIMARY KEY (session_id, vehicle_id, timestamp)
    )";

pub(crate) const EVENTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS events (
        session_id TEXT NOT NULL,
        vehicle_id INTEGER NOT NULL,
        timestamp  TEXT NOT NULL,
        event_type TEXT NOT NULL,
        event_data TEXT NOT NULL,
        PRIMARY KEY (session_id, vehicle_id, timestamp, event_type)
    )";

/// Tables in creation order
pub const TABLES: [&str; 4] = ["sessions", "laps", "telemetry_samples", "events"];

/// Create all tables; safe to run any number of times.
pub(crate) fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    for ddl in [SESSIONS_TABLE, LAPS_TABLE, SAMPLES_TABLE, EVENTS_TABLE] {
        conn.execute(ddl, [])?;
    }
    Ok(())
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text).ok().map(|ts| ts.with_timezone(&Utc))
}
