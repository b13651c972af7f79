//! Persistence for live telemetry
//!
//! [`TelemetryDatabase`] owns the SQLite connection and schema;
//! [`SqliteTelemetryWriter`] buffers samples into batches and writes
//! sessions, events, and laps through it.

mod database;
pub mod schema;
mod writer;

pub use database::{SessionRecord, StoredEvent, TelemetryDatabase};
pub use writer::SqliteTelemetryWriter;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::{EventType, Snapshot, TelemetryEvent};

/// Sink for everything the pipeline persists
#[async_trait::async_trait]
pub trait TelemetryWriter: Send + Sync {
    /// Insert session metadata; repeated ids are ignored
    async fn write_session(&self, snapshot: &Snapshot) -> Result<()>;

    /// Buffer one row per vehicle in the snapshot, flushing when the batch
    /// is full
    async fn write_sample(&self, snapshot: &Snapshot) -> Result<()>;

    /// Write one event immediately
    async fn write_event(&self, event: &TelemetryEvent) -> Result<()>;

    /// Insert or replace a completed lap
    async fn write_lap(&self, lap: &LapRecord) -> Result<()>;

    /// Write all buffered samples; a no-op when nothing is pending
    async fn flush(&self) -> Result<()>;

    /// Samples accepted since the last successful flush
    fn pending_count(&self) -> usize;
}

/// One row of the `laps` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub session_id: String,
    pub vehicle_id: i32,
    pub lap_number: i32,
    pub lap_time: f64,
    pub sector1_time: Option<f64>,
    pub sector2_time: Option<f64>,
    pub sector3_time: Option<f64>,
    pub best_lap_time: f64,
    pub fuel_at_start: f64,
    pub fuel_at_end: f64,
    /// km/h over the lap, when track length and lap time are known
    pub avg_speed: Option<f64>,
}

impl LapRecord {
    /// Build a lap row from a `lap_complete` event.
    ///
    /// Returns `None` for other event types or payloads without a lap number.
    pub fn from_event(event: &TelemetryEvent, track_length: f64) -> Option<Self> {
        if event.event_type != EventType::LapComplete {
            return None;
        }
        let lap_number = i32::try_from(event.payload_i64("lap_number")?).ok()?;
        let lap_time = event.payload_f64("lap_time").unwrap_or(0.0);

        Some(Self {
            session_id: event.session_id.clone(),
            vehicle_id: event.vehicle_id,
            lap_number,
            lap_time,
            sector1_time: None,
            sector2_time: None,
            sector3_time: None,
            best_lap_time: event.payload_f64("best_lap_time").unwrap_or(0.0),
            fuel_at_start: event.payload_f64("fuel_at_start").unwrap_or(0.0),
            fuel_at_end: event.payload_f64("fuel_at_end").unwrap_or(0.0),
            avg_speed: average_speed_kph(track_length, lap_time),
        })
    }

    /// Fuel burned over the lap
    pub fn fuel_used(&self) -> f64 {
        self.fuel_at_start - self.fuel_at_end
    }
}

/// Average speed in km/h for a lap of `track_length` metres
pub fn average_speed_kph(track_length: f64, lap_time: f64) -> Option<f64> {
    (track_length > 0.0 && lap_time > 0.0).then(|| track_length / lap_time * 3.6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixture_time;
    use serde_json::json;

    fn lap_event(payload: serde_json::Value) -> TelemetryEvent {
        TelemetryEvent::new("s1", 0, fixture_time(), EventType::LapComplete, payload)
    }

    #[test]
    fn lap_record_from_event() {
        let event = lap_event(json!({
            "lap_number": 3,
            "lap_time": 200.0,
            "best_lap_time": 198.5,
            "fuel_at_start": 40.0,
            "fuel_at_end": 36.5,
        }));
        let lap = LapRecord::from_event(&event, 13_626.0).unwrap();

        assert_eq!(lap.lap_number, 3);
        assert_eq!(lap.best_lap_time, 198.5);
        assert_eq!(lap.fuel_used(), 3.5);
        let avg = lap.avg_speed.unwrap();
        assert!((avg - 245.268).abs() < 1e-9);
    }

    #[test]
    fn other_events_are_not_laps() {
        let event = TelemetryEvent::new("s1", 0, fixture_time(), EventType::PitEntry, json!({}));
        assert!(LapRecord::from_event(&event, 7000.0).is_none());
        assert!(LapRecord::from_event(&lap_event(json!({})), 7000.0).is_none());
    }

    #[test]
    fn average_speed_needs_positive_inputs() {
        assert_eq!(average_speed_kph(0.0, 90.0), None);
        assert_eq!(average_speed_kph(7000.0, 0.0), None);
        let speed = average_speed_kph(1000.0, 36.0).unwrap();
        assert!((speed - 100.0).abs() < 1e-9);
    }
}
