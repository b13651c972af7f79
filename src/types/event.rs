//! Discrete race events produced by the detectors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of detected event, stored as its snake_case tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LapComplete,
    PitEntry,
    PitExit,
    Damage,
    FlatTire,
    WheelDetached,
    FlagChange,
}

impl EventType {
    /// Wire and storage tag
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::LapComplete => "lap_complete",
            EventType::PitEntry => "pit_entry",
            EventType::PitExit => "pit_exit",
            EventType::Damage => "damage",
            EventType::FlatTire => "flat_tire",
            EventType::WheelDetached => "wheel_detached",
            EventType::FlagChange => "flag_change",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event detected from a snapshot transition.
///
/// Global events (sector and yellow flags) use vehicle id 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub session_id: String,
    pub vehicle_id: i32,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Type-specific key/value data
    pub payload: Value,
}

impl TelemetryEvent {
    pub fn new(
        session_id: impl Into<String>,
        vehicle_id: i32,
        timestamp: DateTime<Utc>,
        event_type: EventType,
        payload: Value,
    ) -> Self {
        Self { session_id: session_id.into(), vehicle_id, timestamp, event_type, payload }
    }

    /// Payload serialized as a JSON string, as stored in the events table
    pub fn payload_json(&self) -> String {
        self.payload.to_string()
    }

    /// Integer field from the payload
    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }

    /// Float field from the payload
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    /// String field from the payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}
