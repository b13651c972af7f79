//! Pipeline operating mode

use serde::{Deserialize, Serialize};

/// Current operating mode of the telemetry pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    /// No stream running, or no data received yet
    #[default]
    Idle,

    /// Snapshots are flowing from the live source
    Live,
}

impl TelemetryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryMode::Idle => "idle",
            TelemetryMode::Live => "live",
        }
    }
}
