//! Core types for live telemetry.
//!
//! This module provides the data structures that flow through the pipeline:
//! - [`Snapshot`] is one simulation tick across all vehicles (physics, scoring, session)
//! - [`TelemetryEvent`] is a discrete race event produced by a detector
//! - [`PitState`] wraps the simulator's opaque pit state code
//! - [`HealthMetrics`] exposes lock-free reader counters and gauges
//! - [`TelemetryMode`] is the pipeline's observable operating mode
//!
//! ## Usage Example
//!
//! ```rust
//! use chrono::Utc;
//! use pitwall_live::types::{Snapshot, VehicleTelemetry, WheelPosition};
//!
//! let mut player = VehicleTelemetry::new(0);
//! player.is_player = true;
//! player.fuel = 36.0;
//!
//! let snapshot = Snapshot::new("lmu_session", Utc::now()).with_player(player);
//!
//! assert_eq!(snapshot.all_vehicles.len(), 1);
//! let front_left = snapshot.all_vehicles[0].wheel(WheelPosition::FrontLeft).unwrap();
//! assert!(!front_left.flat);
//! ```

mod event;
mod health;
pub mod lmu_codes;
mod mode;
mod pit_state;
mod snapshot;

pub use event::{EventType, TelemetryEvent};
pub use health::HealthMetrics;
pub use mode::TelemetryMode;
pub use pit_state::PitState;
pub use snapshot::{
    ScoringInfo, SessionMetadata, Snapshot, VehicleScoring, VehicleTelemetry, Wheel,
    WheelPosition,
};
