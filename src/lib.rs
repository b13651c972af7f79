//! Live telemetry pipeline for Le Mans Ultimate.
//!
//! Pitwall Live turns the simulator's irregular stream of raw samples into an
//! ordered, observable record of a session:
//!
//! - **Reader**: polls a [`TelemetrySource`] into a bounded, cancellable
//!   snapshot stream with backpressure and health metrics
//! - **Detectors**: per-vehicle state machines for laps, pit stops, damage and flags
//! - **Storage**: batched SQLite persistence with size and timer flush triggers
//! - **Pipeline**: ties it together and throttles snapshots for broadcast clients
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use pitwall_live::{
//!     PipelineConfig, SqliteTelemetryWriter, TelemetryDatabase, TelemetryPipeline,
//!     TelemetrySource, TelemetryWriter,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(source: Arc<dyn TelemetrySource>) -> pitwall_live::Result<()> {
//!     let config = PipelineConfig::load("pitwall.yaml")?;
//!     let db = TelemetryDatabase::open("session.db")?;
//!     let writer = Arc::new(SqliteTelemetryWriter::from_config(db, &config)?);
//!
//!     let pipeline = TelemetryPipeline::from_config(
//!         source,
//!         Some(writer.clone() as Arc<dyn TelemetryWriter>),
//!         &config,
//!     )?;
//!
//!     let cancel = CancellationToken::new();
//!     let mut snapshots = pipeline.stream_for_broadcast(&cancel)?;
//!     while let Some(snapshot) = snapshots.next().await {
//!         println!("{} vehicles", snapshot.all_vehicles.len());
//!     }
//!
//!     writer.close().await
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Live streaming
pub mod reader;
pub mod source;
pub mod sources;
pub mod stream;

// Processing and persistence
pub mod detectors;
pub mod pipeline;
pub mod storage;

// Consumers
pub mod analysis;
pub mod broadcast;
pub mod logging;

// Core exports
pub use config::{DamageThresholds, PipelineConfig};
pub use error::*;
pub use types::*;

// Component exports
pub use broadcast::{BroadcastMessage, serve_live};
pub use detectors::{DetectorSet, EventDetector};
pub use pipeline::{BroadcastStream, TelemetryPipeline};
pub use reader::{LiveReader, SnapshotStream};
pub use source::TelemetrySource;
pub use sources::{RawSample, SharedMemoryReader, SharedMemorySource};
pub use storage::{LapRecord, SqliteTelemetryWriter, TelemetryDatabase, TelemetryWriter};
