//! Pipeline orchestrator: reader → detectors → writer, plus a throttled
//! snapshot stream for broadcast consumers.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::detectors::DetectorSet;
use crate::reader::{LiveReader, SnapshotStream};
use crate::source::TelemetrySource;
use crate::storage::{LapRecord, TelemetryWriter};
use crate::stream::{Throttle, ThrottleExt};
use crate::types::{HealthMetrics, Snapshot, TelemetryMode};
use crate::{PipelineConfig, Result};

/// Snapshot stream handed to broadcast consumers
pub type BroadcastStream = Throttle<BoxStream<'static, Snapshot>>;

/// Drives a [`LiveReader`] and fans each snapshot out to detection,
/// persistence, and a throttled broadcast stream.
///
/// Mode and latest snapshot are published through `watch` channels, so any
/// number of observers can read them while a stream is running.
pub struct TelemetryPipeline {
    reader: LiveReader,
    broadcast_interval: Duration,
    state: Arc<PipelineState>,
}

struct PipelineState {
    writer: Option<Arc<dyn TelemetryWriter>>,
    detectors: Mutex<DetectorSet>,
    mode: watch::Sender<TelemetryMode>,
    latest: watch::Sender<Option<Arc<Snapshot>>>,
}

impl TelemetryPipeline {
    /// Pipeline with default detectors and a 100 ms broadcast interval.
    ///
    /// Without a writer nothing is persisted; streaming is unaffected.
    pub fn new(reader: LiveReader, writer: Option<Arc<dyn TelemetryWriter>>) -> Self {
        let defaults = PipelineConfig::default();
        Self::with_parts(reader, writer, DetectorSet::default(), defaults.broadcast_interval())
    }

    /// Build the reader and detectors from a validated configuration
    pub fn from_config(
        source: Arc<dyn TelemetrySource>,
        writer: Option<Arc<dyn TelemetryWriter>>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let reader = LiveReader::from_config(source, config)?;
        let detectors = DetectorSet::new(config.damage);
        Ok(Self::with_parts(reader, writer, detectors, config.broadcast_interval()))
    }

    fn with_parts(
        reader: LiveReader,
        writer: Option<Arc<dyn TelemetryWriter>>,
        detectors: DetectorSet,
        broadcast_interval: Duration,
    ) -> Self {
        let (mode, _) = watch::channel(TelemetryMode::Idle);
        let (latest, _) = watch::channel(None);
        Self {
            reader,
            broadcast_interval,
            state: Arc::new(PipelineState {
                writer,
                detectors: Mutex::new(detectors),
                mode,
                latest,
            }),
        }
    }

    /// Replace the broadcast interval
    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Replace the detector set
    pub fn with_detectors(self, detectors: DetectorSet) -> Self {
        {
            let mut current = self.state.detectors.lock().unwrap_or_else(|e| e.into_inner());
            *current = detectors;
        }
        self
    }

    pub fn reader(&self) -> &LiveReader {
        &self.reader
    }

    pub fn broadcast_interval(&self) -> Duration {
        self.broadcast_interval
    }

    /// Reader health counters
    pub fn health_metrics(&self) -> Arc<HealthMetrics> {
        self.reader.health_metrics()
    }

    pub fn current_mode(&self) -> TelemetryMode {
        *self.state.mode.borrow()
    }

    /// Mode changes, starting with the current mode
    pub fn mode_updates(&self) -> WatchStream<TelemetryMode> {
        WatchStream::new(self.state.mode.subscribe())
    }

    /// Most recent snapshot seen by any stream
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.state.latest.borrow().clone()
    }

    /// Start reading and return the throttled broadcast stream.
    ///
    /// Every snapshot the reader produces is detected and persisted as the
    /// returned stream is polled; at most one per broadcast interval is
    /// yielded. The stream ends after `cancel` fires, at which point the
    /// writer is flushed and the mode returns to [`TelemetryMode::Idle`].
    pub fn stream_for_broadcast(&self, cancel: &CancellationToken) -> Result<BroadcastStream> {
        let snapshots = self.reader.stream(cancel)?;
        info!(
            broadcast_interval_ms = self.broadcast_interval.as_millis() as u64,
            persisting = self.state.writer.is_some(),
            "Pipeline started"
        );

        let run = PipelineRun {
            snapshots,
            state: Arc::clone(&self.state),
            session_id: None,
            processed: 0,
        };
        let processed = futures::stream::unfold(run, |mut run| async move {
            match run.snapshots.next().await {
                Some(snapshot) => {
                    run.process(&snapshot).await;
                    Some((snapshot, run))
                }
                None => {
                    run.finish().await;
                    None
                }
            }
        });

        Ok(processed.boxed().throttle(self.broadcast_interval))
    }
}

/// Per-stream processing state
struct PipelineRun {
    snapshots: SnapshotStream,
    state: Arc<PipelineState>,
    /// Session last written to storage
    session_id: Option<String>,
    processed: u64,
}

impl PipelineRun {
    async fn process(&mut self, snapshot: &Snapshot) {
        self.processed += 1;
        self.state.mode.send_if_modified(|mode| {
            let changed = *mode != TelemetryMode::Live;
            *mode = TelemetryMode::Live;
            changed
        });
        self.state.latest.send_replace(Some(Arc::new(snapshot.clone())));

        let events = {
            let mut detectors = self.state.detectors.lock().unwrap_or_else(|e| e.into_inner());
            detectors.detect(snapshot)
        };

        let new_session = self.session_id.as_deref() != Some(snapshot.session_id.as_str());
        if new_session {
            info!(session_id = %snapshot.session_id, "Session started");
        }

        let Some(writer) = self.state.writer.as_ref() else {
            if new_session {
                self.session_id = Some(snapshot.session_id.clone());
            }
            return;
        };

        if new_session {
            match writer.write_session(snapshot).await {
                Ok(()) => self.session_id = Some(snapshot.session_id.clone()),
                // Retried on the next snapshot
                Err(e) => {
                    warn!(session_id = %snapshot.session_id, error = %e, "Session write failed")
                }
            }
        }

        if let Err(e) = writer.write_sample(snapshot).await {
            error!(session_id = %snapshot.session_id, error = %e, "Sample write failed");
        }

        let track_length = snapshot.session.as_ref().map_or(0.0, |s| s.track_length);
        for event in &events {
            if let Err(e) = writer.write_event(event).await {
                error!(
                    session_id = %event.session_id,
                    vehicle_id = event.vehicle_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Event write failed"
                );
            }
            if let Some(lap) = LapRecord::from_event(event, track_length) {
                if let Err(e) = writer.write_lap(&lap).await {
                    error!(
                        vehicle_id = lap.vehicle_id,
                        lap = lap.lap_number,
                        error = %e,
                        "Lap write failed"
                    );
                }
            }
        }
    }

    async fn finish(&mut self) {
        if let Some(writer) = self.state.writer.as_ref() {
            if let Err(e) = writer.flush().await {
                error!(error = %e, pending = writer.pending_count(), "Final flush failed");
            }
        }
        self.state.mode.send_replace(TelemetryMode::Idle);
        info!(processed = self.processed, "Pipeline stopped");
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        // Covers consumers that drop the stream without draining it
        if self.state.mode.send_replace(TelemetryMode::Idle) != TelemetryMode::Idle {
            debug!(processed = self.processed, "Broadcast stream dropped while live");
        }
    }
}
