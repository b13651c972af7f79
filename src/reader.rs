//! Live reader: polls a source into a bounded, cancellable snapshot stream

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use crate::source::TelemetrySource;
use crate::types::{HealthMetrics, Snapshot};
use crate::{PipelineConfig, Result, TelemetryError};

/// Polls a [`TelemetrySource`] and exposes the results as a stream.
///
/// Each call to [`LiveReader::stream`] spawns one producer task that owns the
/// sending half of a bounded queue. When the queue is full the producer waits
/// for the consumer; nothing is dropped.
pub struct LiveReader {
    source: Arc<dyn TelemetrySource>,
    metrics: Arc<HealthMetrics>,
    read_interval: Duration,
    channel_capacity: usize,
}

impl LiveReader {
    /// Create a reader with the default cadence (10 ms, capacity 1000)
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            source,
            metrics: Arc::new(HealthMetrics::new(defaults.lag_threshold)),
            read_interval: defaults.read_interval(),
            channel_capacity: defaults.channel_capacity,
        }
    }

    /// Create a reader from a validated configuration
    pub fn from_config(source: Arc<dyn TelemetrySource>, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            metrics: Arc::new(HealthMetrics::new(config.lag_threshold)),
            read_interval: config.read_interval(),
            channel_capacity: config.channel_capacity,
        })
    }

    /// Health counters shared with the producer task
    pub fn health_metrics(&self) -> Arc<HealthMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn source(&self) -> &Arc<dyn TelemetrySource> {
        &self.source
    }

    /// Read a single snapshot.
    ///
    /// Returns `None` when the source is unavailable (without touching the
    /// source), when it has nothing this tick, or when the read failed. The
    /// last two count as failed reads.
    pub async fn read(&self) -> Option<Snapshot> {
        read_once(self.source.as_ref(), &self.metrics).await
    }

    /// Stream snapshots at the configured cadence until `cancel` fires.
    pub fn stream(&self, cancel: &CancellationToken) -> Result<SnapshotStream> {
        self.stream_with(cancel, self.read_interval, self.channel_capacity)
    }

    /// Stream snapshots with an explicit cadence and queue capacity.
    ///
    /// The producer stops within one read interval of cancellation, when the
    /// returned stream is dropped, or never otherwise. Every call starts an
    /// independent producer and queue.
    pub fn stream_with(
        &self,
        cancel: &CancellationToken,
        read_interval: Duration,
        capacity: usize,
    ) -> Result<SnapshotStream> {
        if capacity == 0 {
            return Err(TelemetryError::config("channel capacity must be greater than zero"));
        }
        if read_interval.is_zero() {
            return Err(TelemetryError::config("read interval must be greater than zero"));
        }

        let (tx, rx) = mpsc::channel(capacity);
        let stream_cancel = cancel.child_token();
        let generation = self.metrics.start_stream(capacity);

        let gauge = DepthGauge { metrics: Arc::clone(&self.metrics), generation };
        let producer_gauge = gauge.clone();
        let source = Arc::clone(&self.source);
        let producer_cancel = stream_cancel.clone();
        tokio::spawn(async move {
            producer_task(source, producer_gauge, tx, read_interval, producer_cancel).await;
        });

        Ok(SnapshotStream {
            rx,
            gauge,
            _guard: stream_cancel.drop_guard(),
        })
    }
}

/// Queue depth reporting for one stream generation
#[derive(Clone)]
struct DepthGauge {
    metrics: Arc<HealthMetrics>,
    generation: u64,
}

impl DepthGauge {
    fn update(&self, depth: usize) {
        self.metrics.update_queue_depth(self.generation, depth);
    }
}

/// Consumer side of a reader's bounded queue.
///
/// Dropping the stream stops its producer.
pub struct SnapshotStream {
    rx: mpsc::Receiver<Snapshot>,
    gauge: DepthGauge,
    _guard: DropGuard,
}

impl SnapshotStream {
    /// Snapshots currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Stream for SnapshotStream {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if polled.is_ready() {
            this.gauge.update(this.rx.len());
        }
        polled
    }
}

async fn read_once(source: &dyn TelemetrySource, metrics: &HealthMetrics) -> Option<Snapshot> {
    if !source.is_available() {
        debug!("Telemetry source unavailable");
        return None;
    }

    match source.read_snapshot().await {
        Ok(Some(mut snapshot)) => {
            if snapshot.session_id.is_empty() {
                snapshot.session_id = uuid::Uuid::new_v4().to_string();
            }
            metrics.record_success();
            Some(snapshot)
        }
        Ok(None) => {
            metrics.record_failure();
            debug!("Telemetry source returned no snapshot");
            None
        }
        Err(e) => {
            metrics.record_failure();
            warn!(error = %e, "Failed to read telemetry snapshot");
            None
        }
    }
}

/// Producer loop: read, enqueue (waiting for space), sleep.
async fn producer_task(
    source: Arc<dyn TelemetrySource>,
    gauge: DepthGauge,
    tx: mpsc::Sender<Snapshot>,
    read_interval: Duration,
    cancel: CancellationToken,
) {
    info!(
        interval_ms = read_interval.as_millis() as u64,
        capacity = tx.max_capacity(),
        "Live reader started"
    );
    let metrics = &gauge.metrics;
    let mut enqueued = 0u64;

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            snapshot = read_once(source.as_ref(), metrics) => snapshot,
        };

        if let Some(snapshot) = snapshot {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = tx.reserve() => permit,
            };
            let Ok(permit) = permit else {
                debug!("Snapshot consumer dropped, stopping reader");
                break;
            };

            permit.send(snapshot);
            enqueued += 1;
            gauge.update(tx.max_capacity() - tx.capacity());
            trace!(enqueued, depth = metrics.queue_depth(), "Snapshot enqueued");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(read_interval) => {}
        }
    }

    info!(
        enqueued,
        successful = metrics.successful_reads(),
        failed = metrics.failed_reads(),
        "Live reader stopped"
    );
}
