//! Health metrics for the streaming reader

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Lock-free health metrics for the live reader.
///
/// Mutated only by the reader's producer loop and stream consumer side; any
/// number of observers may read concurrently.
#[derive(Debug)]
pub struct HealthMetrics {
    successful_reads: AtomicU64,
    failed_reads: AtomicU64,
    queue_depth: AtomicUsize,
    capacity: AtomicUsize,
    lag_threshold_permille: AtomicUsize,
    lagging: AtomicBool,
    /// Base for the uptime clock
    created: Instant,
    /// Stream start, as nanoseconds after `created`
    started_nanos: AtomicU64,
    /// Bumped per stream; depth updates from older streams are ignored
    generation: AtomicU64,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl HealthMetrics {
    /// Create metrics that report lagging once the queue reaches
    /// `lag_threshold` (0.0..=1.0) of its capacity.
    pub fn new(lag_threshold: f64) -> Self {
        let permille = (lag_threshold.clamp(0.0, 1.0) * 1000.0) as usize;
        Self {
            successful_reads: AtomicU64::new(0),
            failed_reads: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            capacity: AtomicUsize::new(0),
            lag_threshold_permille: AtomicUsize::new(permille),
            lagging: AtomicBool::new(false),
            created: Instant::now(),
            started_nanos: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Total successful reads
    pub fn successful_reads(&self) -> u64 {
        self.successful_reads.load(Ordering::Relaxed)
    }

    /// Total failed reads (errors or empty responses)
    pub fn failed_reads(&self) -> u64 {
        self.failed_reads.load(Ordering::Relaxed)
    }

    pub fn total_reads(&self) -> u64 {
        self.successful_reads() + self.failed_reads()
    }

    /// Snapshots currently buffered in the queue
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Capacity of the active stream's queue (0 before the first stream)
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Whether the queue is at or above the lag threshold
    pub fn is_lagging(&self) -> bool {
        self.lagging.load(Ordering::Relaxed)
    }

    /// Time since the current stream started
    pub fn uptime(&self) -> Duration {
        let started = Duration::from_nanos(self.started_nanos.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(started)
    }

    /// Average successful reads per second since the current stream started
    pub fn reads_per_second(&self) -> f64 {
        let elapsed = self.uptime().as_secs_f64();
        if elapsed > 0.0 { self.successful_reads() as f64 / elapsed } else { 0.0 }
    }

    pub(crate) fn record_success(&self) {
        self.successful_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the queue depth seen by the stream started as `generation`
    pub(crate) fn update_queue_depth(&self, generation: u64, depth: usize) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        let capacity = self.capacity();
        let depth = depth.min(capacity);
        self.queue_depth.store(depth, Ordering::Relaxed);

        let threshold = self.lag_threshold_permille.load(Ordering::Relaxed);
        let lagging = capacity > 0 && depth * 1000 >= capacity * threshold;
        self.lagging.store(lagging, Ordering::Relaxed);
    }

    /// Reset gauges and the uptime clock for a new stream.
    ///
    /// Returns the stream's generation for [`update_queue_depth`](Self::update_queue_depth).
    pub(crate) fn start_stream(&self, capacity: usize) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.capacity.store(capacity, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
        self.lagging.store(false, Ordering::Relaxed);
        let offset = self.created.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.started_nanos.store(offset, Ordering::Relaxed);
        generation
    }
}
