//! Batched SQLite writer

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{Connection, params};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::schema::format_timestamp;
use super::{LapRecord, TelemetryDatabase, TelemetryWriter};
use crate::types::{Snapshot, TelemetryEvent, VehicleTelemetry, Wheel};
use crate::{PipelineConfig, Result, TelemetryError};

const INSERT_SESSION: &str = "
    INSERT OR IGNORE INTO sessions
        (session_id, start_time, track_name, session_type, num_vehicles, track_length)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const INSERT_EVENT: &str = "
    INSERT INTO events (session_id, vehicle_id, timestamp, event_type, event_data)
    VALUES (?1, ?2, ?3, ?4, ?5)";

const UPSERT_LAP: &str = "
    INSERT OR REPLACE INTO laps
        (session_id, vehicle_id, lap_number, lap_time, sector1_time, sector2_time,
         sector3_time, best_lap_time, fuel_at_start, fuel_at_end, avg_speed)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const INSERT_SAMPLE: &str = "
    INSERT OR REPLACE INTO telemetry_samples (
        session_id, vehicle_id, timestamp, elapsed_time,
        pos_x, pos_y, pos_z,
        speed, local_vel_x, local_vel_y, local_vel_z,
        local_accel_x, local_accel_y, local_accel_z,
        rpm, gear, throttle, brake, steering, fuel, turbo_boost,
        fl_temp_inner, fl_temp_mid, fl_temp_outer,
        fr_temp_inner, fr_temp_mid, fr_temp_outer,
        rl_temp_inner, rl_temp_mid, rl_temp_outer,
        rr_temp_inner, rr_temp_mid, rr_temp_outer,
        fl_wear, fr_wear, rl_wear, rr_wear,
        fl_pressure, fr_pressure, rl_pressure, rr_pressure,
        fl_brake_temp, fr_brake_temp, rl_brake_temp, rr_brake_temp,
        fl_susp_deflection, fr_susp_deflection, rl_susp_deflection, rr_susp_deflection
    ) VALUES (
        ?, ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?, ?, ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?, ?
    )";

/// One buffered `telemetry_samples` row
#[derive(Debug, Clone)]
struct SampleRow {
    session_id: String,
    timestamp: String,
    vehicle: VehicleTelemetry,
}

impl SampleRow {
    fn from_snapshot(snapshot: &Snapshot) -> Vec<Self> {
        let timestamp = format_timestamp(&snapshot.timestamp);
        snapshot
            .all_vehicles
            .iter()
            .map(|vehicle| Self {
                session_id: snapshot.session_id.clone(),
                timestamp: timestamp.clone(),
                vehicle: vehicle.clone(),
            })
            .collect()
    }

    fn wheel(&self, index: usize) -> Wheel {
        self.vehicle.wheels.get(index).copied().unwrap_or_default()
    }
}

/// Insert rows in one transaction
fn insert_samples(conn: &mut Connection, rows: &[SampleRow]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(INSERT_SAMPLE)?;
        for row in rows {
            let v = &row.vehicle;
            let (fl, fr, rl, rr) = (row.wheel(0), row.wheel(1), row.wheel(2), row.wheel(3));
            stmt.execute(params![
                row.session_id, v.vehicle_id, row.timestamp, v.elapsed_time,
                v.pos_x, v.pos_y, v.pos_z,
                v.speed, v.local_vel_x, v.local_vel_y, v.local_vel_z,
                // local acceleration and turbo boost are not captured yet
                0.0_f64, 0.0_f64, 0.0_f64,
                v.rpm, v.gear, v.throttle, v.brake, v.steering, v.fuel, 0.0_f64,
                fl.temp_inner, fl.temp_mid, fl.temp_outer,
                fr.temp_inner, fr.temp_mid, fr.temp_outer,
                rl.temp_inner, rl.temp_mid, rl.temp_outer,
                rr.temp_inner, rr.temp_mid, rr.temp_outer,
                fl.wear, fr.wear, rl.wear, rr.wear,
                fl.pressure, fr.pressure, rl.pressure, rr.pressure,
                fl.brake_temp, fr.brake_temp, rl.brake_temp, rr.brake_temp,
                fl.susp_deflection, fr.susp_deflection, rl.susp_deflection, rr.susp_deflection,
            ])?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

/// Buffered rows plus the outcome of the last flush attempt
#[derive(Default)]
struct PendingRows {
    rows: Vec<SampleRow>,
    /// Set while storage is failing; size-triggered flushes are skipped until
    /// an explicit or timed flush succeeds.
    stalled: bool,
}

/// State shared between the writer handle and its flush timer
struct WriterShared {
    db: TelemetryDatabase,
    batch_size: usize,
    /// Rows buffered beyond this are refused while storage is stalled
    pending_limit: usize,
    /// Guards every append and flush
    pending: Mutex<PendingRows>,
    /// Mirror of `pending.rows.len()` readable without the lock
    pending_count: AtomicUsize,
    /// Last stored event instant; event keys are kept strictly increasing
    last_event: StdMutex<Option<DateTime<Utc>>>,
}

impl WriterShared {
    /// Write everything pending. On failure the rows stay buffered.
    async fn flush_pending(&self, pending: &mut PendingRows) -> Result<usize> {
        if pending.rows.is_empty() {
            pending.stalled = false;
            return Ok(0);
        }

        // The buffer is only cleared once the transaction commits
        let batch = pending.rows.clone();
        let outcome = self
            .db
            .call(move |conn| {
                insert_samples(conn, &batch)
                    .map_err(|e| TelemetryError::storage("flush samples", e))
            })
            .await;

        match outcome {
            Ok(rows) => {
                pending.rows.clear();
                pending.stalled = false;
                self.pending_count.store(0, Ordering::Release);
                debug!(rows, "Flushed telemetry samples");
                Ok(rows)
            }
            Err(e) => {
                pending.stalled = true;
                self.pending_count.store(pending.rows.len(), Ordering::Release);
                Err(e)
            }
        }
    }

    /// Synchronous flush used when the writer is dropped without `close`
    fn flush_blocking(&self) {
        let Ok(mut pending) = self.pending.try_lock() else {
            warn!("Pending samples locked during drop; skipping final flush");
            return;
        };
        if pending.rows.is_empty() {
            return;
        }

        let result = self.db.lock().and_then(|mut conn| {
            insert_samples(&mut conn, &pending.rows)
                .map_err(|e| TelemetryError::storage("flush", e))
        });
        match result {
            Ok(rows) => {
                pending.rows.clear();
                self.pending_count.store(0, Ordering::Release);
                debug!(rows, "Flushed telemetry samples on drop");
            }
            Err(e) => error!(error = %e, rows = pending.rows.len(), "Final flush failed on drop"),
        }
    }

    fn next_event_timestamp(&self, detected: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last_event.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = match *last {
            Some(previous) if detected <= previous => previous + ChronoDuration::microseconds(1),
            _ => detected,
        };
        *last = Some(stamp);
        stamp
    }
}

/// [`TelemetryWriter`] backed by SQLite.
///
/// Samples are buffered and written in one transaction when `batch_size`
/// rows are pending, on every `flush_interval` tick, on [`flush`], and on
/// [`close`]. Sessions, events, and laps are written immediately.
///
/// A failed flush keeps its rows and is not retried by later appends; the
/// timer or an explicit [`flush`] retries it. While storage is failing at most
/// `2 × batch_size` rows are buffered and further samples are refused with
/// [`TelemetryError::PendingLimit`].
///
/// Must be created inside a tokio runtime (the flush timer is a task).
///
/// [`flush`]: TelemetryWriter::flush
/// [`close`]: SqliteTelemetryWriter::close
pub struct SqliteTelemetryWriter {
    shared: Arc<WriterShared>,
    cancel: CancellationToken,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl SqliteTelemetryWriter {
    pub fn new(db: TelemetryDatabase, batch_size: usize, flush_interval: Duration) -> Result<Self> {
        if batch_size == 0 {
            return Err(TelemetryError::config("batch size must be greater than zero"));
        }
        if flush_interval.is_zero() {
            return Err(TelemetryError::config("flush interval must be greater than zero"));
        }

        let shared = Arc::new(WriterShared {
            db,
            batch_size,
            pending_limit: batch_size.saturating_mul(2),
            pending: Mutex::new(PendingRows {
                rows: Vec::with_capacity(batch_size),
                stalled: false,
            }),
            pending_count: AtomicUsize::new(0),
            last_event: StdMutex::new(None),
        });
        let cancel = CancellationToken::new();
        let timer = tokio::spawn(flush_timer(Arc::clone(&shared), flush_interval, cancel.clone()));

        info!(batch_size, flush_interval_ms = flush_interval.as_millis() as u64, "Writer started");
        Ok(Self { shared, cancel, timer: StdMutex::new(Some(timer)) })
    }

    pub fn from_config(db: TelemetryDatabase, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Self::new(db, config.batch_size, config.flush_interval())
    }

    pub fn database(&self) -> &TelemetryDatabase {
        &self.shared.db
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    /// Stop the flush timer and write everything still pending.
    ///
    /// The timer is stopped even when the final flush fails.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                warn!(error = %e, "Flush timer ended abnormally");
            }
        }
        self.flush().await?;
        info!("Writer closed");
        Ok(())
    }
}

impl Drop for SqliteTelemetryWriter {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.shared.flush_blocking();
    }
}

async fn flush_timer(shared: Arc<WriterShared>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut pending = shared.pending.lock().await;
                if let Err(e) = shared.flush_pending(&mut pending).await {
                    error!(error = %e, rows = pending.rows.len(), "Timed flush failed; rows kept");
                }
            }
        }
    }

    debug!("Flush timer stopped");
}

#[async_trait::async_trait]
impl TelemetryWriter for SqliteTelemetryWriter {
    async fn write_session(&self, snapshot: &Snapshot) -> Result<()> {
        let session_id = snapshot.session_id.clone();
        let meta = snapshot.session.clone();
        let start_time = format_timestamp(&meta.as_ref().map_or_else(Utc::now, |m| m.start_time));
        let text = |value: Option<&String>| {
            value.filter(|s| !s.is_empty()).cloned().unwrap_or_else(|| "Unknown".to_string())
        };
        let track_name = text(meta.as_ref().map(|m| &m.track_name));
        let session_type = text(meta.as_ref().map(|m| &m.session_type));
        let num_vehicles = meta.as_ref().map_or(0, |m| m.num_vehicles);
        let track_length = meta.as_ref().map_or(0.0, |m| m.track_length);

        let inserted = self
            .shared
            .db
            .call(move |conn| {
                conn.execute(
                    INSERT_SESSION,
                    params![
                        session_id,
                        start_time,
                        track_name,
                        session_type,
                        num_vehicles,
                        track_length
                    ],
                )
                .map_err(|e| TelemetryError::storage("write session", e))
            })
            .await?;

        if inserted > 0 {
            info!(session_id = %snapshot.session_id, "Session recorded");
        }
        Ok(())
    }

    async fn write_sample(&self, snapshot: &Snapshot) -> Result<()> {
        let rows = SampleRow::from_snapshot(snapshot);
        if rows.is_empty() {
            return Ok(());
        }

        let shared = &self.shared;
        let mut pending = shared.pending.lock().await;
        for row in rows {
            if pending.rows.len() >= shared.pending_limit {
                warn!(limit = shared.pending_limit, "Pending sample limit reached; refusing rows");
                return Err(TelemetryError::PendingLimit { limit: shared.pending_limit });
            }
            pending.rows.push(row);
            shared.pending_count.store(pending.rows.len(), Ordering::Release);

            if !pending.stalled && pending.rows.len() >= shared.batch_size {
                shared.flush_pending(&mut pending).await?;
            }
        }
        Ok(())
    }

    async fn write_event(&self, event: &TelemetryEvent) -> Result<()> {
        let timestamp = format_timestamp(&self.shared.next_event_timestamp(event.timestamp));
        let session_id = event.session_id.clone();
        let vehicle_id = event.vehicle_id;
        let event_type = event.event_type.as_str();
        let data = event.payload_json();

        self.shared
            .db
            .call(move |conn| {
                let row = params![session_id, vehicle_id, timestamp, event_type, data];
                conn.execute(INSERT_EVENT, row)
                    .map_err(|e| TelemetryError::storage("write event", e))
            })
            .await?;
        Ok(())
    }

    async fn write_lap(&self, lap: &LapRecord) -> Result<()> {
        let lap = lap.clone();
        self.shared
            .db
            .call(move |conn| {
                conn.execute(
                    UPSERT_LAP,
                    params![
                        lap.session_id,
                        lap.vehicle_id,
                        lap.lap_number,
                        lap.lap_time,
                        lap.sector1_time,
                        lap.sector2_time,
                        lap.sector3_time,
                        lap.best_lap_time,
                        lap.fuel_at_start,
                        lap.fuel_at_end,
                        lap.avg_speed,
                    ],
                )
                .map_err(|e| TelemetryError::storage("write lap", e))
            })
            .await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut pending = self.shared.pending.lock().await;
        self.shared.flush_pending(&mut pending).await?;
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.shared.pending_count.load(Ordering::Acquire)
    }
}
