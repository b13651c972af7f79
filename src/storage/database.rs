//! SQLite connection handle and read queries

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::LapRecord;
use super::schema::{self, parse_timestamp};
use crate::types::EventType;
use crate::{Result, TelemetryError};

/// Shared SQLite connection.
///
/// Cloning is cheap; all clones use the same connection. Blocking work runs
/// on tokio's blocking pool through [`TelemetryDatabase::call`].
#[derive(Clone)]
pub struct TelemetryDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for TelemetryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryDatabase").finish_non_exhaustive()
    }
}

/// Stored session row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: String,
    pub track_name: String,
    pub session_type: String,
    pub num_vehicles: i32,
    pub track_length: f64,
}

/// Stored event row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub session_id: String,
    pub vehicle_id: i32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl StoredEvent {
    pub fn is(&self, event_type: EventType) -> bool {
        self.event_type == event_type.as_str()
    }
}

impl TelemetryDatabase {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| TelemetryError::storage("open", e))?;
        info!(path = %path.display(), "Opened telemetry database");
        Self::from_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| TelemetryError::storage("open", e))?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection and ensure the schema exists
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.create_schema_blocking()?;
        Ok(db)
    }

    /// Create all tables (idempotent)
    pub async fn create_schema(&self) -> Result<()> {
        self.call(|conn| {
            schema::create_tables(conn).map_err(|e| TelemetryError::storage("create schema", e))
        })
        .await
    }

    fn create_schema_blocking(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::create_tables(&conn).map_err(|e| TelemetryError::storage("create schema", e))?;
        debug!("Telemetry schema ready");
        Ok(())
    }

    /// Lock the connection on the current thread.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| TelemetryError::storage_task("connection lock poisoned"))
    }

    /// Run `f` against the connection on the blocking pool
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard =
                conn.lock().map_err(|_| TelemetryError::storage_task("connection lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| TelemetryError::storage_task(format!("blocking task failed: {}", e)))?
    }

    /// Number of rows in one of [`schema::TABLES`]
    pub async fn row_count(&self, table: &'static str) -> Result<u64> {
        if !schema::TABLES.contains(&table) {
            return Err(TelemetryError::config(format!("unknown table '{}'", table)));
        }
        self.call(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            let count: i64 = conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| TelemetryError::storage("count rows", e))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    pub async fn sample_count(&self) -> Result<u64> {
        self.row_count("telemetry_samples").await
    }

    pub async fn session_count(&self) -> Result<u64> {
        self.row_count("sessions").await
    }

    pub async fn event_count(&self) -> Result<u64> {
        self.row_count("events").await
    }

    pub async fn lap_count(&self) -> Result<u64> {
        self.row_count("laps").await
    }

    /// Look up a session by id
    pub async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT session_id, start_time, track_name, session_type, num_vehicles, track_length
                 FROM sessions WHERE session_id = ?1",
                [&session_id],
                |row| {
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        start_time: row.get(1)?,
                        track_name: row.get(2)?,
                        session_type: row.get(3)?,
                        num_vehicles: row.get(4)?,
                        track_length: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(|e| TelemetryError::storage("load session", e))
        })
        .await
    }

    /// Fuel from the most recent sample of a vehicle in a session
    pub async fn latest_fuel(&self, session_id: &str, vehicle_id: i32) -> Result<Option<f64>> {
        let session_id = session_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT fuel FROM telemetry_samples
                 WHERE session_id = ?1 AND vehicle_id = ?2
                 ORDER BY timestamp DESC LIMIT 1",
                params![session_id, vehicle_id],
                |row| row.get::<_, Option<f64>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(|e| TelemetryError::storage("load latest fuel", e))
        })
        .await
    }

    /// Events of a session in timestamp order
    pub async fn events(&self, session_id: &str) -> Result<Vec<StoredEvent>> {
        let session_id = session_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT session_id, vehicle_id, timestamp, event_type, event_data
                     FROM events WHERE session_id = ?1 ORDER BY timestamp, vehicle_id",
                )
                .map_err(|e| TelemetryError::storage("load events", e))?;

            let rows = stmt
                .query_map([&session_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| TelemetryError::storage("load events", e))?;

            let mut events = Vec::new();
            for row in rows {
                let (session_id, vehicle_id, timestamp, event_type, data) =
                    row.map_err(|e| TelemetryError::storage("load events", e))?;
                let timestamp = parse_timestamp(&timestamp).ok_or_else(|| {
                    TelemetryError::parse("event timestamp", format!("invalid '{}'", timestamp))
                })?;
                events.push(StoredEvent {
                    session_id,
                    vehicle_id,
                    timestamp,
                    event_type,
                    payload: serde_json::from_str(&data)?,
                });
            }
            Ok(events)
        })
        .await
    }

    /// Laps of a session ordered by vehicle and lap number
    pub async fn laps(&self, session_id: &str) -> Result<Vec<LapRecord>> {
        let session_id = session_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT session_id, vehicle_id, lap_number, lap_time, sector1_time,
                            sector2_time, sector3_time, best_lap_time, fuel_at_start,
                            fuel_at_end, avg_speed
                     FROM laps WHERE session_id = ?1 ORDER BY vehicle_id, lap_number",
                )
                .map_err(|e| TelemetryError::storage("load laps", e))?;

            let laps = stmt
                .query_map([&session_id], |row| {
                    Ok(LapRecord {
                        session_id: row.get(0)?,
                        vehicle_id: row.get(1)?,
                        lap_number: row.get(2)?,
                        lap_time: row.get(3)?,
                        sector1_time: row.get(4)?,
                        sector2_time: row.get(5)?,
                        sector3_time: row.get(6)?,
                        best_lap_time: row.get(7)?,
                        fuel_at_start: row.get(8)?,
                        fuel_at_end: row.get(9)?,
                        avg_speed: row.get(10)?,
                    })
                })
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| TelemetryError::storage("load laps", e))?;
            Ok(laps)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_has_schema() {
        let db = TelemetryDatabase::open_in_memory().unwrap();
        for table in schema::TABLES {
            assert_eq!(db.row_count(table).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn create_schema_twice_is_ok() {
        let db = TelemetryDatabase::open_in_memory().unwrap();
        db.create_schema().await.unwrap();
        db.create_schema().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_table_is_rejected() {
        let db = TelemetryDatabase::open_in_memory().unwrap();
        let err = db.row_count("sqlite_master").await.unwrap_err();
        assert!(matches!(err, TelemetryError::Config { .. }));
    }

    #[tokio::test]
    async fn missing_rows_are_none() {
        let db = TelemetryDatabase::open_in_memory().unwrap();
        assert!(db.session("nope").await.unwrap().is_none());
        assert!(db.latest_fuel("nope", 0).await.unwrap().is_none());
        assert!(db.events("nope").await.unwrap().is_empty());
        assert!(db.laps("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.db");

        let db = TelemetryDatabase::open(&path).unwrap();
        db.call(|conn| {
            conn.execute(
                "INSERT INTO sessions VALUES ('s1', '2025-01-01T00:00:00Z', 'Spa', 'Race', 2, 7004.0)",
                [],
            )
            .map_err(|e| TelemetryError::storage("insert", e))
        })
        .await
        .unwrap();
        drop(db);

        let reopened = TelemetryDatabase::open(&path).unwrap();
        let session = reopened.session("s1").await.unwrap().unwrap();
        assert_eq!(session.track_name, "Spa");
        assert_eq!(session.num_vehicles, 2);
    }
}
