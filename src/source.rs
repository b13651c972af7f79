//! Source trait for live telemetry feeds

use crate::Result;
use crate::types::Snapshot;

/// Trait for live telemetry sources
///
/// Sources abstract over where snapshots come from (shared memory, a mock
/// feed in tests). The reader owns timing; a source only answers two
/// questions and never sleeps on its own.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Check whether the source can currently produce data (e.g. the
    /// simulator is running).
    fn is_available(&self) -> bool;

    /// Read the current snapshot
    ///
    /// Returns:
    /// - `Ok(Some(snapshot))` - A snapshot was read
    /// - `Ok(None)` - No data this tick
    /// - `Err(e)` - The read failed; callers treat this as a failed read
    async fn read_snapshot(&self) -> Result<Option<Snapshot>>;
}
