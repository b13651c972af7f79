//! Error types for the live telemetry pipeline.
//!
//! Every fallible operation in the crate returns [`TelemetryError`]. Errors carry
//! structured context and can be classified for retry decisions.
//!
//! ## Error Categories
//!
//! - **Source Errors**: a telemetry source failed to produce a snapshot
//! - **Storage Errors**: SQLite rejected a statement or the storage task failed
//! - **Configuration Errors**: invalid settings detected at construction time
//! - **Broadcast Errors**: the outbound transport rejected a frame
//! - **Parse / File Errors**: configuration files that cannot be read or parsed
//!
//! ## Propagation
//!
//! Read-path failures are absorbed by the [`LiveReader`](crate::reader::LiveReader)
//! and only surface as health metrics. Write-path failures propagate to the caller
//! of the write or flush that triggered them.
//!
//! ```rust
//! use pitwall_live::TelemetryError;
//!
//! let error = TelemetryError::source_failed("shared memory not mapped");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Telemetry source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage operation '{operation}' failed")]
    Storage {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Storage task failed: {details}")]
    StorageTask { details: String },

    #[error("Pending sample limit of {limit} rows reached")]
    PendingLimit { limit: usize },

    #[error("Serialization failed")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Broadcast transport failed: {reason}")]
    Broadcast {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Source { .. } => true,
            TelemetryError::Storage { source, .. } => matches!(
                source.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            TelemetryError::StorageTask { .. } => false,
            TelemetryError::PendingLimit { .. } => true,
            TelemetryError::Serialization(_) => false,
            TelemetryError::Config { .. } => false,
            TelemetryError::File { .. } => false,
            TelemetryError::Parse { .. } => false,
            TelemetryError::Broadcast { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Source { .. } => vec![
                "Ensure the simulator is running with shared memory enabled",
                "Check that the shared memory plugin is installed",
                "Retry the read on the next tick",
            ],
            TelemetryError::Storage { .. } => vec![
                "Check the database file is writable",
                "Ensure no other process holds a write lock on the database",
                "Verify the schema was created before writing",
            ],
            TelemetryError::StorageTask { .. } => vec![
                "Restart the writer; a previous storage task panicked",
                "Check logs for the original panic message",
            ],
            TelemetryError::PendingLimit { .. } => vec![
                "Resolve the storage failure reported by the last flush",
                "Call flush() once storage is writable again",
            ],
            TelemetryError::Serialization(_) => vec![
                "Check payload values are finite numbers",
                "Verify the payload structure matches the wire format",
            ],
            TelemetryError::Config { .. } => vec![
                "Check the configuration values against the documented ranges",
                "Remove the field to fall back to its default",
            ],
            TelemetryError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
                "Ensure sufficient disk space",
            ],
            TelemetryError::Parse { .. } => vec![
                "Check the YAML syntax of the configuration file",
                "Verify field names and value types",
            ],
            TelemetryError::Broadcast { .. } => vec![
                "Check the client connection is still open",
                "Reconnect the client to resume the live stream",
            ],
        }
    }

    /// Helper constructor for source read failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for SQLite failures with the operation that failed.
    pub fn storage(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        TelemetryError::Storage { operation: operation.into(), source }
    }

    /// Helper constructor for failed or poisoned storage tasks.
    pub fn storage_task(details: impl Into<String>) -> Self {
        TelemetryError::StorageTask { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        TelemetryError::Config { reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TelemetryError::File { path, source }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for transport failures while broadcasting.
    pub fn broadcast_failed(
        reason: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        TelemetryError::Broadcast { reason: reason.into(), source }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<rusqlite::Error> for TelemetryError {
    fn from(err: rusqlite::Error) -> Self {
        TelemetryError::Storage { operation: "unknown".to_string(), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            operation in "\\w+",
            details in ".*",
            limit in 1usize..10_000usize
          ) {
            let source_msg = TelemetryError::source_failed(reason.clone()).to_string();
            prop_assert!(source_msg.contains(&reason));

            let storage_msg =
              TelemetryError::storage(operation.clone(), rusqlite::Error::InvalidQuery).to_string();
            prop_assert!(storage_msg.contains(&operation));

            let config_msg = TelemetryError::config(details.clone()).to_string();
            prop_assert!(config_msg.contains(&details));

            let limit_msg = TelemetryError::PendingLimit { limit }.to_string();
            prop_assert!(limit_msg.contains(&limit.to_string()));
          }

          #[test]
          fn source_chain_preserves_the_root_cause(
            base_message in ".*",
            reasons in prop::collection::vec("\\w*", 1..5)
          ) {
            let mut current: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));

            for (i, reason) in reasons.iter().enumerate() {
              current = Box::new(TelemetryError::broadcast_failed(
                format!("Level {}: {}", i, reason),
                Some(current),
              ));
            }

            let mut depth = 0;
            let mut found_base = false;
            let mut cursor = std::error::Error::source(current.as_ref());
            while let Some(source) = cursor {
              depth += 1;
              if source.to_string().contains(&base_message) {
                found_base = true;
              }
              cursor = source.source();
              if depth > 10 {
                break;
              }
            }

            prop_assert_eq!(depth, reasons.len());
            prop_assert!(found_base, "Base message '{}' not found in chain", base_message);
          }
        }
    }

    #[test]
    fn error_constructors_validation() {
        let file_error = TelemetryError::file_error(
            PathBuf::from("/tmp/pipeline.yaml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(matches!(file_error, TelemetryError::File { .. }));

        let storage_error = TelemetryError::storage("flush", rusqlite::Error::InvalidQuery);
        assert!(matches!(storage_error, TelemetryError::Storage { .. }));

        let config_error = TelemetryError::config("batch_size must be greater than zero");
        assert!(matches!(config_error, TelemetryError::Config { .. }));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TelemetryError>();

        let error = TelemetryError::source_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(TelemetryError::source_failed("read failed").is_retryable());
        assert!(TelemetryError::PendingLimit { limit: 10 }.is_retryable());
        assert!(!TelemetryError::config("bad").is_retryable());
        assert!(!TelemetryError::storage("insert", rusqlite::Error::InvalidQuery).is_retryable());

        for error in [
            TelemetryError::source_failed("x"),
            TelemetryError::config("x"),
            TelemetryError::storage_task("x"),
            TelemetryError::broadcast_failed("x", None),
            TelemetryError::PendingLimit { limit: 1 },
        ] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn from_conversions_work() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "pipeline.yaml");
        match TelemetryError::from(io_err) {
            TelemetryError::File { source, .. } => assert_eq!(source.to_string(), "pipeline.yaml"),
            other => panic!("Expected File error variant, got {other:?}"),
        }

        let sql_err = TelemetryError::from(rusqlite::Error::InvalidQuery);
        assert!(matches!(sql_err, TelemetryError::Storage { .. }));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(TelemetryError::from(json_err), TelemetryError::Serialization(_)));
    }
}
