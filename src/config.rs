//! Pipeline configuration
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```rust
//! use pitwall_live::PipelineConfig;
//!
//! let config = PipelineConfig::from_yaml_str("broadcast_interval_ms: 50").unwrap();
//! assert_eq!(config.broadcast_interval_ms, 50);
//! assert_eq!(config.channel_capacity, 1000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::lmu_codes::impact;
use crate::{Result, TelemetryError};

/// Environment variable that overrides [`PipelineConfig::database_path`]
pub const DATABASE_PATH_ENV: &str = "LMU_TELEMETRY_DB";

/// Configuration for the reader, writer, and orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reader poll interval (10 ms is 100 Hz)
    pub read_interval_ms: u64,

    /// Minimum spacing between broadcast emissions
    pub broadcast_interval_ms: u64,

    /// Bounded queue capacity between reader and consumer
    pub channel_capacity: usize,

    /// Pending rows that trigger a synchronous flush
    pub batch_size: usize,

    /// Background flush period
    pub flush_interval_ms: u64,

    /// Queue fill ratio at which the reader reports lagging
    pub lag_threshold: f64,

    /// SQLite database file
    pub database_path: Option<PathBuf>,

    pub damage: DamageThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: 10,
            broadcast_interval_ms: 100,
            channel_capacity: 1000,
            batch_size: 500,
            flush_interval_ms: 1000,
            lag_threshold: 0.8,
            database_path: None,
            damage: DamageThresholds::default(),
        }
    }
}

/// Impact magnitude buckets for damage events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageThresholds {
    /// Magnitudes at or above this are `moderate`
    pub moderate_threshold: f64,
    /// Magnitudes at or above this are `serious`
    pub serious_threshold: f64,
}

impl Default for DamageThresholds {
    fn default() -> Self {
        Self {
            moderate_threshold: impact::MODERATE_THRESHOLD,
            serious_threshold: impact::SERIOUS_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML document, apply environment overrides, and validate
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| TelemetryError::parse("pipeline config", e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Replace the database path with `LMU_TELEMETRY_DB` when it is set
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = std::env::var_os(DATABASE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
    }

    /// Check every field; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        if self.read_interval_ms == 0 {
            return Err(TelemetryError::config("read_interval_ms must be greater than zero"));
        }
        if self.broadcast_interval_ms == 0 {
            return Err(TelemetryError::config("broadcast_interval_ms must be greater than zero"));
        }
        if self.flush_interval_ms == 0 {
            return Err(TelemetryError::config("flush_interval_ms must be greater than zero"));
        }
        if self.channel_capacity == 0 {
            return Err(TelemetryError::config("channel_capacity must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(TelemetryError::config("batch_size must be greater than zero"));
        }
        if !(self.lag_threshold > 0.0 && self.lag_threshold <= 1.0) {
            return Err(TelemetryError::config(format!(
                "lag_threshold must be in (0, 1], got {}",
                self.lag_threshold
            )));
        }
        let damage = &self.damage;
        if !(damage.moderate_threshold > 0.0 && damage.moderate_threshold < damage.serious_threshold)
        {
            return Err(TelemetryError::config(format!(
                "damage thresholds must satisfy 0 < moderate ({}) < serious ({})",
                damage.moderate_threshold, damage.serious_threshold
            )));
        }
        Ok(())
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.read_interval(), Duration::from_millis(10));
        assert_eq!(config.broadcast_interval(), Duration::from_millis(100));
        assert_eq!(config.flush_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "batch_size: 50\ndamage:\n  serious_threshold: 2000.0\n";
        let config: PipelineConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.channel_capacity, 1000);
        assert_eq!(config.damage.moderate_threshold, 100.0);
        assert_eq!(config.damage.serious_threshold, 2000.0);
    }

    #[test]
    fn zero_values_are_rejected() {
        for mutate in [
            (|c: &mut PipelineConfig| c.read_interval_ms = 0) as fn(&mut PipelineConfig),
            |c| c.broadcast_interval_ms = 0,
            |c| c.flush_interval_ms = 0,
            |c| c.channel_capacity = 0,
            |c| c.batch_size = 0,
        ] {
            let mut config = PipelineConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(TelemetryError::Config { .. })));
        }
    }

    #[test]
    fn lag_threshold_bounds() {
        let mut config = PipelineConfig { lag_threshold: 1.0, ..PipelineConfig::default() };
        assert!(config.validate().is_ok());

        config.lag_threshold = 0.0;
        assert!(config.validate().is_err());

        config.lag_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn damage_thresholds_must_be_ordered() {
        let config = PipelineConfig {
            damage: DamageThresholds { moderate_threshold: 500.0, serious_threshold: 400.0 },
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("moderate"));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let result = PipelineConfig::from_yaml_str("batch_size: [not, a, number]");
        assert!(matches!(result, Err(TelemetryError::Parse { .. })));
    }

    #[test]
    fn load_reads_yaml_file() -> anyhow::Result<()> {
        use anyhow::{Context, ensure};

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pitwall-live.yaml");
        std::fs::write(&path, "read_interval_ms: 20\nbroadcast_interval_ms: 250\n")?;

        let config = PipelineConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        ensure!(config.read_interval() == Duration::from_millis(20), "read interval not applied");
        ensure!(config.broadcast_interval() == Duration::from_millis(250), "broadcast not applied");
        ensure!(config.batch_size == 500, "default batch size lost");
        Ok(())
    }

    #[test]
    fn load_missing_file_reports_path() {
        let result = PipelineConfig::load("/nonexistent/pitwall-live.yaml");
        match result {
            Err(TelemetryError::File { path, .. }) => {
                assert!(path.to_string_lossy().contains("pitwall-live.yaml"))
            }
            other => panic!("expected File error, got {:?}", other),
        }
    }
}
