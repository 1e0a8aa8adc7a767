//! Application configuration.
//!
//! Single-tier TOML file plus environment overrides, unlike the 4-tier
//! (system/team/project/user) hierarchy the teacher's `config::loader`
//! resolves — this engine runs as one scheduling service per deployment,
//! so there is no team/project split to merge.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level application configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub mes: MesConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            mes: MesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Reference-data snapshot time-to-live, in seconds.
    pub reference_data_ttl_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("aps_scheduler.db"),
            reference_data_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows per progress-reporting and cooperative-cancellation chunk.
    pub chunk_size: usize,
    /// Overall pipeline timeout, in seconds.
    pub timeout_secs: u64,
    /// Default feeder changeover interval, in minutes, used when no
    /// machine-relation override is on file.
    pub default_changeover_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            // §5: default task timeout is 1 hour, configurable per batch.
            timeout_secs: 3600,
            default_changeover_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MesConfig {
    pub endpoint: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for MesConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber` env-filter directive, e.g. `"info"` or
    /// `"aps_scheduler=debug,rusqlite=warn"`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl AppConfig {
    /// Loads from `path` if it exists, applies `APS_*` environment
    /// overrides, validates, and returns the result. Falls back to
    /// defaults (still subject to env overrides) when `path` is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Default config file location: `$APS_CONFIG_DIR/config.toml`, or the
    /// platform config directory (`~/.config/aps-scheduler/` on Linux).
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("APS_CONFIG_DIR") {
            return Ok(PathBuf::from(dir).join("config.toml"));
        }
        let base = dirs::config_dir().ok_or_else(|| Error::Configuration("could not determine platform config directory".to_string()))?;
        Ok(base.join("aps-scheduler").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("APS_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("APS_MES_ENDPOINT") {
            self.mes.endpoint = v;
        }
        if let Ok(v) = std::env::var("APS_LOG_FILTER") {
            self.logging.filter = v;
        }
        if let Ok(v) = std::env::var("APS_PIPELINE_CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.pipeline.chunk_size = n;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.chunk_size == 0 {
            return Err(Error::Configuration("pipeline.chunk_size must be greater than zero".to_string()));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(Error::Configuration("pipeline.timeout_secs must be greater than zero".to_string()));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(Error::Configuration("database.path must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_fails_validation() {
        let mut config = AppConfig::default();
        config.pipeline.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_absent() {
        let config = AppConfig::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.pipeline.chunk_size, 1000);
    }

    #[test]
    fn load_parses_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nchunk_size = 250\n").unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.pipeline.chunk_size, 250);
    }
}
