//! Configuration loading
//!
//! Resolution priority, highest first:
//! 1. Command-line flags (applied by the binary on top of the loaded config)
//! 2. Environment variables (`ALBUM_INGEST_*`)
//! 3. TOML config file (explicit path, or `<config dir>/album-ingest/config.toml`)
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ALBUM_INGEST_";

/// Default rows per catalog group commit
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Worker count used when none is configured
pub fn default_workers() -> usize {
    num_cpus::get().clamp(2, 16)
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub scan: ScanSettings,
    pub process: ProcessSettings,
    pub grouping: GroupingSettings,
    pub validation: ValidationSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

/// Scanner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Concurrent scan workers
    pub workers: usize,
    /// Rows per catalog group commit
    pub batch_size: usize,
    /// Directory receiving `scan-*.db` catalog artifacts
    pub catalog_dir: Option<PathBuf>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            catalog_dir: None,
        }
    }
}

/// Processor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// Concurrent album workers
    pub workers: usize,
    /// File moves per second, 0 = unlimited
    pub rate_limit: u32,
    pub staging_root: Option<PathBuf>,
    pub production_root: Option<PathBuf>,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rate_limit: 0,
            staging_root: None,
            production_root: None,
        }
    }
}

/// Year-split policy for the grouping engine
///
/// A provisional album is split when more than `max_year_clusters` distinct
/// years are each backed by at least `min_cluster_size` member files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingSettings {
    pub max_year_clusters: usize,
    pub min_cluster_size: usize,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            max_year_clusters: 1,
            min_cluster_size: 2,
        }
    }
}

/// Per-file validation bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub min_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.0,
            max_duration_secs: 4.0 * 3600.0,
            min_bitrate_kbps: 32,
            max_bitrate_kbps: 10_000,
        }
    }
}

/// Durable store settings (staging records, directory codes, production catalog)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite database file; no durable store when unset
    pub database: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    /// Upper bound on lock retries for contended writes
    pub max_lock_wait_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout_ms: 5000,
            max_lock_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from TOML (if any) and apply environment overrides
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_toml_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_toml_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply `ALBUM_INGEST_*` overrides through a lookup function
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SCAN_WORKERS") {
            self.scan.workers = parse_env("SCAN_WORKERS", &v)?;
        }
        if let Some(v) = var("BATCH_SIZE") {
            self.scan.batch_size = parse_env("BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("CATALOG_DIR") {
            self.scan.catalog_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PROCESS_WORKERS") {
            self.process.workers = parse_env("PROCESS_WORKERS", &v)?;
        }
        if let Some(v) = var("RATE_LIMIT") {
            self.process.rate_limit = parse_env("RATE_LIMIT", &v)?;
        }
        if let Some(v) = var("STAGING_ROOT") {
            self.process.staging_root = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PRODUCTION_ROOT") {
            self.process.production_root = Some(PathBuf::from(v));
        }
        if let Some(v) = var("MAX_YEAR_CLUSTERS") {
            self.grouping.max_year_clusters = parse_env("MAX_YEAR_CLUSTERS", &v)?;
        }
        if let Some(v) = var("MIN_CLUSTER_SIZE") {
            self.grouping.min_cluster_size = parse_env("MIN_CLUSTER_SIZE", &v)?;
        }
        if let Some(v) = var("DATABASE") {
            self.store.database = Some(PathBuf::from(v));
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = v;
        }

        Ok(())
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.scan.workers == 0 || self.process.workers == 0 {
            return Err(Error::Config("worker counts must be at least 1".to_string()));
        }
        if self.scan.batch_size == 0 {
            return Err(Error::Config("scan.batch_size must be at least 1".to_string()));
        }
        if self.grouping.max_year_clusters == 0 || self.grouping.min_cluster_size == 0 {
            return Err(Error::Config(
                "grouping.max_year_clusters and grouping.min_cluster_size must be at least 1".to_string(),
            ));
        }
        let v = &self.validation;
        if v.min_duration_secs < 0.0 || v.max_duration_secs <= v.min_duration_secs {
            return Err(Error::Config(format!(
                "invalid duration bounds: {}..{}",
                v.min_duration_secs, v.max_duration_secs
            )));
        }
        if v.max_bitrate_kbps <= v.min_bitrate_kbps {
            return Err(Error::Config(format!(
                "invalid bitrate bounds: {}..{}",
                v.min_bitrate_kbps, v.max_bitrate_kbps
            )));
        }
        Ok(())
    }

    /// Write configuration as TOML (temp file + rename)
    pub fn write_toml(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Platform config file location (`~/.config/album-ingest/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("album-ingest").join("config.toml"))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::Config(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value))
    })
}
