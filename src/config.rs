//! Configuration management for starcache
//!
//! Configuration is read from TOML, with environment variable overrides and
//! defaults for every field.
//!
//! ```toml
//! [cache]
//! backend = "disk"
//! root_dir = "/var/tmp/starcache"
//! per_instance_dir = true
//! reclaim_on_remove = true
//! sync_writes = true
//!
//! [logging]
//! level = "info"
//! structured = false
//! ```
//!
//! | Variable | Field |
//! |---|---|
//! | `STARCACHE_BACKEND` | `cache.backend` (`disk` or `memory`) |
//! | `STARCACHE_ROOT_DIR` | `cache.root_dir` |
//! | `STARCACHE_PER_INSTANCE_DIR` | `cache.per_instance_dir` |
//! | `STARCACHE_RECLAIM_ON_REMOVE` | `cache.reclaim_on_remove` |
//! | `STARCACHE_SYNC_WRITES` | `cache.sync_writes` |
//! | `RUST_LOG` | `logging.level` |

use crate::cache::{DiskCacheConfig, DiskSegmentCache, MemorySegmentCache, SegmentCache};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Segment cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which segment cache backend to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Files under `root_dir`
    #[default]
    Disk,
    /// In-process map
    Memory,
}

impl FromStr for CacheBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(CacheBackend::Disk),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(Error::Configuration(format!(
                "Unknown cache backend '{}': expected disk or memory",
                other
            ))),
        }
    }
}

/// Segment cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Backend to build
    #[serde(default)]
    pub backend: CacheBackend,

    /// Disk cache root directory
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Give each cache instance its own subdirectory
    #[serde(default = "default_true")]
    pub per_instance_dir: bool,

    /// Delete segment files on remove
    #[serde(default = "default_true")]
    pub reclaim_on_remove: bool,

    /// fsync segment files before they become visible
    #[serde(default = "default_true")]
    pub sync_writes: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `starcache=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub structured: bool,
}

fn default_root_dir() -> PathBuf { std::env::temp_dir().join("starcache") }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            root_dir: default_root_dir(),
            per_instance_dir: true,
            reclaim_on_remove: true,
            sync_writes: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            structured: false,
        }
    }
}

impl CacheConfig {
    /// Disk backend settings
    pub fn disk_config(&self) -> DiskCacheConfig {
        DiskCacheConfig {
            root_dir: self.root_dir.clone(),
            per_instance_dir: self.per_instance_dir,
            reclaim_on_remove: self.reclaim_on_remove,
            sync_writes: self.sync_writes,
        }
    }

    /// Construct the configured backend
    pub fn build_cache(&self) -> Result<Arc<dyn SegmentCache>> {
        Ok(match self.backend {
            CacheBackend::Disk => Arc::new(DiskSegmentCache::new(self.disk_config())?),
            CacheBackend::Memory => Arc::new(MemorySegmentCache::new()),
        })
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Cache
        if let Ok(backend) = std::env::var("STARCACHE_BACKEND") {
            if let Ok(b) = backend.parse() {
                self.cache.backend = b;
            }
        }
        if let Ok(root_dir) = std::env::var("STARCACHE_ROOT_DIR") {
            self.cache.root_dir = PathBuf::from(root_dir);
        }
        if let Some(v) = env_bool("STARCACHE_PER_INSTANCE_DIR") {
            self.cache.per_instance_dir = v;
        }
        if let Some(v) = env_bool("STARCACHE_RECLAIM_ON_REMOVE") {
            self.cache.reclaim_on_remove = v;
        }
        if let Some(v) = env_bool("STARCACHE_SYNC_WRITES") {
            self.cache.sync_writes = v;
        }

        // Logging
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.backend == CacheBackend::Disk && self.cache.root_dir.as_os_str().is_empty() {
            return Err(Error::Configuration("Cache root directory cannot be empty".to_string()));
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(Error::Configuration(format!(
                "Invalid log level '{}': {}",
                self.logging.level, e
            )));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.backend, CacheBackend::Disk);
        assert!(config.cache.per_instance_dir);
        assert!(config.cache.reclaim_on_remove);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[cache]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert!(config.cache.sync_writes);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.cache.root_dir = PathBuf::new();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.logging.level = "starcache=loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("starcache.toml");
        let mut config = Config::default();
        config.cache.backend = CacheBackend::Memory;
        config.cache.reclaim_on_remove = false;
        config.logging.structured = true;

        config.save_to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("STARCACHE_RECLAIM_ON_REMOVE", "false");
        let config = Config::from_env();
        assert!(!config.cache.reclaim_on_remove);
        std::env::remove_var("STARCACHE_RECLAIM_ON_REMOVE");
    }

    #[test]
    fn test_build_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            root_dir: dir.path().to_path_buf(),
            ..CacheConfig::default()
        };
        let cache = config.build_cache().unwrap();
        assert!(!cache.supports_rich_index());
        cache.tear_down();

        let memory = CacheConfig {
            backend: CacheBackend::Memory,
            ..CacheConfig::default()
        };
        assert!(memory.build_cache().unwrap().segment_headers().is_empty());
    }
}
