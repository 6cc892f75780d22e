//! Configuration System using Figment
//!
//! Strongly-typed configuration for the acquisition pipeline. Configuration is loaded from:
//! 1. `config/swing_daq.toml` (base configuration)
//! 2. Environment variables prefixed with `SWING_DAQ_`, nested with `__`
//!
//! Every field has a default, so an absent file yields a fully usable configuration.
//!
//! # Example
//! ```no_run
//! use swing_daq::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Buffer capacity: {}", config.acquisition.buffer_capacity);
//! # Ok::<(), swing_daq::error::SwingError>(())
//! ```

use crate::error::{AppResult, SwingError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/swing_daq.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Rolling buffer settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Recording archive settings
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Storage backend settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP receiver settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Rolling buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionConfig {
    /// Maximum number of synchronized frames kept in the live buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    /// Number of analyzed recordings retained, most recent first
    #[serde(default = "default_archive_capacity")]
    pub capacity: usize,
}

/// Output format of persisted recordings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Self-describing JSON document (metadata, signals, metrics)
    Json,
    /// Signal table only
    Csv,
    /// Both of the above
    Both,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Whether finished recordings are written to disk at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Output directory for recording files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File format
    #[serde(default = "default_format")]
    pub format: StorageFormat,
}

/// HTTP receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_name() -> String {
    "Swing DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_buffer_capacity() -> usize {
    400
}

fn default_archive_capacity() -> usize {
    5
}

fn default_enabled() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_format() -> StorageFormat {
    StorageFormat::Json
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            capacity: default_archive_capacity(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            output_dir: default_output_dir(),
            format: default_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override file values with prefix `SWING_DAQ_`.
    /// Example: `SWING_DAQ_ACQUISITION__BUFFER_CAPACITY=800`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SWING_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(SwingError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.acquisition.buffer_capacity == 0 {
            return Err(SwingError::Configuration(
                "acquisition.buffer_capacity must be greater than 0".to_string(),
            ));
        }

        if self.archive.capacity == 0 {
            return Err(SwingError::Configuration(
                "archive.capacity must be greater than 0".to_string(),
            ));
        }

        if self.storage.enabled && self.storage.output_dir.as_os_str().is_empty() {
            return Err(SwingError::Configuration(
                "storage.output_dir cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(SwingError::Configuration(
                "server.port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket address string for the HTTP receiver.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.bind_addr, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.acquisition.buffer_capacity, 400);
        assert_eq!(config.archive.capacity, 5);
        assert_eq!(config.storage.format, StorageFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swing.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[acquisition]\nbuffer_capacity = 800\n\n[storage]\nformat = \"both\"\n"
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.acquisition.buffer_capacity, 800);
        assert_eq!(config.storage.format, StorageFormat::Both);
        assert_eq!(config.archive.capacity, 5);
        assert_eq!(config.application.log_level, "info");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(SwingError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_capacities_rejected() {
        let mut config = AppConfig::default();
        config.acquisition.buffer_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.archive.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
