//! Configuration for the soundline adapter
//!
//! A small TOML bootstrap config: preferred devices, default buffer size,
//! log level. Everything has a built-in default so the adapter runs with no
//! config file at all.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Environment variable naming an optional config file path.
pub const CONFIG_ENV_VAR: &str = "SOUNDLINE_CONFIG";

/// Bootstrap configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Preferred output device name (host default when unset)
    #[serde(default)]
    pub output_device: Option<String>,

    /// Preferred input device name (host default when unset)
    #[serde(default)]
    pub input_device: Option<String>,

    /// Default line buffer size in frames
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_device: None,
            input_device: None,
            buffer_frames: default_buffer_frames(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_buffer_frames() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let toml_str = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Config = toml::from_str(&toml_str)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from the file named by `SOUNDLINE_CONFIG`, falling back to
    /// built-in defaults when the variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.output_device.is_none());
        assert!(config.input_device.is_none());
        assert_eq!(config.buffer_frames, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            output_device = "USB Audio"
            "#,
        )
        .unwrap();
        assert_eq!(config.output_device.as_deref(), Some("USB Audio"));
        assert_eq!(config.buffer_frames, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_toml() {
        let config: Config = toml::from_str(
            r#"
            output_device = "Speakers"
            input_device = "Mic"
            buffer_frames = 2048

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.input_device.as_deref(), Some("Mic"));
        assert_eq!(config.buffer_frames, 2048);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/soundline.toml").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundline.toml");
        std::fs::write(&path, "buffer_frames = 512\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.buffer_frames, 512);
    }
}
