//! Configuration management for keyward tools

use keyward_logging::LogFormat;
use serde::Deserialize;
use std::env;

/// Default byte length of generated volume keys
pub const DEFAULT_KEY_LENGTH: usize = 32;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `zfs` binary used for volume operations
    pub zfs_binary: String,
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    /// Byte length of keys minted for volumes
    pub key_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            zfs_binary: "zfs".to_string(),
            log_level: None,
            log_format: LogFormat::Console,
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_format = match lookup("KEYWARD_LOG_FORMAT") {
            None => defaults.log_format,
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| {
                config::ConfigError::Message(format!("KEYWARD_LOG_FORMAT: {}", e))
            })?,
        };

        let key_length = match lookup("KEYWARD_KEY_LENGTH") {
            None => defaults.key_length,
            Some(raw) => match raw.parse::<usize>() {
                Ok(len) if len > 0 => len,
                _ => {
                    return Err(config::ConfigError::Message(format!(
                        "KEYWARD_KEY_LENGTH must be a positive integer, got {:?}",
                        raw
                    )))
                }
            },
        };

        Ok(Self {
            zfs_binary: lookup("KEYWARD_ZFS_BIN").unwrap_or(defaults.zfs_binary),
            log_level: Some(lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string())),
            log_format,
            key_length,
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
