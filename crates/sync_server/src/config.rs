//! Configuration management for the sync server.
//!
//! This module handles loading, parsing and validating the TOML configuration
//! file. A default file is written when none exists.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

/// Main application configuration structure.
///
/// Encompasses the tick loop, the zones hosted by this process, object
/// storage and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tick loop and zone settings
    pub server: ServerSettings,
    /// Object storage settings
    #[serde(default)]
    pub storage: StorageSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Server tick interval in milliseconds (0 to disable the tick loop)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Names of the zones hosted by this server
    #[serde(default = "default_zones")]
    pub zones: Vec<String>,
    /// Maximum number of concurrent client sessions
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Frames buffered per client before newer frames are dropped
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

/// Object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding one compressed record per stored object
    #[serde(default = "default_storage_directory")]
    pub directory: String,
    /// Whether objects bound to a session are stored on shutdown
    #[serde(default = "default_persist_on_shutdown")]
    pub persist_on_shutdown: bool,
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

/// Default for tick_interval_ms
pub fn default_tick_interval() -> u64 {
    50
}

fn default_zones() -> Vec<String> {
    vec!["world".to_string()]
}

fn default_max_clients() -> usize {
    1000
}

fn default_outbox_capacity() -> usize {
    64
}

fn default_storage_directory() -> String {
    "data/objects".to_string()
}

fn default_persist_on_shutdown() -> bool {
    true
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
            persist_on_shutdown: default_persist_on_shutdown(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                tick_interval_ms: default_tick_interval(),
                zones: default_zones(),
                max_clients: default_max_clients(),
                outbox_capacity: default_outbox_capacity(),
            },
            storage: StorageSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.zones.is_empty() {
            return Err("At least one zone must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for zone in &self.server.zones {
            if zone.trim().is_empty() {
                return Err("Zone names cannot be empty".to_string());
            }
            if !seen.insert(zone.as_str()) {
                return Err(format!("Duplicate zone name: {zone}"));
            }
        }

        if self.server.max_clients == 0 {
            return Err("server.max_clients must be greater than 0".to_string());
        }

        if self.server.outbox_capacity == 0 {
            return Err("server.outbox_capacity must be greater than 0".to_string());
        }

        if self.storage.directory.is_empty() {
            return Err("Storage directory cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.server.zones, vec!["world".to_string()]);
        assert_eq!(config.server.max_clients, 1000);
        assert_eq!(config.server.outbox_capacity, 64);

        assert_eq!(config.storage.directory, "data/objects");
        assert!(config.storage.persist_on_shutdown);

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.logging.file_path.is_none());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(config.server.tick_interval_ms, 50);
        assert!(path.exists());

        // the written default loads back unchanged
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.zones, config.server.zones);
        assert_eq!(reloaded.storage.directory, config.storage.directory);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
tick_interval_ms = 33
zones = ["harbour", "market"]
max_clients = 250

[storage]
directory = "/srv/objects"
persist_on_shutdown = false

[logging]
level = "debug"
json_format = true
file_path = "/tmp/sync.log"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();

        assert_eq!(config.server.tick_interval_ms, 33);
        assert_eq!(config.server.zones, vec!["harbour", "market"]);
        assert_eq!(config.server.max_clients, 250);
        assert_eq!(config.server.outbox_capacity, 64);
        assert_eq!(config.storage.directory, "/srv/objects");
        assert!(!config.storage.persist_on_shutdown);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.logging.file_path, Some("/tmp/sync.log".to_string()));
    }

    #[test]
    fn test_serde_deserialization_with_defaults() {
        let toml_content = r#"
[server]

[logging]
level = "warn"
json_format = false
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.server.zones, vec!["world"]);
        assert_eq!(config.storage.directory, "data/objects");
        assert!(config.storage.persist_on_shutdown);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[server\nzones = 3").await.unwrap();

        let result = AppConfig::load_from_file(&temp_file.path().to_path_buf()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zones() {
        let mut config = AppConfig::default();

        config.server.zones.clear();
        assert!(config.validate().unwrap_err().contains("At least one zone"));

        config.server.zones = vec!["harbour".to_string(), " ".to_string()];
        assert!(config.validate().unwrap_err().contains("cannot be empty"));

        config.server.zones = vec!["harbour".to_string(), "harbour".to_string()];
        assert!(config.validate().unwrap_err().contains("Duplicate zone name"));
    }

    #[test]
    fn test_validation_limits() {
        let mut config = AppConfig::default();
        config.server.max_clients = 0;
        assert!(config.validate().unwrap_err().contains("max_clients"));

        let mut config = AppConfig::default();
        config.server.outbox_capacity = 0;
        assert!(config.validate().unwrap_err().contains("outbox_capacity"));
    }

    #[test]
    fn test_validation_empty_storage_directory() {
        let mut config = AppConfig::default();
        config.storage.directory = String::new();

        let result = config.validate();
        assert!(result.unwrap_err().contains("Storage directory cannot be empty"));
    }

    #[test]
    fn test_validation_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level '{}' should be valid", level);
        }

        let mut config = AppConfig::default();
        config.logging.level = "invalid_level".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }
}
