//! Configuration for the results ingester.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_result_limit")]
    pub result_limit: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    crate::ergast::BASE_URL.to_string()
}

fn default_result_limit() -> u32 {
    crate::ergast::RESULT_LIMIT
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    format!("f1-results/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            result_limit: default_result_limit(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/database/database.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Optional log file, written in addition to stderr
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_filter() -> String {
    "f1_results=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (F1_API__TIMEOUT_MS, etc.)
            .add_source(
                config::Environment::with_prefix("F1")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, "http://ergast.com/api/f1/");
        assert_eq!(config.api.result_limit, 1000);
        assert_eq!(config.api.timeout_ms, 5_000);
        assert_eq!(config.storage.db_path, PathBuf::from("data/database/database.db"));
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"api": {"timeout_ms": 250}, "logging": {"file": "ingest.log"}}"#)
                .unwrap();
        assert_eq!(config.api.timeout_ms, 250);
        assert_eq!(config.api.result_limit, 1000);
        assert_eq!(config.logging.filter, "f1_results=info");
        assert_eq!(config.logging.file.as_deref(), Some("ingest.log"));
    }

    #[test]
    fn test_db_path_deserializes_as_path() {
        let config: AppConfig =
            serde_json::from_str(r#"{"storage": {"db_path": "/tmp/f1/results.db"}}"#).unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/f1/results.db"));
        assert_eq!(config.storage.db_path.file_name().unwrap(), "results.db");
    }
}
