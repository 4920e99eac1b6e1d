//! Configuration for Pulse Sentinel.

use crate::core::{ForestSettings, ManagerSettings, DEFAULT_MODEL_KEY, DEFAULT_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Readings strictly above this are labeled abnormal
    pub threshold: i32,

    /// Retrain whenever the buffer length is a multiple of this
    pub retrain_interval: usize,

    /// Delay between loop iterations, in milliseconds
    #[serde(with = "duration_millis")]
    pub poll_delay: Duration,

    /// How long a single read waits for a line
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,

    /// Tag in front of each reading on the input stream
    pub line_prefix: String,

    /// Input device or file; `-` reads stdin
    pub input: String,

    /// Where the model and events are stored
    pub storage: StorageConfig,

    /// Classifier hyper-parameters
    pub forest: ForestSettings,

    /// Base seed for bootstrap sampling
    pub seed: u64,

    /// Path for local stores and session stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse-sentinel");

        Self {
            threshold: crate::core::DEFAULT_THRESHOLD,
            retrain_interval: 10,
            poll_delay: Duration::from_millis(1000),
            read_timeout: Duration::from_millis(1000),
            line_prefix: DEFAULT_PREFIX.to_string(),
            input: "-".to_string(),
            storage: StorageConfig::default(),
            forest: ForestSettings::default(),
            seed: 42,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse-sentinel")
            .join("config.json")
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrain_interval == 0 {
            return Err(ConfigError::Invalid(
                "retrain_interval must be at least 1".to_string(),
            ));
        }
        if self.forest.n_trees == 0 {
            return Err(ConfigError::Invalid(
                "forest.n_trees must be at least 1".to_string(),
            ));
        }
        if self.line_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("line_prefix must not be empty".to_string()));
        }
        if self.storage.model_key.is_empty() {
            return Err(ConfigError::Invalid("storage.model_key must not be empty".to_string()));
        }
        if self.storage.backend == StorageBackend::Remote && self.storage.remote_url.is_none() {
            return Err(ConfigError::Invalid(
                "storage.remote_url is required for the remote backend".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Settings for the classifier manager.
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            retrain_interval: self.retrain_interval,
            model_key: self.storage.model_key.clone(),
            forest: self.forest.clone(),
            seed: self.seed,
        }
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("session_stats.json")
    }
}

/// Which storage implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Files under the data directory
    Local,
    /// HTTP object and document service
    Remote,
    /// Nothing survives the process
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "remote" => Ok(StorageBackend::Remote),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::Invalid(format!(
                "Unknown storage backend '{other}' (expected local, remote or memory)"
            ))),
        }
    }
}

/// Identifiers for the model artifact and the event collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Key of the model artifact
    pub model_key: String,
    /// Bucket holding model artifacts
    pub bucket: String,
    /// Collection receiving event records
    pub event_collection: String,
    /// Base URL for the remote backend
    pub remote_url: Option<String>,
    /// Bearer token for the remote backend
    pub remote_token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            model_key: DEFAULT_MODEL_KEY.to_string(),
            bucket: "heart-models".to_string(),
            event_collection: "heart_rate_data".to_string(),
            remote_url: None,
            remote_token: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.threshold, 100);
        assert_eq!(config.retrain_interval, 10);
        assert_eq!(config.poll_delay, Duration::from_secs(1));
        assert_eq!(config.line_prefix, "BPM: ");
        assert_eq!(config.storage.model_key, "heart_model");
        assert_eq!(config.storage.event_collection, "heart_rate_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "threshold": 120, "poll_delay": 3000 }"#).unwrap();
        assert_eq!(config.threshold, 120);
        assert_eq!(config.poll_delay, Duration::from_secs(3));
        assert_eq!(config.retrain_interval, 10);
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_validation() {
        let mut config = Config {
            retrain_interval: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.retrain_interval = 5;
        config.storage.backend = StorageBackend::Remote;
        assert!(config.validate().is_err());

        config.storage.remote_url = Some("http://127.0.0.1:8080".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!("Remote".parse::<StorageBackend>().unwrap(), StorageBackend::Remote);
        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("pulse-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let config = Config {
            threshold: 110,
            read_timeout: Duration::from_millis(250),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.threshold, 110);
        assert_eq!(loaded.read_timeout, Duration::from_millis(250));

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn test_sub_second_poll_delay_survives_save() {
        let path = std::env::temp_dir()
            .join(format!("pulse-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let config = Config {
            poll_delay: Duration::from_millis(500),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.poll_delay, Duration::from_millis(500));

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
