//! Configuration for the activity pipeline.

use crate::core::records::LogCategory;
use crate::core::segmentation::DEFAULT_CLICK_INTERVAL_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory name used under the platform config/data dirs.
pub const APP_DIR: &str = "synheart-activity";

/// Main configuration shared by every role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the durable log store and transparency stats
    pub data_path: PathBuf,

    /// Which input sources to capture
    pub sources: SourceConfig,

    /// Click-rate sampling interval
    #[serde(with = "duration_serde")]
    pub click_interval: Duration,

    /// Age at which capture seals a segment for processing
    #[serde(with = "duration_serde")]
    pub segment_max_age: Duration,

    /// IANA timezone used for default aggregation days
    pub timezone: String,

    /// Upper bound for each child role run by the scheduled trigger
    #[serde(with = "duration_serde")]
    pub trigger_timeout: Duration,

    pub processing: ProcessingConfig,

    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            data_path: data_dir,
            sources: SourceConfig::default(),
            click_interval: Duration::from_secs(DEFAULT_CLICK_INTERVAL_SECS),
            segment_max_age: Duration::from_secs(15 * 60),
            timezone: "UTC".to_string(),
            trigger_timeout: Duration::from_secs(30 * 60),
            processing: ProcessingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Root directory of the log store.
    pub fn store_path(&self) -> PathBuf {
        self.data_path.join("logs")
    }

    /// Where transparency statistics are persisted.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Parsed aggregation timezone.
    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Reject values no role can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.click_interval.is_zero() {
            return Err(ConfigError::Invalid("click_interval must be positive".into()));
        }
        if self.segment_max_age.is_zero() {
            return Err(ConfigError::Invalid("segment_max_age must be positive".into()));
        }
        if self.trigger_timeout.is_zero() {
            return Err(ConfigError::Invalid("trigger_timeout must be positive".into()));
        }
        if self.processing.batch_size == 0 {
            return Err(ConfigError::Invalid("processing.batch_size must be positive".into()));
        }
        if self.embedding.dims == 0 {
            return Err(ConfigError::Invalid("embedding.dims must be positive".into()));
        }
        if self.embedding.backend == EmbeddingBackend::Http && self.embedding.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "embedding.endpoint is required for the http backend".into(),
            ));
        }
        self.tz()?;
        Ok(())
    }
}

/// Configuration for which input sources to capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub keyboard: bool,
    pub mouse: bool,
    pub window: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
            window: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            keyboard: sources.iter().any(|s| s == "keyboard" || s == "all"),
            mouse: sources.iter().any(|s| s == "mouse" || s == "all"),
            window: sources.iter().any(|s| s == "window" || s == "all"),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.keyboard || self.mouse || self.window
    }
}

/// Processing-stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Categories drained on each run
    pub categories: Vec<LogCategory>,
    /// Records per embedding call when the service supports batching
    pub batch_size: usize,
    /// Age after which an in-progress claim is returned to pending.
    /// `None` leaves abandoned claims for an operator.
    pub stale_claim_secs: Option<u64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            categories: LogCategory::ALL.to_vec(),
            batch_size: 32,
            stale_claim_secs: None,
        }
    }
}

/// Which embedding implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature hashing
    Hashing,
    /// OpenAI-compatible HTTP endpoint
    Http,
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dims: usize,
    /// Base URL for the http backend, e.g. `http://localhost:11434/v1`
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model: "feature-hash-v1".to_string(),
            dims: 256,
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_config_parsing() {
        let config = SourceConfig::from_csv("keyboard,mouse");
        assert!(config.keyboard);
        assert!(config.mouse);
        assert!(!config.window);

        let config = SourceConfig::from_csv("window");
        assert!(!config.keyboard);
        assert!(config.window);

        let config = SourceConfig::from_csv("all");
        assert!(config.keyboard && config.mouse && config.window);

        assert!(!SourceConfig::from_csv("clipboard").any_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.click_interval, Duration::from_secs(60));
        assert_eq!(config.processing.categories.len(), 3);
        assert!(config.processing.stale_claim_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"click_interval": 30, "timezone": "Europe/Berlin"}"#).unwrap();
        assert_eq!(config.click_interval, Duration::from_secs(30));
        assert_eq!(config.processing.batch_size, 32);
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.processing.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embedding.backend = EmbeddingBackend::Http;
        assert!(config.validate().is_err());
        config.embedding.endpoint = Some("http://localhost:8080/v1".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.data_path = dir.path().join("data");
        config.processing.stale_claim_secs = Some(3600);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.data_path, config.data_path);
        assert_eq!(loaded.processing.stale_claim_secs, Some(3600));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.timezone, "UTC");
    }
}
