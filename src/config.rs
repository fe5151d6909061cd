//! Configuration types for bidi-har

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::{HarError, Result};

/// Default upper bound for collected request/response bodies (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of concurrent `network.getData` commands
pub const DEFAULT_MAX_CONCURRENT_GET_DATA: usize = 4;

/// Default timeout for a single body fetch, in milliseconds
pub const DEFAULT_GET_DATA_TIMEOUT_MS: u64 = 5000;

/// Hook applied to every header and cookie value before export.
///
/// Receives the header name and the raw value, returns the value to store.
pub type HeaderValueFormatter = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Browser name reported in the archive
    pub browser: String,
    /// Browser version reported in the archive
    pub version: String,
    /// Emit per-event trace logs
    #[serde(default)]
    pub debug_logs: bool,
}

impl RecorderConfig {
    /// Create a configuration for the given browser
    pub fn new(browser: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            browser: browser.into(),
            version: version.into(),
            debug_logs: false,
        }
    }

    /// Enable or disable debug logs
    #[must_use]
    pub fn with_debug_logs(mut self, debug_logs: bool) -> Self {
        self.debug_logs = debug_logs;
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if the browser name or version is empty
    pub fn validate(&self) -> Result<()> {
        if self.browser.trim().is_empty() {
            return Err(HarError::Configuration("Missing browser option".to_string()));
        }

        if self.version.trim().is_empty() {
            return Err(HarError::Configuration("Missing version option".to_string()));
        }

        Ok(())
    }
}

/// Batch exporter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionExporterConfig {
    /// Browser name reported in the archive
    #[serde(default = "default_browser")]
    pub browser: String,
    /// Browser version reported in the archive
    #[serde(default = "default_version")]
    pub version: String,
    /// Emit per-event trace logs
    #[serde(default)]
    pub debug_logs: bool,
}

fn default_browser() -> String {
    "firefox".to_string()
}

fn default_version() -> String {
    "111.0a1".to_string()
}

impl Default for CollectionExporterConfig {
    fn default() -> Self {
        Self {
            browser: default_browser(),
            version: default_version(),
            debug_logs: false,
        }
    }
}

impl From<CollectionExporterConfig> for RecorderConfig {
    fn from(config: CollectionExporterConfig) -> Self {
        Self {
            browser: config.browser,
            version: config.version,
            debug_logs: config.debug_logs,
        }
    }
}

/// Live recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Browsing contexts to monitor
    pub browsing_context_ids: Vec<String>,
    /// Emit per-event trace logs
    #[serde(default)]
    pub debug_logs: bool,
    /// Maximum encoded body size kept by the data collector
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
    /// Maximum number of in-flight body fetches
    #[serde(default = "default_max_concurrent_get_data")]
    pub max_concurrent_get_data: usize,
    /// Timeout for a single body fetch, in milliseconds
    #[serde(default = "default_get_data_timeout_ms")]
    pub get_data_timeout_ms: u64,
    /// Skip the data collector entirely
    #[serde(default)]
    pub skip_body_data: bool,
}

fn default_max_body_size() -> u64 {
    DEFAULT_MAX_BODY_SIZE
}

fn default_max_concurrent_get_data() -> usize {
    DEFAULT_MAX_CONCURRENT_GET_DATA
}

fn default_get_data_timeout_ms() -> u64 {
    DEFAULT_GET_DATA_TIMEOUT_MS
}

impl LiveConfig {
    /// Create a configuration monitoring the given contexts, other options defaulted
    #[must_use]
    pub fn new(browsing_context_ids: Vec<String>) -> Self {
        Self {
            browsing_context_ids,
            debug_logs: false,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_concurrent_get_data: DEFAULT_MAX_CONCURRENT_GET_DATA,
            get_data_timeout_ms: DEFAULT_GET_DATA_TIMEOUT_MS,
            skip_body_data: false,
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarError::Configuration(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| HarError::Configuration(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if concurrency or timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_get_data == 0 {
            return Err(HarError::Configuration(
                "max_concurrent_get_data must be > 0".to_string(),
            ));
        }

        if self.get_data_timeout_ms == 0 {
            return Err(HarError::Configuration(
                "get_data_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_recorder_config_validation() {
        assert!(RecorderConfig::new("firefox", "112.0").validate().is_ok());

        let err = RecorderConfig::new("", "112.0").validate().unwrap_err();
        assert!(matches!(err, HarError::Configuration(_)));

        let err = RecorderConfig::new("firefox", " ").validate().unwrap_err();
        assert!(matches!(err, HarError::Configuration(_)));
    }

    #[test]
    fn test_live_config_defaults() {
        let config: LiveConfig = toml::from_str(r#"browsing_context_ids = ["ctx-1"]"#).unwrap();

        assert_eq!(config.browsing_context_ids, vec!["ctx-1".to_string()]);
        assert_eq!(config.max_body_size, 10_485_760);
        assert_eq!(config.max_concurrent_get_data, DEFAULT_MAX_CONCURRENT_GET_DATA);
        assert_eq!(config.get_data_timeout_ms, DEFAULT_GET_DATA_TIMEOUT_MS);
        assert!(!config.skip_body_data);
        assert!(!config.debug_logs);
    }

    #[test]
    fn test_live_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            browsing_context_ids = ["ctx-1", "ctx-2"]
            debug_logs = true
            max_concurrent_get_data = 2
            get_data_timeout_ms = 250
            skip_body_data = true
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = LiveConfig::from_file(file.path()).unwrap();
        assert_eq!(config.browsing_context_ids.len(), 2);
        assert_eq!(config.max_concurrent_get_data, 2);
        assert_eq!(config.get_data_timeout_ms, 250);
        assert!(config.skip_body_data);
    }

    #[test]
    fn test_invalid_live_config_zero_concurrency() {
        let mut config = LiveConfig::new(vec![]);
        config.max_concurrent_get_data = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exporter_config_defaults() {
        let config: CollectionExporterConfig = toml::from_str("").unwrap();
        assert_eq!(config, CollectionExporterConfig::default());

        let recorder: RecorderConfig = config.into();
        assert_eq!(recorder.browser, "firefox");
        assert_eq!(recorder.version, "111.0a1");
    }
}
