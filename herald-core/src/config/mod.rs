//! Configuration management for Herald
//!
//! Defaults, environment overrides and TOML files. Durations are written in
//! humantime form (`"1h"`, `"90days"`).

use crate::logging::LogLevel;
use nostr::RelayUrl;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

mod error;

pub use error::ConfigError;

const DAY: u64 = 24 * 60 * 60;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay policy
    pub relays: RelayConfig,

    /// Freshness-gated loading
    pub loader: LoaderConfig,

    /// Read-receipt batching
    pub receipts: ReceiptConfig,

    /// Envelope defaults
    pub wrap: WrapConfig,

    /// Media upload polling
    pub upload: UploadConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Relay policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relays every key share and profile is also sent to
    pub platform_relays: Vec<String>,

    /// Upper bound on relays per publish target (`None` = unbounded)
    pub max_relays_per_target: Option<usize>,
}

/// Freshness-gated loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base refetch interval for profiles
    #[serde(with = "humantime_serde")]
    pub profile_delta: Duration,

    /// Base refetch interval for relay lists
    #[serde(with = "humantime_serde")]
    pub relay_list_delta: Duration,

    /// Base refetch interval for group definitions
    #[serde(with = "humantime_serde")]
    pub group_delta: Duration,

    /// Clear an identity's backoff once fresh data for it arrives
    pub reset_backoff_on_success: bool,
}

/// Read-receipt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    /// Pending ids kept purely local before publishing
    pub optimistic_threshold: usize,

    /// Event ids per published marker
    pub chunk_size: usize,

    /// Marker lifetime on relays
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
}

/// Envelope configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapConfig {
    /// Lifetime of key shares, invites and access requests on relays
    #[serde(with = "humantime_serde")]
    pub key_share_expiration: Duration,
}

/// Media upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Total wall-clock time spent waiting for delayed processing
    #[serde(with = "humantime_serde")]
    pub poll_budget: Duration,

    /// Delay between processing checks
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            profile_delta: Duration::from_secs(60 * 60),
            relay_list_delta: Duration::from_secs(60 * 60),
            group_delta: Duration::from_secs(60 * 60),
            reset_backoff_on_success: true,
        }
    }
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            optimistic_threshold: 100,
            chunk_size: 500,
            expiration: Duration::from_secs(90 * DAY),
        }
    }
}

impl Default for WrapConfig {
    fn default() -> Self {
        Self { key_share_expiration: Duration::from_secs(30 * DAY) }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { poll_budget: Duration::from_secs(60), poll_interval: Duration::from_secs(3) }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn parse_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env { var, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

fn parse_env_duration(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|e| ConfigError::Env { var, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: HERALD_<SECTION>_<KEY>
    /// Example: HERALD_RECEIPTS_CHUNK_SIZE=250
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Relays
        if let Ok(relays) = env::var("HERALD_RELAYS_PLATFORM_RELAYS") {
            config.relays.platform_relays = relays
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(max) = parse_env("HERALD_RELAYS_MAX_PER_TARGET")? {
            config.relays.max_relays_per_target = Some(max);
        }

        // Loader
        if let Some(d) = parse_env_duration("HERALD_LOADER_PROFILE_DELTA")? {
            config.loader.profile_delta = d;
        }
        if let Some(d) = parse_env_duration("HERALD_LOADER_RELAY_LIST_DELTA")? {
            config.loader.relay_list_delta = d;
        }
        if let Some(d) = parse_env_duration("HERALD_LOADER_GROUP_DELTA")? {
            config.loader.group_delta = d;
        }
        if let Some(reset) = parse_env("HERALD_LOADER_RESET_BACKOFF")? {
            config.loader.reset_backoff_on_success = reset;
        }

        // Receipts
        if let Some(t) = parse_env("HERALD_RECEIPTS_OPTIMISTIC_THRESHOLD")? {
            config.receipts.optimistic_threshold = t;
        }
        if let Some(size) = parse_env("HERALD_RECEIPTS_CHUNK_SIZE")? {
            config.receipts.chunk_size = size;
        }
        if let Some(d) = parse_env_duration("HERALD_RECEIPTS_EXPIRATION")? {
            config.receipts.expiration = d;
        }

        // Wrap
        if let Some(d) = parse_env_duration("HERALD_WRAP_KEY_SHARE_EXPIRATION")? {
            config.wrap.key_share_expiration = d;
        }

        // Upload
        if let Some(d) = parse_env_duration("HERALD_UPLOAD_POLL_BUDGET")? {
            config.upload.poll_budget = d;
        }
        if let Some(d) = parse_env_duration("HERALD_UPLOAD_POLL_INTERVAL")? {
            config.upload.poll_interval = d;
        }

        // Logging
        if let Ok(level) = env::var("HERALD_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = parse_env("HERALD_LOG_JSON")? {
            config.logging.json_format = json;
        }

        // Metrics
        if let Some(enabled) = parse_env("HERALD_METRICS_ENABLED")? {
            config.metrics.enabled = enabled;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.relays.platform_relays.iter().find(|r| RelayUrl::parse(r).is_err()) {
            return Err(ConfigError::InvalidRelayUrl(bad.clone()));
        }

        if self.relays.max_relays_per_target == Some(0) {
            return Err(ConfigError::Zero("max_relays_per_target"));
        }

        let deltas = [
            ("profile_delta", self.loader.profile_delta),
            ("relay_list_delta", self.loader.relay_list_delta),
            ("group_delta", self.loader.group_delta),
        ];
        for (name, delta) in deltas {
            if delta.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }

        if self.receipts.chunk_size == 0 {
            return Err(ConfigError::Zero("chunk_size"));
        }
        if self.receipts.expiration.is_zero() {
            return Err(ConfigError::Zero("receipts.expiration"));
        }
        if self.wrap.key_share_expiration.is_zero() {
            return Err(ConfigError::Zero("key_share_expiration"));
        }

        if self.upload.poll_interval.is_zero() {
            return Err(ConfigError::Zero("poll_interval"));
        }
        if self.upload.poll_interval > self.upload.poll_budget {
            return Err(ConfigError::PollIntervalExceedsBudget);
        }

        // Same parser the subscriber setup uses
        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_toml_string()?;

        std::fs::write(path, contents)
            .map_err(|source| ConfigError::FileWrite { path: path.to_path_buf(), source })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.receipts.optimistic_threshold, 100);
        assert_eq!(config.receipts.chunk_size, 500);
        assert_eq!(config.receipts.expiration, Duration::from_secs(90 * DAY));
        assert_eq!(config.wrap.key_share_expiration, Duration::from_secs(30 * DAY));
        assert!(config.loader.reset_backoff_on_success);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.receipts.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Zero("chunk_size"))));

        config = Config::default();
        config.upload.poll_interval = Duration::from_secs(120);
        assert!(matches!(config.validate(), Err(ConfigError::PollIntervalExceedsBudget)));

        config = Config::default();
        config.loader.profile_delta = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Zero("profile_delta"))));
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogLevel(l)) if l == "invalid"));

        config.logging.level = "WARNING".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relay_urls_must_be_websocket() {
        let mut config = Config::default();
        for bad in ["https://relay.example.com", "relay.example.com", "wss://a.com://b"] {
            config.relays.platform_relays = vec![bad.to_string()];
            assert!(matches!(config.validate(), Err(ConfigError::InvalidRelayUrl(u)) if u == bad));
        }

        config.relays.platform_relays =
            vec!["wss://relay.example.com".to_string(), "ws://localhost:7777".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.toml");

        let mut config = Config::default();
        config.relays.platform_relays = vec!["wss://relay.example.com".to_string()];
        config.receipts.chunk_size = 250;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.relays.platform_relays, config.relays.platform_relays);
        assert_eq!(loaded.receipts.chunk_size, 250);
        assert_eq!(loaded.upload.poll_budget, Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[receipts]\nchunk_size = 10\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.receipts.chunk_size, 10);
        assert_eq!(loaded.receipts.optimistic_threshold, 100);
        assert_eq!(loaded.wrap.key_share_expiration, Duration::from_secs(30 * DAY));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::from_file("/nonexistent/herald.toml");
        match result {
            Err(ConfigError::FileRead { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/herald.toml"))
            }
            other => panic!("expected read error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[receipts\nchunk_size = ").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_logging_section_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logging.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\njson_format = true\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.logging.level, "debug");
        assert!(loaded.logging.json_format);
        assert!(loaded.logging.with_timestamp);
    }
}
