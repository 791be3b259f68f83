//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    FileRead { path: PathBuf, source: std::io::Error },

    #[error("Cannot write {path}: {source}")]
    FileWrite { path: PathBuf, source: std::io::Error },

    #[error("Malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// `HERALD_*` variable that does not parse
    #[error("Bad value in {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Not a websocket relay url: {0}")]
    InvalidRelayUrl(String),

    #[error("Unknown log level: {0}")]
    InvalidLogLevel(String),

    /// Setting that must be non-zero
    #[error("{0} must be non-zero")]
    Zero(&'static str),

    #[error("poll_interval must not exceed poll_budget")]
    PollIntervalExceedsBudget,
}
