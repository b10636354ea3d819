//! Core configuration loaded from JSON.
//!
//! # Invariants
//! - Missing keys fall back to defaults; unknown keys are rejected.
//! - A loaded config has passed `validate`.

use crate::tx::Isolation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Transaction defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionSettings {
    /// Applied to physical transactions that declare no timeout.
    pub default_timeout_seconds: Option<u64>,
    /// Applied to physical transactions that request the default isolation.
    pub default_isolation: Isolation,
    /// Whether in-memory connections accept savepoints.
    pub savepoints: bool,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            default_timeout_seconds: None,
            default_isolation: Isolation::Default,
            savepoints: true,
        }
    }
}

impl TransactionSettings {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub transaction: TransactionSettings,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            transaction: TransactionSettings::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];
        let level = self.log_level.trim().to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unsupported log_level `{}`",
                self.log_level
            )));
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be absolute, got `{}`",
                    dir.display()
                )));
            }
        }
        if self.transaction.default_timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "transaction.default_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
