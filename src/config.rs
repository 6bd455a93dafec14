//! Configuration management with validation and defaults
//!
//! Loaded from TOML, then overridden by `LOTTOLINE_*` environment variables.

use crate::errors::{ConfigurationError, LottoResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "LOTTOLINE_DATA_DIR";
pub const ENV_MAX_CONCURRENT_UNITS: &str = "LOTTOLINE_MAX_CONCURRENT_UNITS";
pub const ENV_LOG_LEVEL: &str = "LOTTOLINE_LOG_LEVEL";

/// Service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LottoConfig {
    pub settlement: SettlementConfig,
    pub matching: MatchingConfig,
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
}

/// Settlement orchestration settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettlementConfig {
    /// Upper bound on per-bet atomic units in flight for one draw
    pub max_concurrent_units: usize,
    /// Fresh references tried after a ledger reference collision
    pub reference_retry_limit: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_concurrent_units: 8,
            reference_retry_limit: 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    /// `direct_five` needs five winning numbers; off restores the four-number gate
    pub strict_direct_five: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            strict_direct_five: true,
        }
    }
}

/// Storage location
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub create_if_missing: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./DB/lottoline_data"),
            create_if_missing: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigValidationError::InvalidValue(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

impl LottoConfig {
    /// Throwaway settings for tests: serial settlement, no persistence assumptions.
    pub fn testing() -> Self {
        Self {
            settlement: SettlementConfig {
                max_concurrent_units: 1,
                ..Default::default()
            },
            storage: StorageConfig {
                data_directory: std::env::temp_dir().join("lottoline_test_data"),
                create_if_missing: true,
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
            },
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            settlement: SettlementConfig {
                max_concurrent_units: 16,
                reference_retry_limit: 1,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./DB/lottoline_data"),
                create_if_missing: false,
            },
            ..Default::default()
        }
    }

    /// Read a TOML file; absent sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> LottoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("{}: {}", path.display(), e))
        })?;
        let config: LottoConfig = toml::from_str(&text)?;
        Ok(config)
    }

    /// Apply `LOTTOLINE_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigValidationError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage.data_directory = PathBuf::from(dir);
        }
        if let Some(units) = lookup(ENV_MAX_CONCURRENT_UNITS) {
            self.settlement.max_concurrent_units = units.trim().parse().map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_MAX_CONCURRENT_UNITS, units
                ))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.monitoring.log_level = level.parse()?;
        }
        Ok(())
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.settlement.max_concurrent_units == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_concurrent_units must be > 0".to_string(),
            ));
        }

        if self.storage.data_directory.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidValue(String),
    MissingRequired(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigValidationError::MissingRequired(msg) => write!(f, "Missing required configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

impl From<ConfigValidationError> for ConfigurationError {
    fn from(e: ConfigValidationError) -> Self {
        ConfigurationError::InvalidValue {
            field: "config".to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<ConfigValidationError> for crate::errors::LottoError {
    fn from(e: ConfigValidationError) -> Self {
        crate::errors::LottoError::Configuration(e.into())
    }
}
