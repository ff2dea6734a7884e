//! Configuration layer: typed settings with layered precedence
//! (defaults, then an optional file, then environment overrides).

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::Path,
    time::Duration,
};

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::TypeFilter;

const ENV_PREFIX: &str = "RINFRESCO";

const DEFAULT_WORKER_COUNT: NonZeroUsize = NonZeroUsize::new(6).unwrap();
const DEFAULT_PAGE_SIZE: NonZeroU64 = NonZeroU64::new(1000).unwrap();
const DEFAULT_MAX_TRIES: NonZeroU32 = NonZeroU32::new(3).unwrap();
const DEFAULT_REPORT_INTERVAL: NonZeroU64 = NonZeroU64::new(10).unwrap();
const DEFAULT_FAILURE_DELAY_SECS: u64 = 60;
const DEFAULT_HOURLY_BLOCK_SECS: u64 = 3600;
const DEFAULT_QUOTA_RESET_HOUR: u8 = 3;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl SettingsError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Root settings for one engine invocation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub refresh: RefreshSettings,
    pub backoff: BackoffSettings,
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// Load settings from an optional file plus `RINFRESCO_*`
    /// environment overrides (e.g. `RINFRESCO_REFRESH__WORKER_COUNT`).
    pub fn load(config_file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        let settings: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.backoff.quota_reset_hour >= 24 {
            return Err(SettingsError::invalid(format!(
                "backoff.quota_reset_hour must be below 24, got {}",
                self.backoff.quota_reset_hour
            )));
        }
        if self.backoff.failure_delay_secs == 0 {
            return Err(SettingsError::invalid(
                "backoff.failure_delay_secs must be at least 1",
            ));
        }
        if self.backoff.hourly_block_secs == 0 {
            return Err(SettingsError::invalid(
                "backoff.hourly_block_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Pool sizing, paging, and retry bounds for a refresh run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Parallel workers per type-run.
    pub worker_count: NonZeroUsize,
    /// Identifiers requested per index fetch.
    pub page_size: NonZeroU64,
    /// Provider attempts per identifier before giving up for this run.
    pub max_tries: NonZeroU32,
    /// Successes between throughput reports.
    pub report_interval: NonZeroU64,
    /// Ordered list of object models to walk, one type-run each.
    pub type_filters: Vec<TypeFilter>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            max_tries: DEFAULT_MAX_TRIES,
            report_interval: DEFAULT_REPORT_INTERVAL,
            type_filters: Vec::new(),
        }
    }
}

/// Pause lengths applied when the statistics provider rate-limits.
///
/// The daily-quota reset hour is interpreted in `quota_reset_zone`; the
/// provider documents the reset in its own zone, so the zone is left to
/// deployment configuration rather than baked in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub failure_delay_secs: u64,
    pub hourly_block_secs: u64,
    pub quota_reset_hour: u8,
    pub quota_reset_zone: Tz,
}

impl BackoffSettings {
    pub fn failure_delay(&self) -> Duration {
        Duration::from_secs(self.failure_delay_secs)
    }

    pub fn hourly_block(&self) -> Duration {
        Duration::from_secs(self.hourly_block_secs)
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            failure_delay_secs: DEFAULT_FAILURE_DELAY_SECS,
            hourly_block_secs: DEFAULT_HOURLY_BLOCK_SECS,
            quota_reset_hour: DEFAULT_QUOTA_RESET_HOUR,
            quota_reset_zone: Tz::UTC,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}
