use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::service::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ROSTERD_TIMEZONE: unknown timezone {0:?}")]
    Timezone(String),
}

/// Process settings, read from `ROSTERD_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub compact_threshold: u64,
    pub retry: RetryPolicy,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            timezone: chrono_tz::UTC,
            compact_threshold: 1000,
            retry: RetryPolicy::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Numbers that fail to parse keep their
    /// default; a bad timezone is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let timezone = match lookup("ROSTERD_TIMEZONE") {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|_| ConfigError::Timezone(name.clone()))?,
            None => defaults.timezone,
        };

        Ok(Self {
            data_dir: lookup("ROSTERD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            timezone,
            compact_threshold: parsed("ROSTERD_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            retry: RetryPolicy {
                attempts: parsed("ROSTERD_CONFLICT_RETRIES")
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(defaults.retry.attempts),
                backoff: parsed("ROSTERD_RETRY_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
            metrics_port: lookup("ROSTERD_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("rosterd.wal")
    }
}
