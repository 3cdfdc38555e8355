use std::env;
use std::time::Duration;

use chrono_tz::Tz;
use reqwest::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.meteo.lt/v1";
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::Europe::Vilnius;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid base URL '{0}': {1}")]
    InvalidBaseUrl(String, String),
    #[error("Unknown time zone '{0}'")]
    InvalidTimeZone(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub time_zone: Tz,
    pub timeout_secs: u64,
    /// Pause after each successful day of a range fetch.
    pub range_delay_ms: u64,
    pub rate_limit_backoff_secs: u64,
    pub rate_limit_max_retries: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            time_zone: DEFAULT_TIME_ZONE,
            timeout_secs: 30,
            range_delay_ms: 150,
            rate_limit_backoff_secs: 5,
            rate_limit_max_retries: 12,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ClientConfig::default();

        let base_url = env::var("METEO_BASE_URL").unwrap_or(defaults.base_url);
        Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(base_url.clone(), e.to_string()))?;

        let time_zone = match env::var("METEO_TIME_ZONE") {
            Ok(name) => parse_time_zone(&name)?,
            Err(_) => defaults.time_zone,
        };

        Ok(ClientConfig {
            base_url,
            time_zone,
            // Zero counts as unset
            timeout_secs: env::var("METEO_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.timeout_secs),
            range_delay_ms: env::var("METEO_RANGE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.range_delay_ms),
            rate_limit_backoff_secs: env::var("METEO_RATE_LIMIT_BACKOFF_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_backoff_secs),
            rate_limit_max_retries: env::var("METEO_RATE_LIMIT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_max_retries),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn range_delay(&self) -> Duration {
        Duration::from_millis(self.range_delay_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

/// Parse an IANA zone name such as `Europe/Vilnius` or `UTC`.
pub fn parse_time_zone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimeZone(name.to_string()))
}
