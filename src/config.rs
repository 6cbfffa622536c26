use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::db::Granularity;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub tomorrow_api_key: String,
    pub tomorrow_api_base_url: String,
    pub api_timeout_seconds: u64,
    pub api_max_retries: usize,
    pub fetch_interval_minutes: u64,
    pub forecast_hours: i64,
    pub historical_hours: i64,
    pub data_granularity: Granularity,
    pub request_delay_seconds: u64,
    pub pool_size: u32,
    pub pool_acquire_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            database_url: required("DATABASE_URL")?,
            tomorrow_api_key: required("TOMORROW_API_KEY")?,
            tomorrow_api_base_url: env::var("TOMORROW_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.tomorrow.io/v4".to_string()),
            api_timeout_seconds: parsed_or("TOMORROW_API_TIMEOUT_SECONDS", 30)?,
            api_max_retries: parsed_or("TOMORROW_API_MAX_RETRIES", 5)?,
            fetch_interval_minutes: parsed_or("FETCH_INTERVAL_MINUTES", 60)?,
            forecast_hours: parsed_or("FETCH_FORECAST_HOURS", 120)?,
            historical_hours: parsed_or("FETCH_HISTORICAL_HOURS", 24)?,
            data_granularity: parsed_or("DATA_GRANULARITY", Granularity::Hourly)?,
            request_delay_seconds: parsed_or("REQUEST_DELAY_SECONDS", 3)?,
            pool_size: parsed_or("PG_POOL_SIZE", 5)?,
            pool_acquire_timeout_seconds: parsed_or("PG_POOL_TIMEOUT_SECONDS", 30)?,
        })
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_acquire_timeout_seconds)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_seconds)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var: name, value }),
        Err(_) => Ok(default),
    }
}
