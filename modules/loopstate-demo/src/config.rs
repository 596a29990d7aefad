use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be a whole number of milliseconds, got {value:?}")]
    InvalidMillis { key: &'static str, value: String },
}

/// Demo configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub debounce: Duration,
    pub queries: Vec<String>,
}

impl DemoConfig {
    /// Env vars:
    /// - `DEMO_DEBOUNCE_MS`: search debounce (default 300)
    /// - `DEMO_QUERIES`: comma-separated keystrokes to replay (default `r,ru,rus,rust`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let debounce = match lookup("DEMO_DEBOUNCE_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidMillis {
                    key: "DEMO_DEBOUNCE_MS",
                    value: raw,
                })?,
            None => Duration::from_millis(300),
        };

        let queries = lookup("DEMO_QUERIES")
            .unwrap_or_else(|| "r,ru,rus,rust".to_string())
            .split(',')
            .map(|q| q.trim().to_string())
            .collect();

        Ok(Self { debounce, queries })
    }
}
