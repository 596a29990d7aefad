use std::env;

use crate::logger::Logger;

/// Which logger table to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogProfile {
    /// Trace everything, never crash.
    #[default]
    Default,
    /// Crash on fatal, trace the rest.
    Development,
    /// Crash on fatal, ignore the rest.
    Production,
}

impl LogProfile {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Self::Development,
            "prod" | "production" => Self::Production,
            _ => Self::Default,
        }
    }
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub log_profile: LogProfile,
}

impl Config {
    /// Env vars:
    /// - `LOOPSTATE_LOG_PROFILE`: `dev`/`development`, `prod`/`production`;
    ///   unset or anything else selects the default profile
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_profile: lookup("LOOPSTATE_LOG_PROFILE")
                .map(|raw| LogProfile::parse(&raw))
                .unwrap_or_default(),
        }
    }

    pub fn logger(&self) -> Logger {
        match self.log_profile {
            LogProfile::Default => Logger::default(),
            LogProfile::Development => Logger::development(),
            LogProfile::Production => Logger::production(),
        }
    }
}
