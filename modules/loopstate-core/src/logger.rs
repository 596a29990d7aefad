//! Severity-routed reporting for conditions the store cannot handle itself.
//!
//! The store reports through a `Logger`: a fixed table mapping each
//! `Severity` to a `LogStrategy`. Tables are built once, at process or host
//! initialization, and handed to the store builder.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The store cannot continue (e.g. the reducer failed).
    Fatal,
    /// Something went wrong but the store keeps running (e.g. an actor failed).
    NonFatal,
    /// Diagnostics about misuse or unusual but harmless situations.
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::NonFatal => write!(f, "nonfatal"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// What to do with a report of a given severity.
pub trait LogStrategy: Send + Sync {
    fn log(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>);
}

/// Forwards reports to `tracing`: fatal → error, non-fatal → warn, debug → debug.
pub struct TracingLog;

impl LogStrategy for TracingLog {
    fn log(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>) {
        match (severity, error) {
            (Severity::Fatal, Some(e)) => error!(error = %e, "{message}"),
            (Severity::Fatal, None) => error!("{message}"),
            (Severity::NonFatal, Some(e)) => warn!(error = %e, "{message}"),
            (Severity::NonFatal, None) => warn!("{message}"),
            (Severity::Debug, Some(e)) => debug!(error = %e, "{message}"),
            (Severity::Debug, None) => debug!("{message}"),
        }
    }
}

/// Drops every report.
pub struct IgnoreLog;

impl LogStrategy for IgnoreLog {
    fn log(&self, _severity: Severity, _message: &str, _error: Option<&anyhow::Error>) {}
}

/// Logs the report as an error, then panics.
pub struct Crash;

impl LogStrategy for Crash {
    fn log(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>) {
        match error {
            Some(e) => {
                error!(%severity, error = %e, "{message}");
                panic!("{severity}: {message}: {e:#}");
            }
            None => {
                error!(%severity, "{message}");
                panic!("{severity}: {message}");
            }
        }
    }
}

/// Strategy table, one entry per severity.
#[derive(Clone)]
pub struct Logger {
    fatal: Arc<dyn LogStrategy>,
    nonfatal: Arc<dyn LogStrategy>,
    debug: Arc<dyn LogStrategy>,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Crash on fatal, ignore everything else.
    pub fn production() -> Self {
        Self::builder()
            .fatal(Crash)
            .nonfatal(IgnoreLog)
            .debug(IgnoreLog)
            .build()
    }

    /// Crash on fatal, trace everything else.
    pub fn development() -> Self {
        Self::builder()
            .fatal(Crash)
            .nonfatal(TracingLog)
            .debug(TracingLog)
            .build()
    }

    pub fn fatal(&self, message: &str, error: Option<&anyhow::Error>) {
        self.fatal.log(Severity::Fatal, message, error);
    }

    pub fn nonfatal(&self, message: &str, error: Option<&anyhow::Error>) {
        self.nonfatal.log(Severity::NonFatal, message, error);
    }

    pub fn debug(&self, message: &str) {
        self.debug.log(Severity::Debug, message, None);
    }

    pub fn log(&self, severity: Severity, message: &str, error: Option<&anyhow::Error>) {
        match severity {
            Severity::Fatal => self.fatal(message, error),
            Severity::NonFatal => self.nonfatal(message, error),
            Severity::Debug => self.debug.log(severity, message, error),
        }
    }
}

/// Traces everything, never panics.
impl Default for Logger {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Unmapped severities fall back to `TracingLog`.
#[derive(Default)]
pub struct LoggerBuilder {
    fatal: Option<Arc<dyn LogStrategy>>,
    nonfatal: Option<Arc<dyn LogStrategy>>,
    debug: Option<Arc<dyn LogStrategy>>,
}

impl LoggerBuilder {
    pub fn fatal(mut self, strategy: impl LogStrategy + 'static) -> Self {
        self.fatal = Some(Arc::new(strategy));
        self
    }

    pub fn nonfatal(mut self, strategy: impl LogStrategy + 'static) -> Self {
        self.nonfatal = Some(Arc::new(strategy));
        self
    }

    pub fn debug(mut self, strategy: impl LogStrategy + 'static) -> Self {
        self.debug = Some(Arc::new(strategy));
        self
    }

    pub fn build(self) -> Logger {
        let fallback: Arc<dyn LogStrategy> = Arc::new(TracingLog);
        Logger {
            fatal: self.fatal.unwrap_or_else(|| fallback.clone()),
            nonfatal: self.nonfatal.unwrap_or_else(|| fallback.clone()),
            debug: self.debug.unwrap_or(fallback),
        }
    }
}
