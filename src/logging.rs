/// Structured logging for the flood alert service
///
/// Provides context-rich logging with source and site identifiers on top of
/// `tracing`. Supports console output and an append-mode log file for
/// scheduled runs, and classifies fetch failures so that a known-flaky
/// upstream does not drown the log in errors.
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::model::FetchError;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    OpenMeteo,
    GloFas,
    Gazetteer,
    Notifier,
    Store,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::OpenMeteo => write!(f, "OPEN-METEO"),
            DataSource::GloFas => write!(f, "GLOFAS"),
            DataSource::Gazetteer => write!(f, "CITIES"),
            DataSource::Notifier => write!(f, "NOTIFY"),
            DataSource::Store => write!(f, "STORE"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the upstream simply has nothing for this site
    Expected,
    /// Unexpected failure - indicates service degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a fetch failure by its cause
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::NoData(_) => FailureType::Expected,
        // Server errors and unparseable payloads point at the upstream, not the site
        FetchError::HttpStatus(code) if *code >= 500 => FailureType::Unexpected,
        FetchError::Parse(_) | FetchError::Io { .. } => FailureType::Unexpected,
        FetchError::HttpStatus(_)
        | FetchError::Timeout(_)
        | FetchError::Connection(_)
        | FetchError::Request(_) => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Initialize the global subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset. When `log_file` is given
/// all output is appended there instead of the console.
pub fn init_logger(default_level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    // try_init only fails when a subscriber is already installed (tests, repeat calls)
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.try_init();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::info!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::warn!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::error!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::debug!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a fetch failure with automatic classification
pub fn log_fetch_failure(source: DataSource, site_id: &str, operation: &str, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(source, Some(site_id), &message),
        FailureType::Unexpected => error(source, Some(site_id), &message),
        FailureType::Unknown => warn(source, Some(site_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one evaluation run
pub fn log_run_summary(source: DataSource, evaluated: usize, sent: usize, failed: usize) {
    let message = format!(
        "Run complete: {} sites evaluated, {} notifications sent, {} failed",
        evaluated, sent, failed
    );

    if failed == 0 {
        info(source, None, &message);
    } else if sent == 0 {
        error(source, None, &message);
    } else {
        warn(source, None, &message);
    }
}
