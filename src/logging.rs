/// Structured logging for the flood risk monitoring service
///
/// Provides context-rich logging with location identifiers, timestamps,
/// component tags and severity levels. Supports both console output and
/// file-based logging for daemon operations.

use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use crate::model::MonitorError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Which part of the service a log line comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Scheduler,
    Evaluator,
    Source,
    Sink,
    History,
    Registry,
    Config,
    Database,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Scheduler => write!(f, "SCHED"),
            Component::Evaluator => write!(f, "EVAL"),
            Component::Source => write!(f, "SRC"),
            Component::Sink => write!(f, "SINK"),
            Component::History => write!(f, "HIST"),
            Component::Registry => write!(f, "REG"),
            Component::Config => write!(f, "CFG"),
            Component::Database => write!(f, "DB"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - sensor not reporting yet, or known gaps
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
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

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        *LOGGER.lock() = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, location: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let location_part = location.map(|l| format!(" [{}]", l)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp, level, component, location_part, message
        );

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, location_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, location_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, component: Component, location: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().as_ref() {
        logger.log(level, component, location, message);
    }
}

/// Log a general informational message
pub fn info(component: Component, location: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, location, message);
}

/// Log a warning message
pub fn warn(component: Component, location: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, location, message);
}

/// Log an error message
pub fn error(component: Component, location: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, location, message);
}

/// Log a debug message
pub fn debug(component: Component, location: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, location, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a per-location tick failure.
///
/// Transport problems point at the collaborator being down or misconfigured;
/// a malformed reading is usually a single bad sensor sample.
pub fn classify_tick_failure(err: &MonitorError) -> FailureType {
    match err {
        MonitorError::SourceUnavailable { reason, .. } => {
            if reason.contains("no reading yet") {
                FailureType::Expected
            } else if reason.contains("HTTP") || reason.contains("timed out") {
                FailureType::Unexpected
            } else {
                FailureType::Unknown
            }
        }
        // Negative, non-finite or unparseable sample.
        MonitorError::InvalidReading { .. } => FailureType::Unknown,
        _ => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a skipped location with automatic classification
pub fn log_tick_failure(location: &str, err: &MonitorError) {
    let failure_type = classify_tick_failure(err);
    let message = format!("skipped for this tick [{}]: {}", failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Source, Some(location), &message),
        FailureType::Unexpected => error(Component::Source, Some(location), &message),
        FailureType::Unknown => warn(Component::Source, Some(location), &message),
    }
}

/// Log an alert sink failure. Never fatal, so never above WARN.
pub fn log_sink_failure(sink: &str, location: &str, err: &MonitorError) {
    warn(
        Component::Sink,
        Some(location),
        &format!("alert not delivered to '{}': {}", sink, err),
    );
}

// ---------------------------------------------------------------------------
// Tick Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one monitoring tick
pub fn log_tick_summary(tick: u64, total: usize, assessed: usize, skipped: usize, elapsed: Duration) {
    let message = format!(
        "Tick {} complete: {}/{} assessed, {} skipped in {} ms",
        tick,
        assessed,
        total,
        skipped,
        elapsed.as_millis()
    );

    if skipped == 0 {
        info(Component::Scheduler, None, &message);
    } else if assessed == 0 && total > 0 {
        error(Component::Scheduler, None, &message);
    } else {
        warn(Component::Scheduler, None, &message);
    }
}
