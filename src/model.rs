/// Core data types for the flood risk monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// locations, sensor readings, assessments, alert events, and the error
/// taxonomy. It contains no I/O and no scheduling logic, only types and the
/// small amount of behaviour that belongs to them (level ordering, reading
/// validation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A monitored location ("city"). The name is the unique identifier.
///
/// Immutable once registered; see `registry::LocationRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    /// WGS84 latitude.
    pub lat: f64,
    /// WGS84 longitude.
    pub lng: f64,
    pub population: u64,
    /// Baseline susceptibility in [0, 1], independent of current conditions.
    pub vulnerability_factor: f64,
}

impl Location {
    /// The identifier other components use to refer to this location.
    pub fn id(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// A single set of measurements for one location.
///
/// Ephemeral: a reading is only kept as part of the `Assessment` derived from
/// it, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub location_id: String,
    /// Water level above datum, in centimetres.
    pub water_level: f64,
    /// Rainfall accumulated over the measurement window, in millimetres.
    pub rainfall: f64,
    /// River discharge, in cubic metres per second.
    pub river_flow: f64,
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    /// Rejects negative or non-finite measurements.
    pub fn validate(&self) -> Result<(), MonitorError> {
        let fields = [
            ("water_level", self.water_level),
            ("rainfall", self.rainfall),
            ("river_flow", self.river_flow),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(MonitorError::InvalidReading {
                    location: self.location_id.clone(),
                    reason: format!("{} is not a finite number", field),
                });
            }
            if value < 0.0 {
                return Err(MonitorError::InvalidReading {
                    location: self.location_id.clone(),
                    reason: format!("{} is negative ({})", field, value),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Risk levels and assessments
// ---------------------------------------------------------------------------

/// Risk levels, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// The evaluator's verdict for one reading. Created once per tick per
/// location and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub location_id: String,
    pub reading: Reading,
    pub level: RiskLevel,
    /// Vulnerability-scaled risk score in [0, 1].
    pub score: f64,
    /// Certainty of the assessment, in percent [0, 100].
    pub confidence: f64,
    pub justification: String,
    pub recommendation: String,
    /// Action checklist for this level.
    #[serde(default)]
    pub solutions: Vec<String>,
    /// Helplines to publish with this level, `"service: number"`.
    #[serde(default)]
    pub helplines: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

/// A risk level transition worth telling someone about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub location_id: String,
    /// `None` when this is the first assessment ever seen for the location.
    pub previous_level: Option<RiskLevel>,
    pub new_level: RiskLevel,
    pub assessment: Assessment,
    pub emitted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Monitoring session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitoringState {
    Active,
    Inactive,
}

impl fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringState::Active => write!(f, "ACTIVE"),
            MonitoringState::Inactive => write!(f, "INACTIVE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the monitoring core. None of them is fatal to the
/// scheduling loop; see `monitor::Monitor` for how each one is handled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    /// A measurement was negative or non-finite. The location is skipped for
    /// the current tick.
    #[error("invalid reading for {location}: {reason}")]
    InvalidReading { location: String, reason: String },
    /// The measurement source could not be reached or answered with garbage.
    #[error("source unavailable for {location}: {reason}")]
    SourceUnavailable { location: String, reason: String },
    /// An alert sink failed or timed out.
    #[error("delivery to sink '{sink}' failed: {reason}")]
    SinkDeliveryFailed { sink: String, reason: String },
    #[error("unknown location: {0}")]
    UnknownLocation(String),
    #[error("location already registered: {0}")]
    DuplicateLocation(String),
    #[error("invalid location {name}: {reason}")]
    InvalidLocation { name: String, reason: String },
    /// The durable assessment archive rejected a write.
    #[error("archive error: {0}")]
    Archive(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
