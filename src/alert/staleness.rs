/// Source health and assessment staleness.
///
/// Locations are normally reassessed every tick. When the measurement source
/// keeps failing for one of them, its latest assessment quietly ages while
/// the dashboard still shows it. This module tracks consecutive failures per
/// location and decides when an assessment is too old to trust, so both
/// conditions show up in `Monitor::status()`.
///
/// # Clock injection
/// Staleness checks accept a `now: DateTime<Utc>` parameter rather than
/// calling `Utc::now()` internally, which keeps them deterministic in tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::logging::{self, Component};
use crate::model::{Assessment, MonitorError};

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Returns `true` if the assessment is older than `max_age_minutes`
/// relative to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
pub fn is_stale_at(assessment: &Assessment, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let age_minutes = (now - assessment.assessed_at).num_minutes();
    age_minutes > 0 && age_minutes as u64 > max_age_minutes
}

/// Convenience wrapper that uses the real current time.
pub fn is_stale(assessment: &Assessment, max_age_minutes: u64) -> bool {
    is_stale_at(assessment, max_age_minutes, Utc::now())
}

// ---------------------------------------------------------------------------
// Consecutive failure tracking
// ---------------------------------------------------------------------------

/// A location whose source has failed at least `threshold` ticks in a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedSource {
    pub location_id: String,
    pub consecutive_failures: u32,
    pub last_error: String,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HealthEntry {
    consecutive_failures: u32,
    last_error: Option<String>,
    last_success: Option<DateTime<Utc>>,
}

pub struct SourceHealth {
    threshold: u32,
    entries: Mutex<HashMap<String, HealthEntry>>,
}

impl SourceHealth {
    /// `threshold` is the streak length at which a location counts as
    /// degraded. Zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Resets the failure streak. Logs a recovery if the location had been
    /// degraded.
    pub fn record_success(&self, location_id: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(location_id.to_string()).or_default();
        if entry.consecutive_failures >= self.threshold {
            logging::info(
                Component::Source,
                Some(location_id),
                &format!("Source recovered after {} failed ticks", entry.consecutive_failures),
            );
        }
        entry.consecutive_failures = 0;
        entry.last_error = None;
        entry.last_success = Some(at);
    }

    /// Extends the failure streak and returns its new length. Warns once,
    /// on the tick the streak reaches the threshold.
    pub fn record_failure(&self, location_id: &str, err: &MonitorError) -> u32 {
        let mut entries = self.entries.lock();
        let entry = entries.entry(location_id.to_string()).or_default();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(err.to_string());
        if entry.consecutive_failures == self.threshold {
            logging::warn(
                Component::Source,
                Some(location_id),
                &format!(
                    "Source degraded: {} consecutive failed ticks (last: {})",
                    entry.consecutive_failures, err
                ),
            );
        }
        entry.consecutive_failures
    }

    pub fn consecutive_failures(&self, location_id: &str) -> u32 {
        self.entries
            .lock()
            .get(location_id)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }

    /// Locations at or past the threshold, ordered by id.
    pub fn degraded(&self) -> Vec<DegradedSource> {
        let entries = self.entries.lock();
        let mut degraded: Vec<_> = entries
            .iter()
            .filter(|(_, e)| e.consecutive_failures >= self.threshold)
            .map(|(id, e)| DegradedSource {
                location_id: id.clone(),
                consecutive_failures: e.consecutive_failures,
                last_error: e.last_error.clone().unwrap_or_default(),
                last_success: e.last_success,
            })
            .collect();
        degraded.sort_by(|a, b| a.location_id.cmp(&b.location_id));
        degraded
    }

    pub fn forget(&self, location_id: &str) {
        self.entries.lock().remove(location_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
