/// Statistics over retained history.
///
/// Where `RiskOverview` looks only at each location's latest assessment,
/// `HistoryStats` counts every assessment still held in history and lists
/// the most recent HIGH verdicts across all locations.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Assessment, RiskLevel};

/// How many HIGH entries `Monitor::stats` reports by default.
pub const DEFAULT_RECENT_HIGH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighRiskEntry {
    pub location_id: String,
    pub score: f64,
    pub assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_records: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Most recent first.
    pub recent_high: Vec<HighRiskEntry>,
    pub generated_at: DateTime<Utc>,
}

impl HistoryStats {
    /// Builds the stats from each location's retained assessments, keeping
    /// at most `recent_high_limit` HIGH entries.
    pub fn from_history<'a, I>(history: I, recent_high_limit: usize, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a [Assessment]>,
    {
        let mut stats = HistoryStats {
            total_records: 0,
            high: 0,
            medium: 0,
            low: 0,
            recent_high: Vec::new(),
            generated_at: now,
        };

        for assessments in history {
            for a in assessments {
                stats.total_records += 1;
                match a.level {
                    RiskLevel::High => {
                        stats.high += 1;
                        stats.recent_high.push(HighRiskEntry {
                            location_id: a.location_id.clone(),
                            score: a.score,
                            assessed_at: a.assessed_at,
                        });
                    }
                    RiskLevel::Medium => stats.medium += 1,
                    RiskLevel::Low => stats.low += 1,
                }
            }
        }

        stats.recent_high.sort_by(|a, b| {
            b.assessed_at
                .cmp(&a.assessed_at)
                .then_with(|| a.location_id.cmp(&b.location_id))
        });
        stats.recent_high.truncate(recent_high_limit);
        stats
    }

    pub fn count(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
        }
    }
}
