/// Cross-location risk overview.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Assessment, RiskLevel};

/// One location's latest standing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLocation {
    pub location_id: String,
    pub level: RiskLevel,
    pub score: f64,
    pub assessed_at: DateTime<Utc>,
}

/// Counts per level across every registered location, plus a worst-first
/// ranking of those that have been assessed at least once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskOverview {
    pub total_locations: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Registered but never successfully assessed.
    pub unassessed: usize,
    /// Highest score first; ties broken by name.
    pub ranking: Vec<RankedLocation>,
    pub generated_at: DateTime<Utc>,
}

impl RiskOverview {
    /// Builds the overview from `(location id, latest assessment)` pairs.
    pub fn from_latest<'a, I>(latest: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a Assessment>)>,
    {
        let mut overview = RiskOverview {
            total_locations: 0,
            high: 0,
            medium: 0,
            low: 0,
            unassessed: 0,
            ranking: Vec::new(),
            generated_at: now,
        };

        for (location_id, assessment) in latest {
            overview.total_locations += 1;
            let Some(a) = assessment else {
                overview.unassessed += 1;
                continue;
            };
            match a.level {
                RiskLevel::High => overview.high += 1,
                RiskLevel::Medium => overview.medium += 1,
                RiskLevel::Low => overview.low += 1,
            }
            overview.ranking.push(RankedLocation {
                location_id: location_id.to_string(),
                level: a.level,
                score: a.score,
                assessed_at: a.assessed_at,
            });
        }

        overview.ranking.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.location_id.cmp(&b.location_id))
        });
        overview
    }

    /// The `n` worst locations.
    pub fn top(&self, n: usize) -> &[RankedLocation] {
        &self.ranking[..n.min(self.ranking.len())]
    }
}
