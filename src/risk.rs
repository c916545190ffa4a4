//! Flood risk scoring.
//!
//! Turns one `Reading` plus a location's vulnerability factor into an
//! `Assessment`. Scoring is a fixed weighted sum of the three measurements,
//! normalised against their reference maxima and then scaled by
//! vulnerability:
//!
//! ```text
//! normalized = 0.4*(water_level/100) + 0.3*(rainfall/300) + 0.3*(river_flow/600)
//! score      = clamp(normalized * vulnerability_factor, 0, 1)
//! ```
//!
//! # Randomness injection
//! Confidence is drawn from a per-level band on every evaluation. The RNG
//! lives inside the evaluator and can be seeded, so tests can pin the draws
//! without touching any global state.

use std::ops::RangeInclusive;

use chrono::Utc;
use parking_lot::Mutex;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::{Assessment, MonitorError, Reading, RiskLevel};

// ---------------------------------------------------------------------------
// Scoring constants
// ---------------------------------------------------------------------------

pub const WATER_LEVEL_WEIGHT: f64 = 0.4;
pub const RAINFALL_WEIGHT: f64 = 0.3;
pub const RIVER_FLOW_WEIGHT: f64 = 0.3;

/// Reference maxima used to normalise each measurement.
pub const WATER_LEVEL_REFERENCE_CM: f64 = 100.0;
pub const RAINFALL_REFERENCE_MM: f64 = 300.0;
pub const RIVER_FLOW_REFERENCE_M3S: f64 = 600.0;

/// Scores strictly above this are HIGH.
pub const HIGH_THRESHOLD: f64 = 0.70;
/// Scores strictly above this (and not HIGH) are MEDIUM.
pub const MEDIUM_THRESHOLD: f64 = 0.40;

// ---------------------------------------------------------------------------
// Pure scoring functions
// ---------------------------------------------------------------------------

/// The three weighted terms of the normalised sum, in the order
/// water level, rainfall, river flow.
fn weighted_terms(reading: &Reading) -> [f64; 3] {
    [
        WATER_LEVEL_WEIGHT * (reading.water_level / WATER_LEVEL_REFERENCE_CM),
        RAINFALL_WEIGHT * (reading.rainfall / RAINFALL_REFERENCE_MM),
        RIVER_FLOW_WEIGHT * (reading.river_flow / RIVER_FLOW_REFERENCE_M3S),
    ]
}

/// Vulnerability-scaled risk score, clamped to [0, 1].
///
/// Assumes the reading has already been validated.
pub fn risk_score(reading: &Reading, vulnerability_factor: f64) -> f64 {
    let normalized: f64 = weighted_terms(reading).iter().sum();
    (normalized * vulnerability_factor).clamp(0.0, 1.0)
}

/// Maps a score onto a level. Boundary values fall into the lower bucket:
///   0.70 → MEDIUM, 0.40 → LOW.
pub fn level_for_score(score: f64) -> RiskLevel {
    if score > HIGH_THRESHOLD {
        RiskLevel::High
    } else if score > MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Inclusive confidence band (percent) for a level.
pub fn confidence_band(level: RiskLevel) -> RangeInclusive<f64> {
    match level {
        RiskLevel::High => 70.0..=95.0,
        RiskLevel::Medium => 50.0..=85.0,
        RiskLevel::Low => 30.0..=75.0,
    }
}

/// Which measurement contributes most to the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    WaterLevel,
    Rainfall,
    RiverFlow,
}

/// Ties go to water level, then rainfall.
pub fn dominant_factor(reading: &Reading) -> Factor {
    let [water, rain, flow] = weighted_terms(reading);
    if water >= rain && water >= flow {
        Factor::WaterLevel
    } else if rain >= flow {
        Factor::Rainfall
    } else {
        Factor::RiverFlow
    }
}

/// Human-readable explanation of what drove the assessment.
pub fn justification(reading: &Reading, level: RiskLevel) -> String {
    let terms = weighted_terms(reading);
    let total: f64 = terms.iter().sum();
    if total <= 0.0 {
        return format!("{} risk: no measurable water level, rainfall or river flow", level);
    }

    let factor = dominant_factor(reading);
    let (phrase, share) = match factor {
        Factor::WaterLevel => (
            format!("water level of {:.0} cm", reading.water_level),
            terms[0] / total,
        ),
        Factor::Rainfall => (
            format!("rainfall of {:.0} mm", reading.rainfall),
            terms[1] / total,
        ),
        Factor::RiverFlow => (
            format!("river flow of {:.0} m³/s", reading.river_flow),
            terms[2] / total,
        ),
    };

    format!(
        "{} risk driven mainly by {} ({:.0}% of weighted conditions)",
        level,
        phrase,
        share * 100.0
    )
}

/// Advisory line attached to every assessment of a given level.
pub fn recommendation(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => "Immediate evacuation required; activate emergency protocols",
        RiskLevel::Medium => "Stay prepared; monitor the situation closely and be ready to evacuate",
        RiskLevel::Low => "Situation normal; continue monitoring and stay informed",
    }
}

/// Action checklist for a level, most urgent first.
pub fn solutions(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::High => &[
            "Evacuate to higher ground immediately",
            "Call the emergency helplines listed with this assessment",
            "Keep mobile phones charged and ready",
            "Do not cross flooded roads or bridges",
            "Move essential documents and medicines to a safe place",
            "Authorities to deploy rescue boats and helicopters",
            "Broadcast emergency alerts to all residents",
        ],
        RiskLevel::Medium => &[
            "Pack essential items and documents",
            "Monitor weather alerts and government updates",
            "Make sure elderly people and children have support",
            "Avoid unnecessary travel",
            "Check drainage systems and clear blockages",
            "Local authorities to prepare emergency shelters",
            "Store drinking water and food supplies",
        ],
        RiskLevel::Low => &[
            "Continue the normal daily routine",
            "Stay informed about weather forecasts",
            "Educate the community about flood safety",
            "Keep drainage systems clear",
            "Keep emergency contacts up to date",
            "Authorities to maintain monitoring systems",
            "Review emergency preparedness plans",
        ],
    }
}

/// Helpline numbers to publish with a level, as `"service: number"`.
pub fn helplines(level: RiskLevel) -> &'static [&'static str] {
    match level {
        RiskLevel::High => &[
            "National Disaster Helpline: 1078",
            "NDMA Helpline: 011-26701728",
            "State Disaster Control: 1070",
            "Animal Rescue: 1962",
            "Police: 100",
            "Fire Service: 101",
            "Ambulance: 108",
        ],
        RiskLevel::Medium => &[
            "State Disaster Helpline: 1070",
            "Weather Updates: 1800-180-1717",
            "Animal Rescue: 1962",
        ],
        RiskLevel::Low => &[
            "General Emergency: 112",
            "Weather Information: 1800-180-1717",
        ],
    }
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Produces assessments. Holds only the confidence RNG, so it can be shared
/// across worker tasks behind an `Arc`.
pub struct RiskEvaluator {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RiskEvaluator {
    /// Evaluator seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Evaluator whose confidence draws are reproducible.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Scores `reading` for a location with the given vulnerability factor.
    ///
    /// Fails with `InvalidReading` if any measurement is negative or
    /// non-finite, or if the vulnerability factor is outside [0, 1].
    pub fn evaluate(
        &self,
        reading: &Reading,
        vulnerability_factor: f64,
    ) -> Result<Assessment, MonitorError> {
        reading.validate()?;
        if !vulnerability_factor.is_finite() || !(0.0..=1.0).contains(&vulnerability_factor) {
            return Err(MonitorError::InvalidReading {
                location: reading.location_id.clone(),
                reason: format!("vulnerability factor {} outside [0, 1]", vulnerability_factor),
            });
        }

        let score = risk_score(reading, vulnerability_factor);
        let level = level_for_score(score);

        Ok(Assessment {
            location_id: reading.location_id.clone(),
            reading: reading.clone(),
            level,
            score,
            confidence: self.draw_confidence(level),
            justification: justification(reading, level),
            recommendation: recommendation(level).to_string(),
            solutions: owned(solutions(level)),
            helplines: owned(helplines(level)),
            assessed_at: Utc::now(),
        })
    }

    /// Fresh draw on every call, rounded to one decimal place.
    fn draw_confidence(&self, level: RiskLevel) -> f64 {
        let raw = self.rng.lock().gen_range(confidence_band(level));
        (raw * 10.0).round() / 10.0
    }
}

impl Default for RiskEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(water_level: f64, rainfall: f64, river_flow: f64) -> Reading {
        Reading {
            location_id: "Mumbai".to_string(),
            water_level,
            rainfall,
            river_flow,
            captured_at: Utc::now(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // --- Scenarios ----------------------------------------------------------

    #[test]
    fn test_mumbai_reading_scaled_by_vulnerability_is_medium() {
        // normalized = 0.34 + 0.18 + 0.225 = 0.745; 0.745 * 0.8 = 0.596
        let evaluator = RiskEvaluator::seeded(7);
        let assessment = evaluator
            .evaluate(&reading(85.0, 180.0, 450.0), 0.8)
            .expect("valid reading should evaluate");
        assert!(approx(assessment.score, 0.596), "score was {}", assessment.score);
        assert_eq!(assessment.level, RiskLevel::Medium);
    }

    #[test]
    fn test_same_reading_at_full_vulnerability_is_high() {
        let evaluator = RiskEvaluator::seeded(7);
        let assessment = evaluator.evaluate(&reading(85.0, 180.0, 450.0), 1.0).unwrap();
        assert!(approx(assessment.score, 0.745), "score was {}", assessment.score);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    // --- Level mapping ------------------------------------------------------

    #[test]
    fn test_boundary_scores_fall_into_lower_bucket() {
        assert_eq!(level_for_score(0.70), RiskLevel::Medium);
        assert_eq!(level_for_score(0.40), RiskLevel::Low);
    }

    #[test]
    fn test_scores_just_above_boundaries_move_up() {
        assert_eq!(level_for_score(0.700_001), RiskLevel::High);
        assert_eq!(level_for_score(0.400_001), RiskLevel::Medium);
        assert_eq!(level_for_score(0.0), RiskLevel::Low);
        assert_eq!(level_for_score(1.0), RiskLevel::High);
    }

    #[test]
    fn test_score_is_clamped_to_unit_interval() {
        let huge = reading(10_000.0, 10_000.0, 10_000.0);
        assert_eq!(risk_score(&huge, 1.0), 1.0);
        assert_eq!(risk_score(&huge, 0.0), 0.0);
    }

    #[test]
    fn test_score_is_deterministic_and_level_consistent() {
        let evaluator = RiskEvaluator::new();
        let r = reading(60.0, 120.0, 300.0);
        let first = evaluator.evaluate(&r, 0.6).unwrap();
        let second = evaluator.evaluate(&r, 0.6).unwrap();
        assert_eq!(first.score, second.score);
        assert_eq!(first.level, level_for_score(first.score));
        assert_eq!(first.justification, second.justification);
    }

    // --- Confidence ---------------------------------------------------------

    #[test]
    fn test_confidence_stays_within_level_band() {
        let evaluator = RiskEvaluator::seeded(42);
        let cases = [
            (reading(85.0, 180.0, 450.0), 1.0, RiskLevel::High),
            (reading(85.0, 180.0, 450.0), 0.8, RiskLevel::Medium),
            (reading(10.0, 10.0, 10.0), 0.5, RiskLevel::Low),
        ];
        for (r, vulnerability, expected_level) in cases {
            for _ in 0..500 {
                let a = evaluator.evaluate(&r, vulnerability).unwrap();
                assert_eq!(a.level, expected_level);
                assert!(
                    confidence_band(a.level).contains(&a.confidence),
                    "confidence {} outside band for {}",
                    a.confidence,
                    a.level
                );
            }
        }
    }

    #[test]
    fn test_seeded_evaluators_draw_identical_confidence() {
        let a = RiskEvaluator::seeded(99);
        let b = RiskEvaluator::seeded(99);
        let r = reading(50.0, 50.0, 50.0);
        for _ in 0..20 {
            assert_eq!(
                a.evaluate(&r, 0.5).unwrap().confidence,
                b.evaluate(&r, 0.5).unwrap().confidence
            );
        }
    }

    #[test]
    fn test_confidence_is_redrawn_per_assessment() {
        let evaluator = RiskEvaluator::seeded(3);
        let r = reading(50.0, 50.0, 50.0);
        let draws: std::collections::HashSet<u64> = (0..50)
            .map(|_| evaluator.evaluate(&r, 0.5).unwrap().confidence.to_bits())
            .collect();
        assert!(draws.len() > 1, "confidence should not be cached between assessments");
    }

    // --- Justification ------------------------------------------------------

    #[test]
    fn test_dominant_factor_selection() {
        assert_eq!(dominant_factor(&reading(90.0, 10.0, 10.0)), Factor::WaterLevel);
        assert_eq!(dominant_factor(&reading(0.0, 290.0, 10.0)), Factor::Rainfall);
        assert_eq!(dominant_factor(&reading(0.0, 10.0, 590.0)), Factor::RiverFlow);
    }

    #[test]
    fn test_dominant_factor_ties_prefer_water_level() {
        // 0.4*(75/100) = 0.3 = 0.3*(300/300)
        assert_eq!(dominant_factor(&reading(75.0, 300.0, 0.0)), Factor::WaterLevel);
        assert_eq!(dominant_factor(&reading(0.0, 0.0, 0.0)), Factor::WaterLevel);
    }

    #[test]
    fn test_justification_mentions_dominant_measurement() {
        let text = justification(&reading(0.0, 10.0, 590.0), RiskLevel::Medium);
        assert!(text.starts_with("MEDIUM"), "got: {}", text);
        assert!(text.contains("river flow of 590"), "got: {}", text);

        let calm = justification(&reading(0.0, 0.0, 0.0), RiskLevel::Low);
        assert!(calm.contains("no measurable"), "got: {}", calm);
    }

    #[test]
    fn test_each_level_has_distinct_recommendation() {
        let high = recommendation(RiskLevel::High);
        let medium = recommendation(RiskLevel::Medium);
        let low = recommendation(RiskLevel::Low);
        assert!(high.contains("evacuation"));
        assert_ne!(high, medium);
        assert_ne!(medium, low);
    }

    // --- Failure modes ------------------------------------------------------

    #[test]
    fn test_negative_reading_is_invalid() {
        let evaluator = RiskEvaluator::seeded(1);
        let result = evaluator.evaluate(&reading(-5.0, 0.0, 0.0), 0.5);
        assert!(matches!(result, Err(MonitorError::InvalidReading { .. })));
    }

    #[test]
    fn test_nan_reading_is_invalid() {
        let evaluator = RiskEvaluator::seeded(1);
        let result = evaluator.evaluate(&reading(1.0, f64::NAN, 0.0), 0.5);
        assert!(matches!(result, Err(MonitorError::InvalidReading { .. })));
    }

    #[test]
    fn test_out_of_range_vulnerability_is_invalid() {
        let evaluator = RiskEvaluator::seeded(1);
        assert!(evaluator.evaluate(&reading(1.0, 1.0, 1.0), 1.5).is_err());
        assert!(evaluator.evaluate(&reading(1.0, 1.0, 1.0), -0.1).is_err());
    }

    #[test]
    fn test_assessment_carries_level_advice() {
        let evaluator = RiskEvaluator::seeded(4);
        let high = evaluator.evaluate(&reading(95.0, 290.0, 580.0), 0.9).unwrap();
        assert_eq!(high.level, RiskLevel::High);
        assert_eq!(high.solutions.len(), solutions(RiskLevel::High).len());
        assert_eq!(high.solutions[0], "Evacuate to higher ground immediately");
        assert!(high.helplines.contains(&"National Disaster Helpline: 1078".to_string()));

        let low = evaluator.evaluate(&reading(5.0, 5.0, 5.0), 0.5).unwrap();
        assert_eq!(low.helplines, vec!["General Emergency: 112", "Weather Information: 1800-180-1717"]);
    }

    #[test]
    fn test_every_level_has_checklist_and_helplines() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(solutions(level).len(), 7, "{} checklist", level);
            assert!(!helplines(level).is_empty(), "{} helplines", level);
            assert!(helplines(level).iter().all(|h| h.contains(": ")));
        }
    }
}
