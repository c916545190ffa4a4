/// Aggregate views over assessments.
///
/// The monitoring core keeps per-location history; consumers such as the
/// dashboard mostly want one answer across all locations ("how many cities
/// are HIGH right now, and which are worst?"). Those summaries live here so
/// the orchestrator does not grow reporting logic.
///
/// Submodules:
/// - `overview`: level counts and worst-first ranking of latest assessments.
/// - `stats`: level distribution over retained history, recent HIGH entries.

pub mod overview;
pub mod stats;

pub use overview::{RankedLocation, RiskOverview};
pub use stats::{DEFAULT_RECENT_HIGH_LIMIT, HighRiskEntry, HistoryStats};
