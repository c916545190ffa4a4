/// Durable archive of assessments.
///
/// The in-memory `HistoryStore` is bounded and lost on restart. When
/// archiving is enabled, every assessment appended to it is also written to
/// PostgreSQL (`sql/001_assessments.sql`), which external reporting can query
/// without limits.
///
/// The `postgres` client is blocking. The orchestrator only ever calls
/// `record` from `tokio::task::spawn_blocking`, and archive failures are
/// logged rather than allowed to affect the tick.
///
/// A `postgres::Client` owns a small tokio runtime of its own, and tokio
/// panics when a runtime is dropped on an async worker. `PgArchive` therefore
/// hands its client to a plain thread when it is dropped inside a runtime,
/// which is what happens when the daemon's `Monitor` goes away at the end of
/// `main`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use postgres::{Client, NoTls};

use crate::logging::{self, Component};
use crate::model::{Assessment, MonitorError, Reading, RiskLevel};

/// Schema applied by `PgArchive::ensure_schema`.
pub const SCHEMA_SQL: &str = include_str!("../sql/001_assessments.sql");

/// Anything that can durably keep assessments.
pub trait AssessmentArchive: Send + Sync {
    fn name(&self) -> &str;

    /// Persist one assessment. Blocking.
    fn record(&self, assessment: &Assessment) -> Result<(), MonitorError>;
}

fn archive_error(e: postgres::Error) -> MonitorError {
    MonitorError::Archive(e.to_string())
}

pub struct PgArchive {
    /// `None` only once the archive is being dropped.
    client: Mutex<Option<Client>>,
}

impl PgArchive {
    /// Connects and makes sure the schema exists. Blocking; call outside
    /// async context.
    pub fn connect(database_url: &str) -> Result<Self, MonitorError> {
        let client = Client::connect(database_url, NoTls).map_err(archive_error)?;
        let archive = Self {
            client: Mutex::new(Some(client)),
        };
        archive.ensure_schema()?;
        Ok(archive)
    }

    fn with_client<T>(
        &self,
        f: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> Result<T, MonitorError> {
        let mut guard = self.client.lock();
        let client = guard
            .as_mut()
            .ok_or_else(|| MonitorError::Archive("connection closed".to_string()))?;
        f(client).map_err(archive_error)
    }

    pub fn ensure_schema(&self) -> Result<(), MonitorError> {
        self.with_client(|client| client.batch_execute(SCHEMA_SQL))
    }

    /// Most recent archived assessments for a location, newest first.
    pub fn load_recent(&self, location_id: &str, limit: i64) -> Result<Vec<Assessment>, MonitorError> {
        let rows = self.with_client(|client| {
            client.query(
                "SELECT location_id, water_level, rainfall, river_flow, captured_at,
                        risk_level, score, confidence, justification, recommendation,
                        assessed_at, solutions, helplines
                 FROM floodwatch.assessments
                 WHERE location_id = $1
                 ORDER BY assessed_at DESC
                 LIMIT $2",
                &[&location_id, &limit],
            )
        })?;

        rows.iter()
            .map(|row| {
                let level_text: String = row.get(5);
                let level = parse_level(&level_text).ok_or_else(|| {
                    MonitorError::Archive(format!("unknown risk level '{}' in archive", level_text))
                })?;
                let location_id: String = row.get(0);
                Ok(Assessment {
                    reading: Reading {
                        location_id: location_id.clone(),
                        water_level: row.get(1),
                        rainfall: row.get(2),
                        river_flow: row.get(3),
                        captured_at: row.get::<_, DateTime<Utc>>(4),
                    },
                    location_id,
                    level,
                    score: row.get(6),
                    confidence: row.get(7),
                    justification: row.get(8),
                    recommendation: row.get(9),
                    solutions: row.get(11),
                    helplines: row.get(12),
                    assessed_at: row.get::<_, DateTime<Utc>>(10),
                })
            })
            .collect()
    }
}

impl AssessmentArchive for PgArchive {
    fn name(&self) -> &str {
        "postgres"
    }

    fn record(&self, a: &Assessment) -> Result<(), MonitorError> {
        let level = a.level.to_string();
        self.with_client(|client| {
            client.execute(
                "INSERT INTO floodwatch.assessments
                 (location_id, water_level, rainfall, river_flow, captured_at,
                  risk_level, score, confidence, justification, recommendation, assessed_at,
                  solutions, helplines)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                &[
                    &a.location_id,
                    &a.reading.water_level,
                    &a.reading.rainfall,
                    &a.reading.river_flow,
                    &a.reading.captured_at,
                    &level,
                    &a.score,
                    &a.confidence,
                    &a.justification,
                    &a.recommendation,
                    &a.assessed_at,
                    &a.solutions,
                    &a.helplines,
                ],
            )
        })
        .map(|_| ())
    }
}

impl Drop for PgArchive {
    fn drop(&mut self) {
        if let Some(client) = self.client.get_mut().take() {
            release_off_runtime(client);
        }
    }
}

/// Drops `value` on a plain thread when called from inside a tokio runtime,
/// in place otherwise. For values that own a runtime.
pub fn release_off_runtime<T: Send + 'static>(value: T) {
    if tokio::runtime::Handle::try_current().is_err() {
        drop(value);
        return;
    }
    let released = std::thread::Builder::new()
        .name("floodwatch-archive-close".to_string())
        .spawn(move || drop(value));
    match released {
        Ok(handle) => {
            if handle.join().is_err() {
                logging::warn(Component::Database, None, "Archive connection panicked while closing");
            }
        }
        Err(e) => logging::error(
            Component::Database,
            None,
            &format!("Cannot spawn thread to close archive connection: {}", e),
        ),
    }
}

/// Inverse of `RiskLevel`'s `Display`.
pub fn parse_level(text: &str) -> Option<RiskLevel> {
    match text {
        "LOW" => Some(RiskLevel::Low),
        "MEDIUM" => Some(RiskLevel::Medium),
        "HIGH" => Some(RiskLevel::High),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_round_trips_display() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(parse_level(&level.to_string()), Some(level));
        }
        assert_eq!(parse_level("low"), None);
    }

    #[test]
    fn test_schema_constrains_risk_level_values() {
        assert!(SCHEMA_SQL.contains("floodwatch.assessments"));
        assert!(SCHEMA_SQL.contains("'LOW', 'MEDIUM', 'HIGH'"));
    }

    #[test]
    fn test_schema_adds_advice_columns_to_existing_tables() {
        assert!(SCHEMA_SQL.contains("ADD COLUMN IF NOT EXISTS solutions TEXT[]"));
        assert!(SCHEMA_SQL.contains("ADD COLUMN IF NOT EXISTS helplines TEXT[]"));
    }

    #[tokio::test]
    async fn test_runtime_owning_value_can_be_released_inside_async_context() {
        // Same shape as a postgres client: a value that owns its own runtime.
        let inner = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        release_off_runtime(inner);
    }

    #[test]
    fn test_release_outside_runtime_drops_in_place() {
        let dropped = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

        struct Flag(std::sync::Arc<std::sync::atomic::AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        release_off_runtime(Flag(dropped.clone()));
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }
}
