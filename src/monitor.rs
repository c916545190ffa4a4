//! Monitoring orchestrator.
//!
//! Owns the scheduling loop and everything a tick touches: the location
//! registry, the history store, the evaluator, the alert emitter and source
//! health. One tick asks the measurement source about every registered
//! location, scores each reading, appends it to history and lets the emitter
//! decide whether the change is worth an alert.
//!
//! # Scheduling
//! - Ticks are spaced start-to-start by `tick_interval`. A tick that overruns
//!   is followed immediately by the next one; ticks never overlap.
//! - Within a tick, locations run as tasks in a `JoinSet`, at most
//!   `max_concurrency` at a time. The tick waits for all of them, so a
//!   location's next tick cannot start before its previous one finished.
//! - `stop()` signals the loop and waits for it. Work already in flight for
//!   the current tick drains; no tick starts after `stop()` returns.
//!
//! # Failures
//! A failing location is logged and skipped for that tick only. Nothing a
//! source, a sink or the archive does can end the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::alert::staleness::{DegradedSource, SourceHealth, is_stale_at};
use crate::alert::{AlertEmitter, AlertSink, DeliveryStats};
use crate::analysis::{HistoryStats, RiskOverview};
use crate::archive::AssessmentArchive;
use crate::config::MonitorSettings;
use crate::history::HistoryStore;
use crate::ingest::{MeasurementSource, fetch_with_retry};
use crate::locations::LocationRegistry;
use crate::logging::{self, Component};
use crate::model::{Assessment, Location, MonitorError, MonitoringState};
use crate::risk::RiskEvaluator;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What `status()` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub state: MonitoringState,
    pub tick_interval: Duration,
    pub location_count: usize,
    pub ticks_completed: u64,
    pub retention_cap: usize,
    pub max_concurrency: Option<usize>,
    /// Locations whose source keeps failing.
    pub degraded: Vec<DegradedSource>,
    /// Locations whose latest assessment is older than `stale_after_minutes`.
    pub stale: Vec<String>,
    pub alerts: DeliveryStats,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub total: usize,
    pub assessed: usize,
    pub skipped: usize,
    pub alerts: usize,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct MonitorBuilder {
    settings: MonitorSettings,
    source: Arc<dyn MeasurementSource>,
    evaluator: Option<RiskEvaluator>,
    archive: Option<Arc<dyn AssessmentArchive>>,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl MonitorBuilder {
    /// Injects the evaluator, typically a seeded one in tests.
    pub fn evaluator(mut self, evaluator: RiskEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn archive(mut self, archive: Arc<dyn AssessmentArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Monitor {
        let emitter = AlertEmitter::new(self.settings.delivery);
        for sink in self.sinks {
            emitter.add_sink(sink);
        }

        let shared = Shared {
            registry: LocationRegistry::new(),
            history: HistoryStore::new(self.settings.retention_cap),
            evaluator: self.evaluator.unwrap_or_default(),
            emitter,
            health: SourceHealth::new(self.settings.degraded_after_failures),
            source: self.source,
            archive: self.archive,
            membership: RwLock::new(()),
            tick_lock: Mutex::new(()),
            ticks_started: AtomicU64::new(0),
            ticks_completed: AtomicU64::new(0),
            active: AtomicBool::new(false),
            last_scheduled: parking_lot::Mutex::new(None),
            settings: self.settings,
        };

        Monitor {
            shared: Arc::new(shared),
            control: Mutex::new(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// State shared between the public handle and the scheduling task.
struct Shared {
    settings: MonitorSettings,
    registry: LocationRegistry,
    history: HistoryStore,
    evaluator: RiskEvaluator,
    emitter: AlertEmitter,
    health: SourceHealth,
    source: Arc<dyn MeasurementSource>,
    archive: Option<Arc<dyn AssessmentArchive>>,
    /// Held for reading while an assessment is committed, for writing while a
    /// location is removed. Keeps history from outliving registration.
    membership: RwLock<()>,
    /// Serializes ticks, whether scheduled or run on demand.
    tick_lock: Mutex<()>,
    ticks_started: AtomicU64,
    ticks_completed: AtomicU64,
    active: AtomicBool,
    /// When the scheduling loop last began a tick. Survives stop/start so a
    /// restart keeps the cadence.
    last_scheduled: parking_lot::Mutex<Option<tokio::time::Instant>>,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Monitor {
    shared: Arc<Shared>,
    control: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn builder(settings: MonitorSettings, source: Arc<dyn MeasurementSource>) -> MonitorBuilder {
        MonitorBuilder {
            settings,
            source,
            evaluator: None,
            archive: None,
            sinks: Vec::new(),
        }
    }

    pub fn new(settings: MonitorSettings, source: Arc<dyn MeasurementSource>) -> Self {
        Self::builder(settings, source).build()
    }

    // --- Registry ---------------------------------------------------------

    /// Registers a location for monitoring. Takes effect from the next tick.
    pub fn register(&self, location: Location) -> Result<String, MonitorError> {
        let id = self.shared.registry.register(location)?;
        logging::info(Component::Registry, Some(&id), "Location registered");
        Ok(id)
    }

    /// Removes a location along with its history.
    pub fn deregister(&self, id: &str) -> Result<Location, MonitorError> {
        let _guard = self.shared.membership.write();
        let location = self.shared.registry.deregister(id)?;
        let dropped = self.shared.history.remove(id);
        self.shared.health.forget(id);
        logging::info(
            Component::Registry,
            Some(id),
            &format!("Location deregistered, {} assessments dropped", dropped),
        );
        Ok(location)
    }

    pub fn locations(&self) -> Vec<Location> {
        self.shared.registry.snapshot()
    }

    pub fn add_sink(&self, sink: Arc<dyn AlertSink>) {
        self.shared.emitter.add_sink(sink);
    }

    // --- Queries ------------------------------------------------------------

    fn ensure_registered(&self, id: &str) -> Result<(), MonitorError> {
        if self.shared.registry.contains(id) {
            Ok(())
        } else {
            Err(MonitorError::UnknownLocation(id.to_string()))
        }
    }

    pub fn latest(&self, id: &str) -> Result<Option<Assessment>, MonitorError> {
        self.ensure_registered(id)?;
        Ok(self.shared.history.latest(id))
    }

    /// Up to `limit` assessments, most recent first.
    pub fn recent(&self, id: &str, limit: usize) -> Result<Vec<Assessment>, MonitorError> {
        self.ensure_registered(id)?;
        Ok(self.shared.history.recent(id, limit))
    }

    /// Assessments at or after `since`, most recent first.
    pub fn history(&self, id: &str, since: DateTime<Utc>) -> Result<Vec<Assessment>, MonitorError> {
        self.ensure_registered(id)?;
        Ok(self.shared.history.since(id, since))
    }

    /// Level distribution over all retained history plus the latest
    /// `recent_high_limit` HIGH assessments across locations.
    pub fn stats(&self, recent_high_limit: usize) -> HistoryStats {
        let retained: Vec<Vec<Assessment>> = self
            .shared
            .registry
            .ids()
            .iter()
            .map(|id| self.shared.history.recent(id, usize::MAX))
            .collect();
        HistoryStats::from_history(retained.iter().map(Vec::as_slice), recent_high_limit, Utc::now())
    }

    pub fn overview(&self) -> RiskOverview {
        let locations = self.shared.registry.ids();
        let latest: Vec<(String, Option<Assessment>)> = locations
            .into_iter()
            .map(|id| {
                let latest = self.shared.history.latest(&id);
                (id, latest)
            })
            .collect();
        RiskOverview::from_latest(
            latest.iter().map(|(id, a)| (id.as_str(), a.as_ref())),
            Utc::now(),
        )
    }

    pub fn status(&self) -> MonitorStatus {
        self.status_at(Utc::now())
    }

    /// `status()` with an injected clock for the staleness check.
    pub fn status_at(&self, now: DateTime<Utc>) -> MonitorStatus {
        let shared = &self.shared;
        let state = if shared.active.load(Ordering::SeqCst) {
            MonitoringState::Active
        } else {
            MonitoringState::Inactive
        };

        let stale = shared
            .registry
            .ids()
            .into_iter()
            .filter(|id| {
                shared
                    .history
                    .latest(id)
                    .is_some_and(|a| is_stale_at(&a, shared.settings.stale_after_minutes, now))
            })
            .collect();

        MonitorStatus {
            state,
            tick_interval: shared.settings.tick_interval,
            location_count: shared.registry.len(),
            ticks_completed: shared.ticks_completed.load(Ordering::SeqCst),
            retention_cap: shared.history.capacity(),
            max_concurrency: shared.settings.max_concurrency,
            degraded: shared.health.degraded(),
            stale,
            alerts: shared.emitter.stats(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    // --- Control ------------------------------------------------------------

    /// Starts the scheduling loop. A no-op when already active.
    ///
    /// The first tick runs immediately, unless the loop ran before and its
    /// last tick began less than one interval ago; then it waits out the rest
    /// of that interval.
    pub async fn start(&self) {
        let mut control = self.control.lock().await;
        if control.is_some() {
            logging::debug(Component::Scheduler, None, "start() ignored: already active");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        shared.active.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run_loop(shared, stop_rx));
        *control = Some(Running { stop_tx, handle });

        logging::info(
            Component::Scheduler,
            None,
            &format!(
                "Monitoring started: {} locations every {} s",
                self.shared.registry.len(),
                self.shared.settings.tick_interval.as_secs_f64()
            ),
        );
    }

    /// Stops the scheduling loop and waits for the current tick to drain.
    /// A no-op when already inactive.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(running) = control.take() else {
            logging::debug(Component::Scheduler, None, "stop() ignored: already inactive");
            return;
        };

        // The receiver may already be gone if the loop ended on its own.
        let _ = running.stop_tx.send(true);
        if let Err(e) = running.handle.await {
            logging::error(
                Component::Scheduler,
                None,
                &format!("Scheduling loop ended abnormally: {}", e),
            );
        }
        self.shared.active.store(false, Ordering::SeqCst);
        logging::info(Component::Scheduler, None, "Monitoring stopped");
    }

    /// Runs one tick right now, waiting for any scheduled tick in progress.
    pub async fn run_tick_now(&self) -> TickReport {
        run_tick(&self.shared).await
    }
}

impl Drop for Monitor {
    /// Signals a running loop to stop after its current tick. Unlike `stop()`
    /// this cannot wait for the tick to drain.
    fn drop(&mut self) {
        if let Some(running) = self.control.get_mut().take() {
            let _ = running.stop_tx.send(true);
            self.shared.active.store(false, Ordering::SeqCst);
            logging::debug(Component::Scheduler, None, "Monitor dropped while active; loop signalled");
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling loop
// ---------------------------------------------------------------------------

async fn run_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let resume_at = shared
        .last_scheduled
        .lock()
        .map(|last| last + shared.settings.tick_interval);
    if let Some(resume_at) = resume_at {
        tokio::select! {
            _ = tokio::time::sleep_until(resume_at) => {}
            _ = stop_rx.changed() => return,
        }
    }

    loop {
        let started = tokio::time::Instant::now();
        *shared.last_scheduled.lock() = Some(started);
        run_tick(&shared).await;

        if *stop_rx.borrow() {
            break;
        }

        let next = started + shared.settings.tick_interval;
        tokio::select! {
            _ = tokio::time::sleep_until(next) => {}
            _ = stop_rx.changed() => break,
        }
    }
}

async fn run_tick(shared: &Arc<Shared>) -> TickReport {
    let _tick_guard = shared.tick_lock.lock().await;
    let tick = shared.ticks_started.fetch_add(1, Ordering::SeqCst) + 1;
    let started = Instant::now();

    let locations = shared.registry.snapshot();
    let total = locations.len();
    let limit = shared.settings.max_concurrency.unwrap_or(total).max(1);
    let permits = Arc::new(Semaphore::new(limit));

    let mut tasks = JoinSet::new();
    for location in locations {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let shared = Arc::clone(shared);
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = process_location(&shared, &location).await;
            (location.name, outcome)
        });
    }

    let (mut assessed, mut skipped, mut alerts) = (0, 0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(alerted))) => {
                assessed += 1;
                if alerted {
                    alerts += 1;
                }
            }
            Ok((_, Err(_))) => skipped += 1,
            Err(e) => {
                skipped += 1;
                logging::error(
                    Component::Scheduler,
                    None,
                    &format!("Location task failed to complete: {}", e),
                );
            }
        }
    }

    let elapsed = started.elapsed();
    shared.ticks_completed.fetch_add(1, Ordering::SeqCst);
    logging::log_tick_summary(tick, total, assessed, skipped, elapsed);

    TickReport {
        tick,
        total,
        assessed,
        skipped,
        alerts,
        elapsed,
    }
}

/// One location, one tick. Returns whether an alert was emitted.
async fn process_location(shared: &Shared, location: &Location) -> Result<bool, MonitorError> {
    let id = location.id();

    let assessment = match acquire_assessment(shared, location).await {
        Ok(assessment) => assessment,
        Err(err) => {
            let _membership = shared.membership.read();
            if shared.registry.contains(id) {
                shared.health.record_failure(id, &err);
            }
            logging::log_tick_failure(id, &err);
            return Err(err);
        }
    };

    let previous = {
        let _membership = shared.membership.read();
        if !shared.registry.contains(id) {
            logging::debug(
                Component::History,
                Some(id),
                "Location deregistered mid-tick; assessment discarded",
            );
            return Err(MonitorError::UnknownLocation(id.to_string()));
        }
        let previous = shared.history.latest(id);
        shared.history.append(id, assessment.clone());
        shared.health.record_success(id, assessment.assessed_at);
        previous
    };

    logging::debug(
        Component::Evaluator,
        Some(id),
        &format!(
            "{} (score {:.3}, confidence {:.1}%)",
            assessment.level, assessment.score, assessment.confidence
        ),
    );

    if let Some(archive) = &shared.archive {
        archive_in_background(Arc::clone(archive), assessment.clone());
    }

    Ok(shared
        .emitter
        .evaluate(id, previous.as_ref(), &assessment)
        .is_some())
}

async fn acquire_assessment(shared: &Shared, location: &Location) -> Result<Assessment, MonitorError> {
    let reading =
        fetch_with_retry(shared.source.as_ref(), location, shared.settings.source_retry).await?;
    if reading.location_id != location.name {
        return Err(MonitorError::InvalidReading {
            location: location.name.clone(),
            reason: format!("reading is tagged for '{}'", reading.location_id),
        });
    }
    shared.evaluator.evaluate(&reading, location.vulnerability_factor)
}

fn archive_in_background(archive: Arc<dyn AssessmentArchive>, assessment: Assessment) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = archive.record(&assessment) {
            logging::warn(
                Component::Database,
                Some(&assessment.location_id),
                &format!("Archive write to '{}' failed: {}", archive.name(), e),
            );
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SimulatedSource;
    use crate::locations::find_city;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            tick_interval: Duration::from_millis(20),
            ..MonitorSettings::default()
        }
    }

    fn monitor() -> Monitor {
        Monitor::builder(settings(), Arc::new(SimulatedSource::seeded(8)))
            .evaluator(RiskEvaluator::seeded(8))
            .build()
    }

    #[tokio::test]
    async fn test_queries_on_unknown_location_error() {
        let monitor = monitor();
        let expected = MonitorError::UnknownLocation("Atlantis".to_string());
        assert_eq!(monitor.latest("Atlantis").unwrap_err(), expected);
        assert_eq!(monitor.recent("Atlantis", 5).unwrap_err(), expected);
        assert_eq!(monitor.history("Atlantis", Utc::now()).unwrap_err(), expected);
    }

    #[tokio::test]
    async fn test_manual_tick_assesses_every_location() {
        let monitor = monitor();
        for name in ["Mumbai", "Kochi", "Jaipur"] {
            monitor.register(find_city(name).unwrap().to_location()).unwrap();
        }
        let report = monitor.run_tick_now().await;
        assert_eq!(report.total, 3);
        assert_eq!(report.assessed, 3);
        assert_eq!(report.skipped, 0);
        for name in ["Mumbai", "Kochi", "Jaipur"] {
            assert!(monitor.latest(name).unwrap().is_some());
        }
        assert_eq!(monitor.status().ticks_completed, 1);
    }

    #[tokio::test]
    async fn test_deregister_drops_history() {
        let monitor = monitor();
        monitor.register(find_city("Patna").unwrap().to_location()).unwrap();
        monitor.run_tick_now().await;
        monitor.deregister("Patna").unwrap();
        assert!(monitor.latest("Patna").is_err());
        assert_eq!(monitor.shared.history.len("Patna"), 0);
    }

    #[tokio::test]
    async fn test_status_reports_session_shape() {
        let monitor = monitor();
        monitor.register(find_city("Chennai").unwrap().to_location()).unwrap();
        let status = monitor.status();
        assert_eq!(status.state, MonitoringState::Inactive);
        assert_eq!(status.tick_interval, Duration::from_millis(20));
        assert_eq!(status.location_count, 1);
        assert_eq!(status.retention_cap, 1000);
    }

    #[tokio::test]
    async fn test_stale_locations_show_in_status() {
        let monitor = monitor();
        monitor.register(find_city("Chennai").unwrap().to_location()).unwrap();
        monitor.run_tick_now().await;

        assert!(monitor.status().stale.is_empty());
        let later = Utc::now() + chrono::Duration::minutes(11);
        assert_eq!(monitor.status_at(later).stale, vec!["Chennai".to_string()]);
    }
}
