//! Risk transition alerts.
//!
//! The emitter compares each new assessment with the one before it and, when
//! the level changed, fans an `AlertEvent` out to every registered sink.
//! Delivery runs in detached tasks under a timeout, so a slow or dead sink
//! never holds up the tick that produced the alert.
//!
//! Source health (consecutive failures, stale data) lives in `staleness`,
//! since it is the other half of "is this location telling us something we
//! should act on".

pub mod sinks;
pub mod staleness;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::logging::{self, Component};
use crate::model::{AlertEvent, Assessment, MonitorError, RiskLevel};

pub use sinks::{AlertSink, ChannelSink, LogSink, WebhookSink};

// ---------------------------------------------------------------------------
// Transition rule
// ---------------------------------------------------------------------------

/// An alert is due when the level changed, or when the very first
/// assessment for a location is already HIGH.
pub fn is_alert_worthy(previous: Option<&Assessment>, current: &Assessment) -> bool {
    match previous {
        Some(prev) => prev.level != current.level,
        None => current.level == RiskLevel::High,
    }
}

// ---------------------------------------------------------------------------
// Delivery policy and counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryPolicy {
    /// Per-attempt deadline for a sink.
    pub timeout: Duration,
    /// Extra attempts after a failed or timed-out delivery.
    pub retries: u32,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    emitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the emitter's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeliveryStats {
    /// Events produced by `evaluate`.
    pub emitted: u64,
    /// Successful (event, sink) deliveries.
    pub delivered: u64,
    /// (event, sink) pairs abandoned after all attempts.
    pub failed: u64,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

pub struct AlertEmitter {
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
    policy: DeliveryPolicy,
    counters: Arc<Counters>,
}

impl AlertEmitter {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            policy,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn AlertSink>) {
        logging::info(
            Component::Sink,
            None,
            &format!("Registered alert sink '{}'", sink.name()),
        );
        self.sinks.write().push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Checks one transition and dispatches an event if it qualifies.
    ///
    /// Returns the event that was dispatched, if any. Returns as soon as the
    /// deliveries are spawned; it never waits for a sink.
    pub fn evaluate(
        &self,
        location_id: &str,
        previous: Option<&Assessment>,
        current: &Assessment,
    ) -> Option<AlertEvent> {
        if !is_alert_worthy(previous, current) {
            return None;
        }

        let event = AlertEvent {
            location_id: location_id.to_string(),
            previous_level: previous.map(|p| p.level),
            new_level: current.level,
            assessment: current.clone(),
            emitted_at: Utc::now(),
        };
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);

        let transition = match event.previous_level {
            Some(prev) => format!("{} → {}", prev, event.new_level),
            None => format!("first assessment at {}", event.new_level),
        };
        let message = format!("Risk transition {} (score {:.3})", transition, current.score);
        if event.new_level == RiskLevel::High {
            logging::warn(Component::Sink, Some(location_id), &message);
        } else {
            logging::info(Component::Sink, Some(location_id), &message);
        }

        self.dispatch(&event);
        Some(event)
    }

    fn dispatch(&self, event: &AlertEvent) {
        let sinks = self.sinks.read().clone();
        if sinks.is_empty() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                logging::error(
                    Component::Sink,
                    Some(&event.location_id),
                    "No async runtime available; alert dropped",
                );
                self.counters.failed.fetch_add(sinks.len() as u64, Ordering::Relaxed);
                return;
            }
        };

        for sink in sinks {
            let event = event.clone();
            let policy = self.policy;
            let counters = Arc::clone(&self.counters);
            handle.spawn(async move {
                if deliver(sink.as_ref(), &event, policy).await {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    }
}

impl Default for AlertEmitter {
    fn default() -> Self {
        Self::new(DeliveryPolicy::default())
    }
}

/// One sink, all attempts. Returns whether the event got through.
async fn deliver(sink: &dyn AlertSink, event: &AlertEvent, policy: DeliveryPolicy) -> bool {
    for attempt in 0..=policy.retries {
        let result = match tokio::time::timeout(policy.timeout, sink.deliver(event)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::SinkDeliveryFailed {
                sink: sink.name().to_string(),
                reason: format!("timed out after {} ms", policy.timeout.as_millis()),
            }),
        };

        match result {
            Ok(()) => return true,
            Err(err) => {
                if attempt == policy.retries {
                    logging::log_sink_failure(sink.name(), &event.location_id, &err);
                } else {
                    logging::debug(
                        Component::Sink,
                        Some(&event.location_id),
                        &format!("attempt {} to '{}' failed: {}", attempt + 1, sink.name(), err),
                    );
                }
            }
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reading;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    fn assessment(level: RiskLevel) -> Assessment {
        Assessment {
            location_id: "Chennai".to_string(),
            reading: Reading {
                location_id: "Chennai".to_string(),
                water_level: 0.0,
                rainfall: 0.0,
                river_flow: 0.0,
                captured_at: Utc::now(),
            },
            level,
            score: 0.5,
            confidence: 60.0,
            justification: String::new(),
            recommendation: String::new(),
            solutions: Vec::new(),
            helplines: Vec::new(),
            assessed_at: Utc::now(),
        }
    }

    struct Failing {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AlertSink for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _event: &AlertEvent) -> Result<(), MonitorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MonitorError::SinkDeliveryFailed {
                sink: "failing".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct Stalled;

    #[async_trait]
    impl AlertSink for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn deliver(&self, _event: &AlertEvent) -> Result<(), MonitorError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // --- Transition rule ----------------------------------------------------

    #[test]
    fn test_unchanged_level_is_not_alert_worthy() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert!(!is_alert_worthy(Some(&assessment(level)), &assessment(level)));
        }
    }

    #[test]
    fn test_any_level_change_is_alert_worthy() {
        let low = assessment(RiskLevel::Low);
        let medium = assessment(RiskLevel::Medium);
        let high = assessment(RiskLevel::High);
        assert!(is_alert_worthy(Some(&low), &medium));
        assert!(is_alert_worthy(Some(&medium), &high));
        assert!(is_alert_worthy(Some(&high), &low), "de-escalation is a transition too");
    }

    #[test]
    fn test_first_observation_alerts_only_when_high() {
        assert!(is_alert_worthy(None, &assessment(RiskLevel::High)));
        assert!(!is_alert_worthy(None, &assessment(RiskLevel::Medium)));
        assert!(!is_alert_worthy(None, &assessment(RiskLevel::Low)));
    }

    #[test]
    fn test_evaluate_without_sinks_still_reports_event() {
        let emitter = AlertEmitter::default();
        let event = emitter
            .evaluate("Chennai", None, &assessment(RiskLevel::High))
            .expect("first HIGH should emit");
        assert_eq!(event.previous_level, None);
        assert_eq!(event.new_level, RiskLevel::High);
        assert_eq!(emitter.stats().emitted, 1);
    }

    // --- Delivery -----------------------------------------------------------

    #[tokio::test]
    async fn test_exactly_one_event_per_transition_reaches_sink() {
        let emitter = AlertEmitter::default();
        let (sink, mut rx) = ChannelSink::new(16);
        emitter.add_sink(Arc::new(sink));

        let sequence = [RiskLevel::Low, RiskLevel::Low, RiskLevel::Medium, RiskLevel::Medium, RiskLevel::High];
        let mut previous: Option<Assessment> = None;
        for level in sequence {
            let current = assessment(level);
            emitter.evaluate("Chennai", previous.as_ref(), &current);
            previous = Some(current);
        }
        settle().await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push((event.previous_level, event.new_level));
        }
        assert_eq!(
            received,
            vec![
                (Some(RiskLevel::Low), RiskLevel::Medium),
                (Some(RiskLevel::Medium), RiskLevel::High),
            ]
        );
        assert_eq!(emitter.stats().delivered, 2);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_other_sinks() {
        let emitter = AlertEmitter::new(DeliveryPolicy {
            timeout: Duration::from_millis(50),
            retries: 2,
        });
        let failing = Arc::new(Failing { calls: AtomicU32::new(0) });
        let (sink, mut rx) = ChannelSink::new(4);
        emitter.add_sink(failing.clone());
        emitter.add_sink(Arc::new(sink));

        emitter.evaluate("Chennai", None, &assessment(RiskLevel::High));
        settle().await;

        assert!(rx.try_recv().is_ok(), "healthy sink should still receive the event");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 3, "one attempt plus two retries");
        let stats = emitter.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_stalled_sink_never_blocks_evaluate() {
        let emitter = AlertEmitter::new(DeliveryPolicy {
            timeout: Duration::from_millis(20),
            retries: 0,
        });
        emitter.add_sink(Arc::new(Stalled));

        let started = std::time::Instant::now();
        emitter.evaluate("Chennai", None, &assessment(RiskLevel::High));
        assert!(started.elapsed() < Duration::from_secs(1));

        settle().await;
        assert_eq!(emitter.stats().failed, 1, "stalled delivery should time out");
    }
}
