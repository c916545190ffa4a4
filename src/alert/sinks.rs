/// Alert sinks: where risk transitions end up.
///
/// Notification bots, SMS gateways and dashboards are external
/// collaborators. This module only defines the contract and the three
/// adapters the service ships with:
/// - `LogSink`: writes the alert to the service log.
/// - `ChannelSink`: hands events to an in-process consumer.
/// - `WebhookSink`: POSTs the event as JSON to a notification bot.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::logging::{self, Component};
use crate::model::{AlertEvent, MonitorError, RiskLevel};

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one event. Errors are logged by the emitter and never reach
    /// the monitoring loop.
    async fn deliver(&self, event: &AlertEvent) -> Result<(), MonitorError>;
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

pub struct LogSink;

/// The line `LogSink` writes for an event.
pub fn format_alert(event: &AlertEvent) -> String {
    let previous = event
        .previous_level
        .map(|l| l.to_string())
        .unwrap_or_else(|| "NONE".to_string());
    format!(
        "ALERT {} → {} (score {:.3}, confidence {:.1}%): {}. {}",
        previous,
        event.new_level,
        event.assessment.score,
        event.assessment.confidence,
        event.assessment.justification,
        event.assessment.recommendation
    )
}

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        let line = format_alert(event);
        match event.new_level {
            RiskLevel::High => logging::error(Component::Sink, Some(&event.location_id), &line),
            RiskLevel::Medium => logging::warn(Component::Sink, Some(&event.location_id), &line),
            RiskLevel::Low => logging::info(Component::Sink, Some(&event.location_id), &line),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Channel sink
// ---------------------------------------------------------------------------

/// Forwards events into a bounded `tokio::mpsc` channel.
pub struct ChannelSink {
    tx: mpsc::Sender<AlertEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| MonitorError::SinkDeliveryFailed {
                sink: "channel".to_string(),
                reason: "receiver dropped".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Webhook sink
// ---------------------------------------------------------------------------

/// POSTs each event as JSON to a fixed URL.
pub struct WebhookSink {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::SinkDeliveryFailed {
                sink: name.to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        let failed = |reason: String| MonitorError::SinkDeliveryFailed {
            sink: self.name.clone(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assessment, Reading};
    use chrono::Utc;

    fn event(previous: Option<RiskLevel>, new_level: RiskLevel) -> AlertEvent {
        let reading = Reading {
            location_id: "Patna".to_string(),
            water_level: 90.0,
            rainfall: 250.0,
            river_flow: 500.0,
            captured_at: Utc::now(),
        };
        AlertEvent {
            location_id: "Patna".to_string(),
            previous_level: previous,
            new_level,
            assessment: Assessment {
                location_id: "Patna".to_string(),
                reading,
                level: new_level,
                score: 0.712,
                confidence: 81.5,
                justification: "HIGH risk driven mainly by water level of 90 cm".to_string(),
                recommendation: "Evacuate".to_string(),
                solutions: Vec::new(),
                helplines: Vec::new(),
                assessed_at: Utc::now(),
            },
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_alert_includes_transition_and_advice() {
        let line = format_alert(&event(Some(RiskLevel::Medium), RiskLevel::High));
        assert!(line.starts_with("ALERT MEDIUM → HIGH"), "got: {}", line);
        assert!(line.contains("score 0.712"));
        assert!(line.contains("Evacuate"));

        let first = format_alert(&event(None, RiskLevel::High));
        assert!(first.starts_with("ALERT NONE → HIGH"), "got: {}", first);
    }

    #[test]
    fn test_alert_event_serializes_for_webhooks() {
        let json = serde_json::to_value(event(Some(RiskLevel::Low), RiskLevel::Medium)).unwrap();
        assert_eq!(json["location_id"], "Patna");
        assert_eq!(json["previous_level"], "LOW");
        assert_eq!(json["new_level"], "MEDIUM");
        assert_eq!(json["assessment"]["reading"]["river_flow"], 500.0);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new(2);
        sink.deliver(&event(None, RiskLevel::High)).await.unwrap();
        let received = rx.recv().await.expect("event should arrive");
        assert_eq!(received.new_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_channel_sink_fails_when_receiver_dropped() {
        let (sink, rx) = ChannelSink::new(2);
        drop(rx);
        let result = sink.deliver(&event(None, RiskLevel::High)).await;
        assert!(matches!(result, Err(MonitorError::SinkDeliveryFailed { .. })));
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        assert!(LogSink.deliver(&event(None, RiskLevel::Low)).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_to_closed_port_reports_delivery_failure() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let sink = WebhookSink::new("bot", "http://127.0.0.1:9/alerts", Duration::from_millis(500))
            .unwrap();
        let result = sink.deliver(&event(None, RiskLevel::High)).await;
        match result {
            Err(MonitorError::SinkDeliveryFailed { sink, .. }) => assert_eq!(sink, "bot"),
            other => panic!("expected SinkDeliveryFailed, got {:?}", other),
        }
    }
}
