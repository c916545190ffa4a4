/// Sensor gateway HTTP client
///
/// Retrieves the latest reading for a location from a sensor gateway that
/// aggregates the field devices (water level gauges, rain gauges, flow
/// meters). The gateway exposes one JSON document per location:
///
/// ```text
/// GET {base_url}/readings/{location}
/// {"water_level": 85.0, "rainfall": 180.0, "river_flow": 450.0,
///  "timestamp": "2024-07-01T06:00:00Z"}
/// ```
///
/// `timestamp` is optional; when missing the reading is stamped on arrival.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::MeasurementSource;
use crate::model::{Location, MonitorError, Reading};

/// Payload returned by the gateway for one location.
#[derive(Debug, Deserialize)]
pub struct ReadingPayload {
    pub water_level: f64,
    pub rainfall: f64,
    pub river_flow: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MonitorError> {
        let base_url = Url::parse(base_url).map_err(|e| MonitorError::SourceUnavailable {
            location: String::new(),
            reason: format!("invalid gateway URL '{}': {}", base_url, e),
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::SourceUnavailable {
                location: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, base_url })
    }

    /// `{base}/readings/{name}`, with the name percent-encoded as a path
    /// segment.
    pub fn reading_url(&self, location_id: &str) -> Result<Url, MonitorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MonitorError::SourceUnavailable {
                location: location_id.to_string(),
                reason: format!("gateway URL '{}' cannot take a path", self.base_url),
            })?
            .pop_if_empty()
            .push("readings")
            .push(location_id);
        Ok(url)
    }
}

/// Turns a gateway response body into a `Reading`.
///
/// A body that does not parse is a bad sample, not an outage: it comes back
/// as `InvalidReading` so the location is skipped without a retry.
pub fn parse_payload(location_id: &str, body: &str) -> Result<Reading, MonitorError> {
    let payload: ReadingPayload =
        serde_json::from_str(body).map_err(|e| MonitorError::InvalidReading {
            location: location_id.to_string(),
            reason: format!("malformed payload: {}", e),
        })?;

    Ok(Reading {
        location_id: location_id.to_string(),
        water_level: payload.water_level,
        rainfall: payload.rainfall,
        river_flow: payload.river_flow,
        captured_at: payload.timestamp.unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl MeasurementSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, location: &Location) -> Result<Reading, MonitorError> {
        let id = location.id();
        let unavailable = |reason: String| MonitorError::SourceUnavailable {
            location: id.to_string(),
            reason,
        };

        let url = self.reading_url(id)?;
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    unavailable(format!("request timed out: {}", e))
                } else {
                    unavailable(format!("request failed: {}", e))
                }
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(unavailable("no reading yet".to_string())),
            status => return Err(unavailable(format!("HTTP {}", status))),
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("failed to read body: {}", e)))?;
        parse_payload(id, &body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_payload_with_timestamp() {
        let body = r#"{"water_level": 85.0, "rainfall": 180, "river_flow": 450.5,
                       "timestamp": "2024-07-01T06:00:00Z"}"#;
        let reading = parse_payload("Mumbai", body).expect("payload should parse");
        assert_eq!(reading.location_id, "Mumbai");
        assert_eq!(reading.water_level, 85.0);
        assert_eq!(reading.rainfall, 180.0);
        assert_eq!(reading.river_flow, 450.5);
        assert_eq!(reading.captured_at, Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_payload_without_timestamp_is_stamped_now() {
        let before = Utc::now();
        let reading =
            parse_payload("Mumbai", r#"{"water_level": 1, "rainfall": 2, "river_flow": 3}"#)
                .unwrap();
        assert!(reading.captured_at >= before);
    }

    #[test]
    fn test_parse_payload_rejects_missing_fields() {
        let result = parse_payload("Mumbai", r#"{"water_level": 1}"#);
        match result {
            Err(MonitorError::InvalidReading { location, reason }) => {
                assert_eq!(location, "Mumbai");
                assert!(reason.starts_with("malformed payload"), "got: {}", reason)
            }
            other => panic!("expected InvalidReading, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_payload_rejects_non_numeric_values() {
        let body = r#"{"water_level": "rising", "rainfall": 2, "river_flow": 3}"#;
        assert!(
            matches!(parse_payload("Mumbai", body), Err(MonitorError::InvalidReading { .. })),
            "a garbled sample must not look like a source outage"
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_not_retried() {
        use crate::ingest::{RetryPolicy, fetch_with_retry};
        use std::sync::atomic::{AtomicU32, Ordering};

        /// Serves the same garbled body every time.
        struct Garbled {
            calls: AtomicU32,
        }

        #[async_trait]
        impl MeasurementSource for Garbled {
            fn name(&self) -> &str {
                "garbled"
            }

            async fn fetch(&self, location: &Location) -> Result<Reading, MonitorError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                parse_payload(location.id(), r#"{"water_level": "rising"}"#)
            }
        }

        let source = Garbled {
            calls: AtomicU32::new(0),
        };
        let location = crate::locations::find_city("Mumbai").unwrap().to_location();
        let policy = RetryPolicy {
            retries: 3,
            backoff: Duration::from_millis(1),
        };
        let result = fetch_with_retry(&source, &location, policy).await;
        assert!(matches!(result, Err(MonitorError::InvalidReading { .. })));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_negative_values_pass_through_for_evaluator_to_reject() {
        let reading =
            parse_payload("Mumbai", r#"{"water_level": -4, "rainfall": 0, "river_flow": 0}"#)
                .unwrap();
        assert!(reading.validate().is_err());
    }

    #[test]
    fn test_reading_url_encodes_location_name() {
        let source = HttpSource::new("http://gateway.local:8080/api/", Duration::from_secs(5)).unwrap();
        let url = source.reading_url("Pimpri Chinchwad").unwrap();
        assert_eq!(url.as_str(), "http://gateway.local:8080/api/readings/Pimpri%20Chinchwad");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(HttpSource::new("not a url", Duration::from_secs(5)).is_err());
    }
}
