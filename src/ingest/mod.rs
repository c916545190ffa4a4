//! Measurement sources.
//!
//! A source answers one question: "what are the conditions at this location
//! right now?". The orchestrator asks once per location per tick and treats
//! every failure as a skip for that tick.
//!
//! Submodules:
//! - `simulated`: seedable generator biased by each location's vulnerability.
//! - `http`: pulls readings from a sensor gateway over HTTP.

pub mod http;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;

use crate::logging::{self, Component};
use crate::model::{Location, MonitorError, Reading};

pub use http::HttpSource;
pub use simulated::SimulatedSource;

/// Anything that can produce a reading for a registered location.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Fetch the current reading. Transport problems should surface as
    /// `SourceUnavailable`; the reading itself is validated by the evaluator.
    async fn fetch(&self, location: &Location) -> Result<Reading, MonitorError>;
}

/// How hard to try before giving up on a location for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Delay before each retry; doubles every attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Fetches with bounded retry. Only `SourceUnavailable` is retried; any other
/// error comes straight back since asking again would not change it.
pub async fn fetch_with_retry(
    source: &dyn MeasurementSource,
    location: &Location,
    policy: RetryPolicy,
) -> Result<Reading, MonitorError> {
    let mut attempt = 0;
    let mut delay = policy.backoff;
    loop {
        match source.fetch(location).await {
            Ok(reading) => return Ok(reading),
            Err(err @ MonitorError::SourceUnavailable { .. }) if attempt < policy.retries => {
                attempt += 1;
                logging::debug(
                    Component::Source,
                    Some(location.id()),
                    &format!(
                        "{} attempt {}/{} failed, retrying in {} ms: {}",
                        source.name(),
                        attempt,
                        policy.retries + 1,
                        delay.as_millis(),
                        err
                    ),
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
