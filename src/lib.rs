//! Flood risk monitoring service.
//!
//! Periodically pulls water level, rainfall and river flow readings for a
//! set of registered locations, scores them into LOW / MEDIUM / HIGH risk,
//! keeps a bounded per-location history and notifies alert sinks when a
//! location's risk level changes.
//!
//! Module map:
//! - `model`    : shared data types and the `MonitorError` taxonomy
//! - `risk`     : weighted risk score, levels, confidence, advice
//! - `history`  : bounded per-location assessment history
//! - `locations`: city catalog and the location registry
//! - `ingest`   : measurement sources (simulated, HTTP gateway)
//! - `alert`    : transition detection, sinks, source health
//! - `analysis` : cross-location overview
//! - `archive`  : optional PostgreSQL archive
//! - `monitor`  : the scheduling loop tying it all together
//! - `config`   : TOML configuration and env overrides
//! - `logging`  : component-tagged logging

pub mod alert;
pub mod analysis;
pub mod archive;
pub mod config;
pub mod history;
pub mod ingest;
pub mod locations;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod risk;

pub use model::{AlertEvent, Assessment, Location, MonitorError, MonitoringState, Reading, RiskLevel};
pub use monitor::{Monitor, MonitorBuilder, MonitorStatus, TickReport};
