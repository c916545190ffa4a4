/// floodwatch daemon.
///
/// Usage: `floodwatch_service [CONFIG]`
///
/// Reads `CONFIG` (default `floodwatch.toml`; built-in defaults when that
/// file does not exist), registers the configured locations, and monitors
/// them until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use floodwatch_service::alert::{LogSink, WebhookSink};
use floodwatch_service::archive::PgArchive;
use floodwatch_service::config::{self, ServiceConfig, SourceKind};
use floodwatch_service::ingest::{HttpSource, MeasurementSource, SimulatedSource};
use floodwatch_service::logging::{self, Component};
use floodwatch_service::monitor::Monitor;

const DEFAULT_CONFIG_PATH: &str = "floodwatch.toml";

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match read_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("floodwatch: {}", e);
            std::process::exit(2);
        }
    };

    logging::init_logger(
        config.log_level(),
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    logging::info(
        Component::System,
        None,
        &format!("floodwatch starting (config: {})", config_path),
    );

    let source = match build_source(&config) {
        Ok(source) => source,
        Err(e) => {
            logging::error(Component::Config, None, &format!("Cannot build measurement source: {}", e));
            std::process::exit(2);
        }
    };

    let mut builder = Monitor::builder(config.monitor_settings(), source);

    if config.alerts.log {
        builder = builder.sink(Arc::new(LogSink));
    }
    if let Some(url) = &config.alerts.webhook_url {
        let timeout = Duration::from_millis(config.sink_timeout_ms);
        match WebhookSink::new("webhook", url, timeout) {
            Ok(sink) => builder = builder.sink(Arc::new(sink)),
            Err(e) => logging::warn(Component::Config, None, &format!("Webhook sink disabled: {}", e)),
        }
    }

    if config.archive.enabled {
        match config.archive.database_url.clone() {
            Some(url) => match tokio::task::spawn_blocking(move || PgArchive::connect(&url)).await {
                Ok(Ok(archive)) => {
                    logging::info(Component::Database, None, "Archiving assessments to PostgreSQL");
                    builder = builder.archive(Arc::new(archive));
                }
                Ok(Err(e)) => logging::warn(Component::Database, None, &format!("Archive disabled: {}", e)),
                Err(e) => logging::warn(Component::Database, None, &format!("Archive disabled: {}", e)),
            },
            None => logging::warn(
                Component::Database,
                None,
                "archive.enabled is set but no database URL is configured",
            ),
        }
    }

    let monitor = builder.build();
    for location in config.effective_locations() {
        if let Err(e) = monitor.register(location) {
            logging::warn(Component::Registry, None, &format!("Skipping location: {}", e));
        }
    }

    monitor.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        logging::error(Component::System, None, &format!("Cannot listen for Ctrl-C: {}", e));
    }

    logging::info(Component::System, None, "Shutdown requested");
    monitor.stop().await;

    let overview = monitor.overview();
    logging::info(
        Component::System,
        None,
        &format!(
            "Final standing: {} HIGH, {} MEDIUM, {} LOW, {} unassessed",
            overview.high, overview.medium, overview.low, overview.unassessed
        ),
    );
}

fn read_config(path: &str) -> Result<ServiceConfig, config::ConfigError> {
    if Path::new(path).exists() {
        return config::load_config(path);
    }
    if path != DEFAULT_CONFIG_PATH {
        return Err(config::ConfigError::Invalid(format!("config file {} not found", path)));
    }

    dotenv::dotenv().ok();
    let mut config = ServiceConfig::default();
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn build_source(config: &ServiceConfig) -> Result<Arc<dyn MeasurementSource>, String> {
    match config.source.kind {
        SourceKind::Simulated => Ok(match config.source.seed {
            Some(seed) => Arc::new(SimulatedSource::seeded(seed)),
            None => Arc::new(SimulatedSource::new()),
        }),
        SourceKind::Http => {
            let base_url = config
                .source
                .base_url
                .as_deref()
                .ok_or_else(|| "source.base_url is not set".to_string())?;
            let timeout = Duration::from_secs(config.source.timeout_secs);
            let source = HttpSource::new(base_url, timeout).map_err(|e| e.to_string())?;
            Ok(Arc::new(source))
        }
    }
}
