//! Appliance Sentinel - per-appliance ON/OFF decisioning service
//!
//! Accepts whole-house and single-device power readings over HTTP, decides
//! ON/OFF per appliance channel, and hands alerts and auto-off commands to a
//! background worker.

use anyhow::{Context, Result};
use sentinel_lib::{
    dispatch::{
        ActionDispatcher, ActionQueue, ActionWorker, InMemoryDirectory, LogNotifier, LogRelay,
    },
    health::{components, HealthRegistry},
    observability::{SentinelMetrics, StructuredLogger},
    predictor::{DecisionEngine, ModelRegistry, ThresholdTable},
    InferencePipeline,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting appliance-sentinel");

    let config = config::SentinelConfig::load()?;
    info!(
        instance = %config.instance_name,
        models_dir = %config.models_dir.display(),
        thresholds_file = %config.thresholds_file.display(),
        "Sentinel configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::DECISION_ENGINE).await;
    health_registry.register(components::ACTION_WORKER).await;

    let metrics = SentinelMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Thresholds and models are read once; a bad thresholds file is fatal
    let thresholds = ThresholdTable::load(&config.thresholds_file)
        .context("Failed to load threshold table")?;
    let registry = ModelRegistry::load_dir(&config.models_dir);

    let threshold_only = registry.threshold_only_channels();
    metrics.set_models_loaded(registry.len() as i64);
    health_registry.report_model_coverage(&threshold_only).await;
    logger.log_startup(
        SENTINEL_VERSION,
        registry.len(),
        &threshold_only
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>(),
    );

    let directory = match &config.devices_file {
        Some(path) => InMemoryDirectory::load(path).context("Failed to load device bindings")?,
        None => {
            warn!("No devices file configured, readings will not be dispatched to any device");
            InMemoryDirectory::default()
        }
    };
    info!(devices = directory.device_count().await, "Device directory ready");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (queue, rx) = ActionQueue::bounded(config.action_queue_capacity, logger.clone());
    let worker = ActionWorker::new(
        rx,
        Arc::new(LogNotifier::new(config.alert_from.clone())),
        Arc::new(LogRelay),
        logger.clone(),
    )
    .with_notification_timeout(Duration::from_millis(config.notification_timeout_ms));
    let worker_handle = worker.spawn(shutdown_tx.subscribe(), health_registry.clone());

    let engine = DecisionEngine::new(Arc::new(registry), Arc::new(thresholds));
    let pipeline = InferencePipeline::new(
        engine,
        Arc::new(directory),
        ActionDispatcher::new(queue),
        logger.clone(),
    );

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), pipeline));
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    logger.log_shutdown("API server task panicked");
                }
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(5), worker_handle)
        .await
        .is_err()
    {
        warn!("Action worker did not stop within 5s");
    }

    info!("Shutting down");
    Ok(())
}
