//! Sentinel configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Sentinel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP port for ingestion, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding `ApplianceN_pipeline.onnx` artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// JSON map of channel → watts cutoff
    #[serde(default = "default_thresholds_file")]
    pub thresholds_file: PathBuf,

    /// JSON array of device bindings
    #[serde(default)]
    pub devices_file: Option<PathBuf>,

    /// Capacity of the side-effect queue
    #[serde(default = "default_action_queue_capacity")]
    pub action_queue_capacity: usize,

    /// Upper bound for a single alert send
    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,

    /// Sender address for alerts
    #[serde(default = "default_alert_from")]
    pub alert_from: Option<String>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "appliance-sentinel".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_models_dir() -> PathBuf {
    std::env::var("ML_MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ml_models"))
}

fn default_thresholds_file() -> PathBuf {
    std::env::var("THRESHOLDS_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("thresholds.json"))
}

fn default_action_queue_capacity() -> usize {
    1024
}

fn default_notification_timeout_ms() -> u64 {
    10_000
}

fn default_alert_from() -> Option<String> {
    std::env::var("ALERT_FROM").ok()
}

impl SentinelConfig {
    /// Load configuration from an optional file and `SENTINEL_*` environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("SENTINEL_CONFIG") {
            builder = builder.add_source(config::File::from(PathBuf::from(path)));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .try_parsing(true)
                    .ignore_empty(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }
}
