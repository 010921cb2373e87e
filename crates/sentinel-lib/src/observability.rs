//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (inference latency, decisions by source, side-effect flow)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    inference_latency_seconds: Histogram,
    readings_processed: IntCounter,
    validation_errors: IntCounter,
    decisions: IntCounterVec,
    model_failures: IntCounterVec,
    slow_inferences: IntCounterVec,
    side_effects_enqueued: IntCounterVec,
    side_effects_dropped: IntCounter,
    side_effect_failures: IntCounterVec,
    models_loaded: IntGauge,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram!(
                "sentinel_inference_latency_seconds",
                "Time spent deciding all channels of one reading",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            readings_processed: register_int_counter!(
                "sentinel_readings_processed_total",
                "Total number of readings run through inference"
            )
            .expect("Failed to register readings_processed"),

            validation_errors: register_int_counter!(
                "sentinel_validation_errors_total",
                "Total number of readings rejected as malformed"
            )
            .expect("Failed to register validation_errors"),

            decisions: register_int_counter_vec!(
                "sentinel_decisions_total",
                "Channel decisions by the path that produced them",
                &["source"]
            )
            .expect("Failed to register decisions"),

            model_failures: register_int_counter_vec!(
                "sentinel_model_failures_total",
                "Model invocations that failed and fell back to threshold",
                &["channel"]
            )
            .expect("Failed to register model_failures"),

            slow_inferences: register_int_counter_vec!(
                "sentinel_slow_inferences_total",
                "Model invocations slower than the per-call latency target",
                &["channel"]
            )
            .expect("Failed to register slow_inferences"),

            side_effects_enqueued: register_int_counter_vec!(
                "sentinel_side_effects_enqueued_total",
                "Side effects handed to the background worker",
                &["kind"]
            )
            .expect("Failed to register side_effects_enqueued"),

            side_effects_dropped: register_int_counter!(
                "sentinel_side_effects_dropped_total",
                "Side effects dropped because the queue was full or closed"
            )
            .expect("Failed to register side_effects_dropped"),

            side_effect_failures: register_int_counter_vec!(
                "sentinel_side_effect_failures_total",
                "Side effects whose delivery failed",
                &["kind"]
            )
            .expect("Failed to register side_effect_failures"),

            models_loaded: register_int_gauge!(
                "sentinel_models_loaded",
                "Number of channels with a loaded model"
            )
            .expect("Failed to register models_loaded"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SentinelMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SentinelMetrics")
    }
}

impl SentinelMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn inc_readings_processed(&self) {
        self.inner().readings_processed.inc();
    }

    pub fn inc_validation_errors(&self) {
        self.inner().validation_errors.inc();
    }

    pub fn inc_decision(&self, source: &str) {
        self.inner().decisions.with_label_values(&[source]).inc();
    }

    pub fn inc_model_failure(&self, channel: &str) {
        self.inner().model_failures.with_label_values(&[channel]).inc();
    }

    pub fn inc_slow_inference(&self, channel: &str) {
        self.inner().slow_inferences.with_label_values(&[channel]).inc();
    }

    pub fn slow_inferences(&self, channel: &str) -> u64 {
        self.inner().slow_inferences.with_label_values(&[channel]).get()
    }

    pub fn inc_side_effect_enqueued(&self, kind: &str) {
        self.inner()
            .side_effects_enqueued
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_side_effect_dropped(&self) {
        self.inner().side_effects_dropped.inc();
    }

    pub fn inc_side_effect_failure(&self, kind: &str) {
        self.inner()
            .side_effect_failures
            .with_label_values(&[kind])
            .inc();
    }

    pub fn set_models_loaded(&self, count: i64) {
        self.inner().models_loaded.set(count);
    }
}

/// Structured logger for lifecycle and delivery events
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, models_loaded: usize, threshold_only: &[String]) {
        info!(
            event = "sentinel_started",
            instance = %self.instance,
            version = %version,
            models_loaded = models_loaded,
            threshold_only = ?threshold_only,
            "Appliance sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Appliance sentinel shutting down"
        );
    }

    pub fn log_batch(&self, house_id: i64, decisions: usize, actions: usize) {
        info!(
            event = "reading_processed",
            instance = %self.instance,
            house_id = house_id,
            decisions = decisions,
            actions = actions,
            "Processed reading"
        );
    }

    pub fn log_delivery_failure(&self, kind: &str, device_id: &str, error: &str) {
        warn!(
            event = "side_effect_failed",
            instance = %self.instance,
            kind = %kind,
            device_id = %device_id,
            error = %error,
            "Side effect delivery failed"
        );
    }

    pub fn log_dropped(&self, kind: &str, device_id: &str, reason: &str) {
        warn!(
            event = "side_effect_dropped",
            instance = %self.instance,
            kind = %kind,
            device_id = %device_id,
            reason = %reason,
            "Side effect dropped before delivery"
        );
    }
}
