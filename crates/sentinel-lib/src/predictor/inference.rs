//! ONNX classifier inference using tract
//!
//! Loads exported per-channel pipelines and runs single-row inference.
//! The first model output is read as the predicted class label.

use super::ChannelClassifier;
use crate::error::ModelError;
use crate::models::{Channel, FeatureVector, Label};
use crate::observability::SentinelMetrics;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Per-call latency target before a slow-inference warning
const DEFAULT_LATENCY_TARGET: Duration = Duration::from_millis(5);

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based binary classifier for one channel
pub struct OnnxClassifier {
    channel: Channel,
    model: TractModel,
    version: String,
    latency_target: Duration,
    metrics: SentinelMetrics,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("channel", &self.channel)
            .field("version", &self.version)
            .finish()
    }
}

impl OnnxClassifier {
    /// Create a classifier from model bytes
    pub fn new(channel: Channel, model_bytes: &[u8], version: impl Into<String>) -> Result<Self> {
        let model = Self::load_model(model_bytes)?;
        Ok(Self {
            channel,
            model,
            version: version.into(),
            latency_target: DEFAULT_LATENCY_TARGET,
            metrics: SentinelMetrics::new(),
        })
    }

    pub fn with_latency_target(mut self, target: Duration) -> Self {
        self.latency_target = target;
        self
    }

    /// Parse and optimize an ONNX model with a fixed `[1, 5]` input
    fn load_model(model_bytes: &[u8]) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, FeatureVector::LEN]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn features_to_tensor(&self, features: &FeatureVector) -> Tensor {
        tract_ndarray::arr2(&[features.to_array()]).into()
    }

    fn run(&self, features: &FeatureVector) -> Result<f32> {
        let input = self.features_to_tensor(features);
        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let labels = output
            .cast_to::<f32>()
            .context("Model label output is not numeric")?;
        let value = labels
            .as_slice::<f32>()?
            .first()
            .copied()
            .context("Model label output is empty")?;
        Ok(value)
    }
}

impl ChannelClassifier for OnnxClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Label, ModelError> {
        let start = Instant::now();

        let value = self.run(features).map_err(|source| ModelError::Runtime {
            channel: self.channel,
            source,
        })?;

        let elapsed = start.elapsed();
        if elapsed > self.latency_target {
            self.metrics.inc_slow_inference(self.channel.as_str());
            warn!(
                channel = %self.channel,
                elapsed_us = elapsed.as_micros(),
                target_us = self.latency_target.as_micros(),
                "Inference exceeded latency target"
            );
        } else {
            debug!(
                channel = %self.channel,
                elapsed_us = elapsed.as_micros(),
                "Inference completed"
            );
        }

        label_from_output(self.channel, value)
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

/// Map a raw label output onto the binary label set
pub(crate) fn label_from_output(channel: Channel, value: f32) -> Result<Label, ModelError> {
    if value == 0.0 {
        Ok(Label::Negative)
    } else if value == 1.0 {
        Ok(Label::Positive)
    } else {
        Err(ModelError::UnexpectedLabel { channel, value })
    }
}
