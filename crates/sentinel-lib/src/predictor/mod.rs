//! Per-channel ON/OFF inference

mod engine;
mod features;
mod inference;
mod registry;
mod thresholds;

pub use engine::DecisionEngine;
pub use features::{parse_timestamp, FeatureBuilder, WEEKEND_START};
pub use inference::OnnxClassifier;
pub use registry::{artifact_path, ModelRegistry, ARTIFACT_SUFFIX};
pub use thresholds::{ThresholdTable, DEFAULT_THRESHOLD_WATTS};

use crate::error::ModelError;
use crate::models::{FeatureVector, Label};

/// A trained binary classifier bound to one channel
pub trait ChannelClassifier: Send + Sync {
    /// Predict the class label for one feature row
    fn predict(&self, features: &FeatureVector) -> Result<Label, ModelError>;

    /// Identifier of the loaded artifact
    fn model_version(&self) -> &str;
}
