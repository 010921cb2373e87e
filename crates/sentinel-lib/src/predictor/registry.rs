//! Per-channel model registry
//!
//! Holds at most one classifier per channel for the lifetime of the process.
//! Artifacts are loaded once at startup; a channel whose artifact is missing,
//! corrupt, or fails checksum validation resolves to "no model" and is
//! decided by threshold alone.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::{ChannelClassifier, OnnxClassifier};
use crate::error::ConfigError;
use crate::models::Channel;

/// File name suffix of a channel's exported pipeline
pub const ARTIFACT_SUFFIX: &str = "_pipeline.onnx";

/// Extension of the optional checksum sidecar
const CHECKSUM_EXTENSION: &str = "sha256";

/// Path of the artifact for a channel inside `models_dir`
pub fn artifact_path(models_dir: &Path, channel: Channel) -> PathBuf {
    models_dir.join(format!("{}{}", channel.as_str(), ARTIFACT_SUFFIX))
}

/// Immutable channel → classifier map
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<Channel, Arc<dyn ChannelClassifier>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("channels", &self.loaded_channels())
            .finish()
    }
}

impl ModelRegistry {
    /// Registry with no models: every channel is threshold-only
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a classifier for a channel
    pub fn with_model(mut self, channel: Channel, model: Arc<dyn ChannelClassifier>) -> Self {
        self.models.insert(channel, model);
        self
    }

    /// Load `ApplianceN_pipeline.onnx` for every channel from a directory.
    ///
    /// Never fails: every problem is logged once and leaves the channel
    /// without a model.
    pub fn load_dir(models_dir: &Path) -> Self {
        let mut registry = Self::empty();
        for channel in Channel::ALL {
            let path = artifact_path(models_dir, channel);
            if !path.exists() {
                warn!(
                    event = "model_missing",
                    channel = %channel,
                    path = %path.display(),
                    "Model file not found, channel will use threshold-only fallback"
                );
                continue;
            }
            match load_artifact(channel, &path) {
                Ok(model) => {
                    info!(
                        channel = %channel,
                        version = %model.model_version(),
                        "Loaded channel model"
                    );
                    registry.models.insert(channel, Arc::new(model));
                }
                Err(e) => {
                    warn!(
                        event = "model_missing",
                        channel = %channel,
                        error = %e,
                        "Model failed to load, channel will use threshold-only fallback"
                    );
                }
            }
        }
        registry
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ChannelClassifier>> {
        self.models.get(&channel)
    }

    pub fn has_model(&self, channel: Channel) -> bool {
        self.models.contains_key(&channel)
    }

    pub fn loaded_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.models.keys().copied().collect();
        channels.sort();
        channels
    }

    /// Channels that will be decided by threshold alone
    pub fn threshold_only_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| !self.models.contains_key(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn load_artifact(channel: Channel, path: &Path) -> Result<OnnxClassifier, ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let checksum = compute_checksum(&bytes);
    verify_checksum(path, &checksum)?;

    // Short digest doubles as the artifact version
    let version = format!("sha256:{}", &checksum[..12]);
    OnnxClassifier::new(channel, &bytes, version).map_err(|source| ConfigError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Compare against `<artifact>.sha256` when that sidecar exists
fn verify_checksum(path: &Path, actual: &str) -> Result<(), ConfigError> {
    let sidecar = checksum_sidecar(path);
    let expected = match fs::read_to_string(&sidecar) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: sidecar,
                source,
            })
        }
    };

    // Accept both a bare digest and `sha256sum` output
    let expected = expected
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if expected != actual {
        return Err(ConfigError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn checksum_sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(CHECKSUM_EXTENSION);
    PathBuf::from(name)
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
