//! Per-channel power cutoffs used when no model can decide

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::warn;

use crate::error::ConfigError;
use crate::models::Channel;

/// Cutoff applied when neither a file entry nor a table entry exists
pub const DEFAULT_THRESHOLD_WATTS: f64 = 1000.0;

/// Static channel → watts cutoff table, read-only after load
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    cutoffs: HashMap<Channel, f64>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::uniform(DEFAULT_THRESHOLD_WATTS)
    }
}

impl ThresholdTable {
    /// Same cutoff for every channel
    pub fn uniform(watts: f64) -> Self {
        Self {
            cutoffs: Channel::ALL.iter().map(|&c| (c, watts)).collect(),
        }
    }

    /// Only the given entries; other channels resolve to the default
    pub fn from_entries(entries: impl IntoIterator<Item = (Channel, f64)>) -> Self {
        Self {
            cutoffs: entries.into_iter().collect(),
        }
    }

    /// Load a JSON object of `"ApplianceN": watts`.
    ///
    /// A missing file yields the uniform default with one warning; a file
    /// that exists but cannot be parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    event = "thresholds_missing",
                    path = %path.display(),
                    default_watts = DEFAULT_THRESHOLD_WATTS,
                    "Thresholds file not found, using default for every channel"
                );
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let raw: BTreeMap<String, f64> =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Thresholds {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let mut cutoffs = HashMap::new();
        for (key, value) in raw {
            let Ok(channel) = key.parse::<Channel>() else {
                warn!(key = %key, "Ignoring threshold for unknown channel");
                continue;
            };
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    channel: key,
                    value,
                });
            }
            cutoffs.insert(channel, value);
        }

        for channel in Channel::ALL {
            if !cutoffs.contains_key(&channel) {
                warn!(
                    channel = %channel,
                    default_watts = DEFAULT_THRESHOLD_WATTS,
                    "No threshold configured, using default"
                );
            }
        }

        Ok(Self { cutoffs })
    }

    /// Configured cutoff, if any
    pub fn configured(&self, channel: Channel) -> Option<f64> {
        self.cutoffs.get(&channel).copied()
    }

    /// Cutoff for a channel, falling back to the hard-coded default
    pub fn get(&self, channel: Channel) -> f64 {
        self.configured(channel).unwrap_or(DEFAULT_THRESHOLD_WATTS)
    }
}
