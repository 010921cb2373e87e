//! Error taxonomy for the decision core

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Channel;

/// Malformed reading input; fails the whole batch
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("malformed timestamp '{0}'")]
    Timestamp(String),

    #[error("reading has no aggregate value")]
    MissingAggregate,

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("value for '{field}' is not a number")]
    NotANumber { field: String },

    #[error("value for '{field}' is not finite")]
    NonFinite { field: String },
}

/// A channel classifier failed to produce a label
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model for {channel} rejected input: {reason}")]
    Input { channel: Channel, reason: String },

    #[error("model for {channel} failed: {source}")]
    Runtime {
        channel: Channel,
        #[source]
        source: anyhow::Error,
    },

    #[error("model for {channel} returned label {value}, expected 0 or 1")]
    UnexpectedLabel { channel: Channel, value: f32 },
}

/// Startup configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse thresholds file {path:?}: {source}")]
    Thresholds {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid threshold for {channel}: {value}")]
    InvalidThreshold { channel: String, value: f64 },

    #[error("failed to parse devices file {path:?}: {source}")]
    Devices {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to load model artifact {path:?}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Side-effect delivery failures; logged by the worker, never surfaced
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification to {recipient} failed: {reason}")]
    Notification { recipient: String, reason: String },

    #[error("notification to {recipient} timed out")]
    NotificationTimeout { recipient: String },

    #[error("relay deactivation for device {device_id} failed: {reason}")]
    Relay { device_id: String, reason: String },
}

/// Failure of an ingestion call as seen by the caller
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("device {device_id} not found in house {house_id}")]
    DeviceNotFound { device_id: String, house_id: i64 },

    #[error("device {0} not found")]
    UnknownDevice(String),
}
