//! Per-appliance ON/OFF decisioning for household power metering
//!
//! This crate provides the core functionality for:
//! - Feature extraction from whole-house readings
//! - Model-vs-threshold arbitration per appliance channel
//! - Alert and auto-off dispatch toward a background worker
//! - Health checks and observability

pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;

pub use error::{ConfigError, DispatchError, IngestError, ModelError, ValidationError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use pipeline::InferencePipeline;
