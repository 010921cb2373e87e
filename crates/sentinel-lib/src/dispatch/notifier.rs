//! Delivery seams for alerts and relay commands
//!
//! SMTP and relay transports live outside this crate. The logging
//! implementations here record the side effect as a structured event and are
//! used when no transport is wired in.

use async_trait::async_trait;
use tracing::info;

use super::EmailAlert;
use crate::error::DispatchError;

/// Sends email alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, alert: &EmailAlert) -> Result<(), DispatchError>;
}

/// Switches off a device's relay
#[async_trait]
pub trait RelayActuator: Send + Sync {
    async fn deactivate(&self, device_id: &str) -> Result<(), DispatchError>;
}

/// Notifier that logs instead of sending
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    from: Option<String>,
}

impl LogNotifier {
    pub fn new(from: Option<String>) -> Self {
        Self { from }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, alert: &EmailAlert) -> Result<(), DispatchError> {
        info!(
            event = "alert_sent",
            from = ?self.from,
            to = %alert.recipient,
            subject = %alert.subject,
            device_id = %alert.device_id,
            "Email alert"
        );
        Ok(())
    }
}

/// Relay actuator that logs instead of switching
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRelay;

#[async_trait]
impl RelayActuator for LogRelay {
    async fn deactivate(&self, device_id: &str) -> Result<(), DispatchError> {
        info!(event = "relay_off", device_id = %device_id, "AUTO-OFF relay for device");
        Ok(())
    }
}
