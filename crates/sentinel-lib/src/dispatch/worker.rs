//! Background delivery of queued side effects

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{Notifier, RelayActuator, SideEffect};
use crate::error::DispatchError;
use crate::health::{components, HealthRegistry};
use crate::observability::{SentinelMetrics, StructuredLogger};

/// Default upper bound for a single alert send
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Drains the side-effect queue; failures are logged and counted only
pub struct ActionWorker {
    rx: mpsc::Receiver<SideEffect>,
    notifier: Arc<dyn Notifier>,
    relay: Arc<dyn RelayActuator>,
    notification_timeout: Duration,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl ActionWorker {
    pub fn new(
        rx: mpsc::Receiver<SideEffect>,
        notifier: Arc<dyn Notifier>,
        relay: Arc<dyn RelayActuator>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            rx,
            notifier,
            relay,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            metrics: SentinelMetrics::new(),
            logger,
        }
    }

    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Spawn the worker and mark it unhealthy once it stops, including by panic.
    ///
    /// The returned handle resolves after health has been updated.
    pub fn spawn(
        self,
        shutdown: broadcast::Receiver<()>,
        health: HealthRegistry,
    ) -> JoinHandle<()> {
        let task = tokio::spawn(self.run(shutdown));
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(()) => "action worker stopped".to_string(),
                Err(e) if e.is_panic() => "action worker panicked".to_string(),
                Err(e) => format!("action worker cancelled: {}", e),
            };
            error!(
                event = "worker_exited",
                reason = %reason,
                "Action worker exited, side effects will be dropped"
            );
            health.set_unhealthy(components::ACTION_WORKER, reason).await;
        })
    }

    /// Run until shutdown is signalled or every producer is gone.
    ///
    /// Items still queued at shutdown are not delivered.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting action worker");

        loop {
            tokio::select! {
                item = self.rx.recv() => match item {
                    Some(effect) => self.handle(effect).await,
                    None => {
                        info!("Action queue closed, stopping worker");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down action worker");
                    break;
                }
            }
        }
    }

    /// Deliver one side effect
    pub async fn handle(&self, effect: SideEffect) {
        let kind = effect.kind();
        let device_id = effect.device_id().to_string();

        let result = match &effect {
            SideEffect::EmailAlert(alert) => {
                let send = self.notifier.send_alert(alert);
                match tokio::time::timeout(self.notification_timeout, send).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::NotificationTimeout {
                        recipient: alert.recipient.clone(),
                    }),
                }
            }
            SideEffect::RelayOff { device_id } => self.relay.deactivate(device_id).await,
        };

        match result {
            Ok(()) => debug!(kind = kind, device_id = %device_id, "Side effect delivered"),
            Err(e) => {
                self.metrics.inc_side_effect_failure(kind);
                self.logger.log_delivery_failure(kind, &device_id, &e.to_string());
            }
        }
    }
}
