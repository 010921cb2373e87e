//! Verdict → side-effect mapping
//!
//! For each device bound to a decided channel:
//! - alert-oriented devices with a contact address get an email alert
//! - auto-off devices get a relay deactivation when the verdict is OFF
//!
//! Both may apply to the same device. Every matched device yields one
//! action record regardless of how many side effects it produced.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{ActionRecord, Channel, DeviceBinding, Reading, Verdict};
use crate::observability::{SentinelMetrics, StructuredLogger};

/// Email alert work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAlert {
    pub device_id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Deferred side effect handed to the background worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    EmailAlert(EmailAlert),
    RelayOff { device_id: String },
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::EmailAlert(_) => "email_alert",
            SideEffect::RelayOff { .. } => "relay_off",
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            SideEffect::EmailAlert(alert) => &alert.device_id,
            SideEffect::RelayOff { device_id } => device_id,
        }
    }
}

/// Outcome of dispatching one channel verdict
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchPlan {
    pub records: Vec<ActionRecord>,
    pub effects: Vec<SideEffect>,
}

impl DispatchPlan {
    pub fn extend(&mut self, other: DispatchPlan) {
        self.records.extend(other.records);
        self.effects.extend(other.effects);
    }
}

/// Non-blocking producer side of the side-effect queue
#[derive(Debug, Clone)]
pub struct ActionQueue {
    tx: mpsc::Sender<SideEffect>,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl ActionQueue {
    /// Create a bounded queue and its receiving end
    pub fn bounded(
        capacity: usize,
        logger: StructuredLogger,
    ) -> (Self, mpsc::Receiver<SideEffect>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            metrics: SentinelMetrics::new(),
            logger,
        };
        (queue, rx)
    }

    /// Enqueue without waiting. A full or closed queue drops the item.
    pub fn enqueue(&self, effect: SideEffect) -> bool {
        let kind = effect.kind();
        let device_id = effect.device_id().to_string();
        match self.tx.try_send(effect) {
            Ok(()) => {
                self.metrics.inc_side_effect_enqueued(kind);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.inc_side_effect_dropped();
                self.logger.log_dropped(kind, &device_id, "queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.inc_side_effect_dropped();
                self.logger.log_dropped(kind, &device_id, "worker stopped");
                false
            }
        }
    }
}

/// Maps verdicts onto device side effects
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    queue: ActionQueue,
}

impl ActionDispatcher {
    pub fn new(queue: ActionQueue) -> Self {
        Self { queue }
    }

    /// Plan and enqueue the side effects for one channel verdict
    pub fn dispatch(
        &self,
        reading: &Reading,
        channel: Channel,
        verdict: Verdict,
        bindings: &[DeviceBinding],
    ) -> DispatchPlan {
        let plan = plan(reading, channel, verdict, bindings);
        for effect in &plan.effects {
            self.queue.enqueue(effect.clone());
        }
        plan
    }
}

/// Pure mapping from a verdict to records and side effects
pub fn plan(
    reading: &Reading,
    channel: Channel,
    verdict: Verdict,
    bindings: &[DeviceBinding],
) -> DispatchPlan {
    let mut plan = DispatchPlan::default();

    for device in bindings {
        if device.recommend_only {
            if let Some(email) = device.email.as_deref().filter(|e| !e.is_empty()) {
                plan.effects.push(SideEffect::EmailAlert(EmailAlert {
                    device_id: device.device_id.clone(),
                    recipient: email.to_string(),
                    subject: format!("[Alert] {} → {}", device.name, verdict),
                    body: format!(
                        "{} predicted to {} at {}",
                        device.name, verdict, reading.timestamp_raw
                    ),
                }));
            }
        }

        if device.auto_off && verdict == Verdict::Off {
            plan.effects.push(SideEffect::RelayOff {
                device_id: device.device_id.clone(),
            });
        }

        plan.records.push(ActionRecord {
            device_id: device.device_id.clone(),
            name: device.name.clone(),
            appliance: channel,
            action: verdict,
        });
    }

    debug!(
        channel = %channel,
        verdict = %verdict,
        devices = plan.records.len(),
        effects = plan.effects.len(),
        "Dispatch planned"
    );

    plan
}
