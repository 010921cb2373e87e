//! Action dispatch for decided channels
//!
//! This module provides:
//! - Mapping of verdicts onto alert and auto-off side effects
//! - A bounded, non-blocking queue toward a background worker
//! - Delivery seams for notifications, relays and device lookup

mod actions;
mod devices;
mod notifier;
mod worker;

#[cfg(test)]
mod tests;

pub use actions::{plan, ActionDispatcher, ActionQueue, DispatchPlan, EmailAlert, SideEffect};
pub use devices::{DeviceDirectory, InMemoryDirectory};
pub use notifier::{LogNotifier, LogRelay, Notifier, RelayActuator};
pub use worker::{ActionWorker, DEFAULT_NOTIFICATION_TIMEOUT};
