//! Device bindings and reading persistence seam

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ConfigError;
use crate::models::{Channel, DeviceBinding, ReadingRecord, ReadingStats};

/// Lookup of devices registered per (house, channel) plus reading storage
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Devices bound to a channel of a house, in registration order
    async fn bindings_for(&self, house_id: i64, channel: Channel) -> Vec<DeviceBinding>;

    async fn device(&self, device_id: &str) -> Option<DeviceBinding>;

    async fn record_reading(&self, record: ReadingRecord);

    /// Reading with the newest timestamp recorded for a device
    async fn latest_reading(&self, device_id: &str) -> Option<ReadingRecord>;

    /// Average over every reading recorded for a device
    async fn reading_stats(&self, device_id: &str) -> ReadingStats;
}

/// Running summary of one device's readings
#[derive(Debug, Clone)]
struct ReadingHistory {
    latest: ReadingRecord,
    total_watts: f64,
    count: u64,
}

impl ReadingHistory {
    fn start(record: ReadingRecord) -> Self {
        Self {
            total_watts: record.watts,
            count: 1,
            latest: record,
        }
    }

    fn push(&mut self, record: ReadingRecord) {
        self.total_watts += record.watts;
        self.count += 1;
        // Late arrivals count toward stats without replacing the latest reading
        if record.timestamp >= self.latest.timestamp {
            self.latest = record;
        }
    }

    fn stats(&self) -> ReadingStats {
        ReadingStats {
            avg_watts: self.total_watts / self.count as f64,
            total_readings: self.count,
        }
    }
}

/// In-process directory, optionally seeded from a JSON file.
///
/// Readings are folded into one summary per device rather than kept
/// individually, so memory stays proportional to the number of devices.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    devices: Arc<RwLock<Vec<DeviceBinding>>>,
    history: Arc<RwLock<HashMap<String, ReadingHistory>>>,
}

impl InMemoryDirectory {
    pub fn new(devices: Vec<DeviceBinding>) -> Self {
        Self {
            devices: Arc::new(RwLock::new(devices)),
            history: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load a JSON array of device bindings
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let devices: Vec<DeviceBinding> =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Devices {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(devices))
    }

    pub async fn register(&self, device: DeviceBinding) {
        self.devices.write().await.push(device);
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Number of devices with at least one recorded reading
    pub async fn tracked_devices(&self) -> usize {
        self.history.read().await.len()
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDirectory {
    async fn bindings_for(&self, house_id: i64, channel: Channel) -> Vec<DeviceBinding> {
        self.devices
            .read()
            .await
            .iter()
            .filter(|d| d.house_id == house_id && d.appliance == channel)
            .cloned()
            .collect()
    }

    async fn device(&self, device_id: &str) -> Option<DeviceBinding> {
        self.devices
            .read()
            .await
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    async fn record_reading(&self, record: ReadingRecord) {
        let mut history = self.history.write().await;
        match history.get_mut(&record.device_id) {
            Some(entry) => entry.push(record),
            None => {
                history.insert(record.device_id.clone(), ReadingHistory::start(record));
            }
        }
    }

    async fn latest_reading(&self, device_id: &str) -> Option<ReadingRecord> {
        self.history
            .read()
            .await
            .get(device_id)
            .map(|h| h.latest.clone())
    }

    async fn reading_stats(&self, device_id: &str) -> ReadingStats {
        self.history
            .read()
            .await
            .get(device_id)
            .map(ReadingHistory::stats)
            .unwrap_or_default()
    }
}
