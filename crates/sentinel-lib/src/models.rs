//! Core data models for the appliance sentinel

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of monitored appliance circuits per house
pub const CHANNEL_COUNT: usize = 9;

/// One monitored appliance circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Appliance1,
    Appliance2,
    Appliance3,
    Appliance4,
    Appliance5,
    Appliance6,
    Appliance7,
    Appliance8,
    Appliance9,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Appliance1,
        Channel::Appliance2,
        Channel::Appliance3,
        Channel::Appliance4,
        Channel::Appliance5,
        Channel::Appliance6,
        Channel::Appliance7,
        Channel::Appliance8,
        Channel::Appliance9,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Appliance1 => "Appliance1",
            Channel::Appliance2 => "Appliance2",
            Channel::Appliance3 => "Appliance3",
            Channel::Appliance4 => "Appliance4",
            Channel::Appliance5 => "Appliance5",
            Channel::Appliance6 => "Appliance6",
            Channel::Appliance7 => "Appliance7",
            Channel::Appliance8 => "Appliance8",
            Channel::Appliance9 => "Appliance9",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| ValidationError::UnknownChannel(s.to_string()))
    }
}

/// A point-in-time observation for one house
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Timestamp text as received, echoed in alert bodies
    pub timestamp_raw: String,
    /// Wall-clock time of the observation
    pub timestamp: NaiveDateTime,
    /// Whole-house aggregate draw in watts
    pub aggregate: f64,
    channels: BTreeMap<Channel, f64>,
}

impl Reading {
    pub fn new(
        timestamp_raw: impl Into<String>,
        timestamp: NaiveDateTime,
        aggregate: f64,
        channels: BTreeMap<Channel, f64>,
    ) -> Self {
        Self {
            timestamp_raw: timestamp_raw.into(),
            timestamp,
            aggregate,
            channels,
        }
    }

    /// Watts for a channel; channels missing from the payload read as 0.0
    pub fn watts(&self, channel: Channel) -> f64 {
        self.channels.get(&channel).copied().unwrap_or(0.0)
    }

    /// Channels explicitly present in the payload
    pub fn present_channels(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        self.channels.iter().map(|(c, w)| (*c, *w))
    }

    /// Day of week with Monday = 0
    pub fn day_of_week(&self) -> u8 {
        self.timestamp.weekday().num_days_from_monday() as u8
    }
}

/// Wire shape of a batch reading.
///
/// Channel values arrive as top-level keys (`Appliance1`..`Appliance9`) or
/// nested under `appliances`; anything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub timestamp: String,
    #[serde(alias = "Aggregate")]
    pub aggregate: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape of a single-device reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReadingPayload {
    pub timestamp: String,
    pub watts: f64,
}

/// Fixed-shape classifier input for one channel of one reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub aggregate: f64,
    pub day_of_week: u8,
    pub is_weekend: bool,
    pub roll_mean: f64,
    pub roll_std: f64,
}

impl FeatureVector {
    pub const LEN: usize = 5;

    /// Model input in training column order:
    /// `[Aggregate, dayofweek, is_weekend, roll_mean, roll_std]`
    pub fn to_array(&self) -> [f32; Self::LEN] {
        [
            self.aggregate as f32,
            self.day_of_week as f32,
            if self.is_weekend { 1.0 } else { 0.0 },
            self.roll_mean as f32,
            self.roll_std as f32,
        ]
    }
}

/// Per-channel ON/OFF decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    On,
    Off,
}

impl Verdict {
    /// Label 1 means the appliance is reported OFF, label 0 means ON
    pub fn from_label(label: Label) -> Self {
        match label {
            Label::Positive => Verdict::Off,
            Label::Negative => Verdict::On,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::On => write!(f, "ON"),
            Verdict::Off => write!(f, "OFF"),
        }
    }
}

/// Binary classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Class 0
    Negative,
    /// Class 1
    Positive,
}

/// Which path produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Model,
    Threshold,
    /// Threshold used after the channel's model failed
    Fallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Model => "model",
            DecisionSource::Threshold => "threshold",
            DecisionSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub channel: Channel,
    pub verdict: Verdict,
    pub source: DecisionSource,
}

/// A physical device registered against a (house, channel) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub device_id: String,
    pub name: String,
    pub house_id: i64,
    pub appliance: Channel,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_recommend_only")]
    pub recommend_only: bool,
    #[serde(default)]
    pub auto_off: bool,
}

fn default_recommend_only() -> bool {
    true
}

/// Externally observable result of dispatch for one matched device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub device_id: String,
    pub name: String,
    pub appliance: Channel,
    pub action: Verdict,
}

/// A per-device reading handed to persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub device_id: String,
    pub timestamp: NaiveDateTime,
    pub watts: f64,
}

/// Draw at or above which a device is reported running
pub const ACTIVE_WATTS: f64 = 10.0;

/// Live state of a device as seen from its latest reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    On,
    Off,
    /// No reading recorded yet
    Unknown,
}

impl DeviceState {
    pub fn from_watts(watts: f64) -> Self {
        if watts >= ACTIVE_WATTS {
            DeviceState::On
        } else {
            DeviceState::Off
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub house_id: i64,
    pub timestamp: Option<NaiveDateTime>,
    pub watts: Option<f64>,
    pub status: DeviceState,
}

impl DeviceStatus {
    pub fn from_latest(device: &DeviceBinding, latest: Option<&ReadingRecord>) -> Self {
        Self {
            device_id: device.device_id.clone(),
            house_id: device.house_id,
            timestamp: latest.map(|r| r.timestamp),
            watts: latest.map(|r| r.watts),
            status: latest
                .map(|r| DeviceState::from_watts(r.watts))
                .unwrap_or(DeviceState::Unknown),
        }
    }
}

/// Average draw over every reading recorded for a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub avg_watts: f64,
    pub total_readings: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub id: String,
    #[serde(flatten)]
    pub stats: ReadingStats,
}
