//! Feature extraction for per-channel classification
//!
//! Turns a validated reading into one fixed-shape feature row per channel.
//! Calendar features are computed once per reading and shared; the rolling
//! statistics cover a single-sample window, so the mean is the channel's
//! current draw and the deviation is always zero.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::ValidationError;
use crate::models::{Channel, DeviceReadingPayload, FeatureVector, Reading, ReadingPayload};

/// Day index (Monday = 0) from which a day counts as weekend
pub const WEEKEND_START: u8 = 5;

/// Key under which the nested bulk form carries channel values
const NESTED_CHANNELS_KEY: &str = "appliances";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Builds classifier inputs from readings
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Validate a batch payload into a reading
    pub fn parse(&self, payload: &ReadingPayload) -> Result<Reading, ValidationError> {
        let timestamp = parse_timestamp(&payload.timestamp)?;
        let aggregate = payload.aggregate.ok_or(ValidationError::MissingAggregate)?;
        ensure_finite("aggregate", aggregate)?;

        let mut channels = BTreeMap::new();
        for (key, value) in &payload.extra {
            if key == NESTED_CHANNELS_KEY {
                if let Some(nested) = value.as_object() {
                    for (nested_key, nested_value) in nested {
                        let channel = nested_key.parse::<Channel>()?;
                        channels.insert(channel, channel_watts(nested_key, nested_value)?);
                    }
                    continue;
                }
            }
            // Unrelated columns such as `Unix` are ignored
            let Ok(channel) = key.parse::<Channel>() else {
                continue;
            };
            channels.insert(channel, channel_watts(key, value)?);
        }

        Ok(Reading::new(
            payload.timestamp.clone(),
            timestamp,
            aggregate,
            channels,
        ))
    }

    /// Reading for a single device: the aggregate mirrors the device's draw
    /// and only its channel is populated
    pub fn parse_device(
        &self,
        payload: &DeviceReadingPayload,
        channel: Channel,
    ) -> Result<Reading, ValidationError> {
        let timestamp = parse_timestamp(&payload.timestamp)?;
        ensure_finite("watts", payload.watts)?;
        let channels = BTreeMap::from([(channel, payload.watts)]);
        Ok(Reading::new(
            payload.timestamp.clone(),
            timestamp,
            payload.watts,
            channels,
        ))
    }

    /// Feature rows for the requested channels
    pub fn build(
        &self,
        reading: &Reading,
        channels: &[Channel],
    ) -> BTreeMap<Channel, FeatureVector> {
        let day_of_week = reading.day_of_week();
        channels
            .iter()
            .map(|&channel| (channel, row(reading, channel, day_of_week)))
            .collect()
    }

    /// Feature row for a single channel
    pub fn build_one(&self, reading: &Reading, channel: Channel) -> FeatureVector {
        row(reading, channel, reading.day_of_week())
    }
}

fn row(reading: &Reading, channel: Channel, day_of_week: u8) -> FeatureVector {
    FeatureVector {
        aggregate: reading.aggregate,
        day_of_week,
        is_weekend: day_of_week >= WEEKEND_START,
        roll_mean: reading.watts(channel),
        roll_std: 0.0,
    }
}

/// Parse an ISO-8601 timestamp into wall-clock time.
///
/// Offsets are honored by keeping the local time of the given offset.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ValidationError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(ValidationError::Timestamp(raw.to_string()))
}

fn channel_watts(field: &str, value: &serde_json::Value) -> Result<f64, ValidationError> {
    let watts = value.as_f64().ok_or_else(|| ValidationError::NotANumber {
        field: field.to_string(),
    })?;
    ensure_finite(field, watts)?;
    Ok(watts)
}

fn ensure_finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite {
            field: field.to_string(),
        })
    }
}
