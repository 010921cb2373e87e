//! Reading ingestion: features, decisions, persistence and dispatch
//!
//! A reading is validated up front; a malformed reading fails the whole call
//! before anything is recorded or dispatched. Once validated, every channel
//! is decided independently and dispatch only enqueues work.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::{ActionDispatcher, DeviceDirectory, DispatchPlan};
use crate::error::IngestError;
use crate::models::{
    ActionRecord, Channel, Decision, DecisionSource, DeviceBinding, DeviceReadingPayload,
    DeviceStats, DeviceStatus, Reading, ReadingPayload, ReadingRecord,
};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::predictor::{DecisionEngine, FeatureBuilder};

/// End-to-end handling of readings for any house
#[derive(Clone)]
pub struct InferencePipeline {
    builder: FeatureBuilder,
    engine: DecisionEngine,
    directory: Arc<dyn DeviceDirectory>,
    dispatcher: ActionDispatcher,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl InferencePipeline {
    pub fn new(
        engine: DecisionEngine,
        directory: Arc<dyn DeviceDirectory>,
        dispatcher: ActionDispatcher,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            builder: FeatureBuilder::new(),
            engine,
            directory,
            dispatcher,
            metrics: SentinelMetrics::new(),
            logger,
        }
    }

    /// Decide the given channels of a validated reading
    pub fn evaluate(&self, reading: &Reading, channels: &[Channel]) -> Vec<Decision> {
        let start = Instant::now();
        let features = self.builder.build(reading, channels);
        let decisions = self.engine.decide_all(reading, &features);
        self.record_metrics(start, &decisions);
        decisions
    }

    fn decide_one(&self, reading: &Reading, channel: Channel) -> Decision {
        let start = Instant::now();
        let features = self.builder.build_one(reading, channel);
        let decision = self.engine.decide(reading, channel, &features);
        self.record_metrics(start, std::slice::from_ref(&decision));
        decision
    }

    fn record_metrics(&self, start: Instant, decisions: &[Decision]) {
        self.metrics
            .observe_inference_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_readings_processed();
        for decision in decisions {
            self.metrics.inc_decision(decision.source.as_str());
            if decision.source == DecisionSource::Fallback {
                self.metrics.inc_model_failure(decision.channel.as_str());
            }
        }
    }

    /// Ingest a whole-house reading and return one record per bound device
    pub async fn ingest(
        &self,
        house_id: i64,
        payload: &ReadingPayload,
    ) -> Result<Vec<ActionRecord>, IngestError> {
        let reading = self.builder.parse(payload).inspect_err(|_| {
            self.metrics.inc_validation_errors();
        })?;

        let mut bindings: BTreeMap<Channel, Vec<DeviceBinding>> = BTreeMap::new();
        for channel in Channel::ALL {
            bindings.insert(channel, self.directory.bindings_for(house_id, channel).await);
        }

        // Only channels present in the payload are persisted
        for (channel, watts) in reading.present_channels() {
            for device in &bindings[&channel] {
                self.directory
                    .record_reading(ReadingRecord {
                        device_id: device.device_id.clone(),
                        timestamp: reading.timestamp,
                        watts,
                    })
                    .await;
            }
        }

        let decisions = self.evaluate(&reading, &Channel::ALL);

        let mut plan = DispatchPlan::default();
        for decision in &decisions {
            plan.extend(self.dispatcher.dispatch(
                &reading,
                decision.channel,
                decision.verdict,
                &bindings[&decision.channel],
            ));
        }

        self.logger
            .log_batch(house_id, decisions.len(), plan.records.len());
        Ok(plan.records)
    }

    /// Ingest a reading for one device and return its action
    pub async fn ingest_device(
        &self,
        house_id: i64,
        device_id: &str,
        payload: &DeviceReadingPayload,
    ) -> Result<ActionRecord, IngestError> {
        let device = self.house_device(house_id, device_id).await?;

        let reading = self
            .builder
            .parse_device(payload, device.appliance)
            .inspect_err(|_| {
                self.metrics.inc_validation_errors();
            })?;

        self.directory
            .record_reading(ReadingRecord {
                device_id: device.device_id.clone(),
                timestamp: reading.timestamp,
                watts: payload.watts,
            })
            .await;

        let verdict = self.decide_one(&reading, device.appliance).verdict;

        let plan = self.dispatcher.dispatch(
            &reading,
            device.appliance,
            verdict,
            std::slice::from_ref(&device),
        );
        self.logger.log_batch(house_id, 1, plan.records.len());

        Ok(ActionRecord {
            device_id: device.device_id,
            name: device.name,
            appliance: device.appliance,
            action: verdict,
        })
    }

    /// Live ON/OFF state of a device from its latest recorded reading
    pub async fn device_status(
        &self,
        house_id: i64,
        device_id: &str,
    ) -> Result<DeviceStatus, IngestError> {
        let device = self.house_device(house_id, device_id).await?;
        let latest = self.directory.latest_reading(device_id).await;
        Ok(DeviceStatus::from_latest(&device, latest.as_ref()))
    }

    pub async fn device_stats(&self, device_id: &str) -> Result<DeviceStats, IngestError> {
        if self.directory.device(device_id).await.is_none() {
            return Err(IngestError::UnknownDevice(device_id.to_string()));
        }
        Ok(DeviceStats {
            id: device_id.to_string(),
            stats: self.directory.reading_stats(device_id).await,
        })
    }

    async fn house_device(
        &self,
        house_id: i64,
        device_id: &str,
    ) -> Result<DeviceBinding, IngestError> {
        self.directory
            .device(device_id)
            .await
            .filter(|d| d.house_id == house_id)
            .ok_or_else(|| IngestError::DeviceNotFound {
                device_id: device_id.to_string(),
                house_id,
            })
    }
}
