//! Model-vs-threshold arbitration for each channel
//!
//! A registered model decides its channel; a channel without one, or whose
//! model fails on this input, is decided by comparing its current draw with
//! the configured cutoff. Channels never affect each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ModelRegistry, ThresholdTable};
use crate::models::{Channel, Decision, DecisionSource, FeatureVector, Label, Reading, Verdict};

/// Stateless per-channel decision maker over a fixed model/threshold snapshot
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    registry: Arc<ModelRegistry>,
    thresholds: Arc<ThresholdTable>,
}

impl DecisionEngine {
    pub fn new(registry: Arc<ModelRegistry>, thresholds: Arc<ThresholdTable>) -> Self {
        Self {
            registry,
            thresholds,
        }
    }

    /// Decide one channel.
    ///
    /// The threshold path reads the channel's watts from `reading`, not from
    /// the feature row.
    pub fn decide(
        &self,
        reading: &Reading,
        channel: Channel,
        features: &FeatureVector,
    ) -> Decision {
        let (label, source) = match self.registry.get(channel) {
            Some(model) => match model.predict(features) {
                Ok(label) => (label, DecisionSource::Model),
                Err(e) => {
                    warn!(
                        event = "model_fallback",
                        channel = %channel,
                        model_version = %model.model_version(),
                        error = %e,
                        "Model invocation failed, using threshold fallback"
                    );
                    (self.threshold_label(reading, channel), DecisionSource::Fallback)
                }
            },
            None => (self.threshold_label(reading, channel), DecisionSource::Threshold),
        };

        let verdict = Verdict::from_label(label);
        debug!(
            event = "channel_decided",
            channel = %channel,
            verdict = %verdict,
            source = source.as_str(),
            "Channel decided"
        );

        Decision {
            channel,
            verdict,
            source,
        }
    }

    /// Decide every channel that has a feature row
    pub fn decide_all(
        &self,
        reading: &Reading,
        features: &BTreeMap<Channel, FeatureVector>,
    ) -> Vec<Decision> {
        features
            .iter()
            .map(|(&channel, f)| self.decide(reading, channel, f))
            .collect()
    }

    /// Strictly above the cutoff is label 1
    fn threshold_label(&self, reading: &Reading, channel: Channel) -> Label {
        if reading.watts(channel) > self.thresholds.get(channel) {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::predictor::{ChannelClassifier, FeatureBuilder};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstantModel(Label);

    impl ChannelClassifier for ConstantModel {
        fn predict(&self, _features: &FeatureVector) -> Result<Label, ModelError> {
            Ok(self.0)
        }

        fn model_version(&self) -> &str {
            "constant"
        }
    }

    struct BrokenModel {
        calls: AtomicUsize,
    }

    impl ChannelClassifier for BrokenModel {
        fn predict(&self, _features: &FeatureVector) -> Result<Label, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::Input {
                channel: Channel::Appliance1,
                reason: "expected 7 features".to_string(),
            })
        }

        fn model_version(&self) -> &str {
            "broken"
        }
    }

    fn reading(channels: &[(Channel, f64)]) -> Reading {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Reading::new(
            "2024-01-01T10:00:00",
            ts,
            1200.0,
            channels.iter().copied().collect(),
        )
    }

    fn engine(registry: ModelRegistry, thresholds: ThresholdTable) -> DecisionEngine {
        DecisionEngine::new(Arc::new(registry), Arc::new(thresholds))
    }

    fn decide(engine: &DecisionEngine, reading: &Reading, channel: Channel) -> Decision {
        let features = FeatureBuilder::new().build(reading, &[channel]);
        engine.decide(reading, channel, &features[&channel])
    }

    #[test]
    fn test_threshold_only_verdicts() {
        let engine = engine(ModelRegistry::empty(), ThresholdTable::uniform(1000.0));

        let above = decide(
            &engine,
            &reading(&[(Channel::Appliance1, 1500.0)]),
            Channel::Appliance1,
        );
        assert_eq!(above.verdict, Verdict::Off);
        assert_eq!(above.source, DecisionSource::Threshold);

        let below = decide(&engine, &reading(&[(Channel::Appliance1, 800.0)]), Channel::Appliance1);
        assert_eq!(below.verdict, Verdict::On);
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        let engine = engine(ModelRegistry::empty(), ThresholdTable::uniform(1000.0));
        let at = decide(&engine, &reading(&[(Channel::Appliance2, 1000.0)]), Channel::Appliance2);
        assert_eq!(at.verdict, Verdict::On);
    }

    #[test]
    fn test_missing_channel_is_on() {
        let engine = engine(ModelRegistry::empty(), ThresholdTable::uniform(0.5));
        let d = decide(&engine, &reading(&[]), Channel::Appliance9);
        assert_eq!(d.verdict, Verdict::On);
    }

    #[test]
    fn test_unconfigured_channel_uses_default_cutoff() {
        let engine = engine(
            ModelRegistry::empty(),
            ThresholdTable::from_entries([(Channel::Appliance1, 10.0)]),
        );
        let below = decide(&engine, &reading(&[(Channel::Appliance4, 999.0)]), Channel::Appliance4);
        let above = decide(
            &engine,
            &reading(&[(Channel::Appliance4, 1001.0)]),
            Channel::Appliance4,
        );
        assert_eq!(below.verdict, Verdict::On);
        assert_eq!(above.verdict, Verdict::Off);
    }

    #[test]
    fn test_model_polarity_ignores_threshold() {
        let registry = ModelRegistry::empty()
            .with_model(Channel::Appliance1, Arc::new(ConstantModel(Label::Positive)))
            .with_model(Channel::Appliance2, Arc::new(ConstantModel(Label::Negative)));
        let engine = engine(registry, ThresholdTable::uniform(1000.0));
        let r = reading(&[(Channel::Appliance1, 0.0), (Channel::Appliance2, 5000.0)]);

        let d1 = decide(&engine, &r, Channel::Appliance1);
        assert_eq!(d1.verdict, Verdict::Off);
        assert_eq!(d1.source, DecisionSource::Model);

        let d2 = decide(&engine, &r, Channel::Appliance2);
        assert_eq!(d2.verdict, Verdict::On);
        assert_eq!(d2.source, DecisionSource::Model);
    }

    #[test]
    fn test_model_failure_falls_back_per_channel() {
        let broken = Arc::new(BrokenModel {
            calls: AtomicUsize::new(0),
        });
        let registry = ModelRegistry::empty()
            .with_model(Channel::Appliance1, broken.clone())
            .with_model(Channel::Appliance2, Arc::new(ConstantModel(Label::Positive)));
        let engine = engine(registry, ThresholdTable::uniform(1000.0));
        let r = reading(&[(Channel::Appliance1, 1500.0), (Channel::Appliance2, 10.0)]);

        let features = FeatureBuilder::new().build(&r, &Channel::ALL);
        let decisions = engine.decide_all(&r, &features);
        assert_eq!(decisions.len(), Channel::ALL.len());

        let a1 = decisions.iter().find(|d| d.channel == Channel::Appliance1).unwrap();
        assert_eq!(a1.verdict, Verdict::Off);
        assert_eq!(a1.source, DecisionSource::Fallback);

        let a2 = decisions.iter().find(|d| d.channel == Channel::Appliance2).unwrap();
        assert_eq!(a2.verdict, Verdict::Off);
        assert_eq!(a2.source, DecisionSource::Model);

        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decide_is_idempotent() {
        let registry = ModelRegistry::empty()
            .with_model(Channel::Appliance3, Arc::new(ConstantModel(Label::Negative)));
        let engine = engine(registry, ThresholdTable::uniform(100.0));
        let r = reading(&[(Channel::Appliance3, 400.0), (Channel::Appliance4, 400.0)]);

        for channel in [Channel::Appliance3, Channel::Appliance4] {
            assert_eq!(decide(&engine, &r, channel), decide(&engine, &r, channel));
        }
    }
}
