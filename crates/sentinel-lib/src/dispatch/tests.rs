//! Tests for dispatch planning, queueing and background delivery

#[cfg(test)]
mod plan_tests {
    use crate::dispatch::{plan, SideEffect};
    use crate::models::{Channel, DeviceBinding, Reading, Verdict};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn reading() -> Reading {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Reading::new("2024-01-01T10:00:00", ts, 1200.0, BTreeMap::new())
    }

    fn device(
        id: &str,
        email: Option<&str>,
        recommend_only: bool,
        auto_off: bool,
    ) -> DeviceBinding {
        DeviceBinding {
            device_id: id.to_string(),
            name: format!("Device {}", id),
            house_id: 1,
            appliance: Channel::Appliance1,
            email: email.map(str::to_string),
            recommend_only,
            auto_off,
        }
    }

    #[test]
    fn test_alert_only_device() {
        let p = plan(
            &reading(),
            Channel::Appliance1,
            Verdict::Off,
            &[device("d1", Some("owner@example.com"), true, false)],
        );

        assert_eq!(p.effects.len(), 1);
        match &p.effects[0] {
            SideEffect::EmailAlert(alert) => {
                assert_eq!(alert.recipient, "owner@example.com");
                assert_eq!(alert.subject, "[Alert] Device d1 → OFF");
                assert_eq!(alert.body, "Device d1 predicted to OFF at 2024-01-01T10:00:00");
            }
            other => panic!("unexpected effect {:?}", other),
        }
        assert_eq!(p.records.len(), 1);
        assert_eq!(p.records[0].action, Verdict::Off);
    }

    #[test]
    fn test_auto_off_without_email() {
        let p = plan(
            &reading(),
            Channel::Appliance1,
            Verdict::Off,
            &[device("d2", None, false, true)],
        );
        assert_eq!(
            p.effects,
            vec![SideEffect::RelayOff {
                device_id: "d2".to_string()
            }]
        );
    }

    #[test]
    fn test_auto_off_ignored_when_on() {
        let p = plan(
            &reading(),
            Channel::Appliance1,
            Verdict::On,
            &[device("d3", None, false, true)],
        );
        assert!(p.effects.is_empty());
        assert_eq!(p.records.len(), 1);
        assert_eq!(p.records[0].action, Verdict::On);
    }

    #[test]
    fn test_alert_and_relay_for_same_device() {
        let p = plan(
            &reading(),
            Channel::Appliance1,
            Verdict::Off,
            &[device("d4", Some("a@example.com"), true, true)],
        );
        let kinds: Vec<&str> = p.effects.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["email_alert", "relay_off"]);
        assert_eq!(p.records.len(), 1);
    }

    #[test]
    fn test_alert_requires_recommend_flag_and_address() {
        let p = plan(
            &reading(),
            Channel::Appliance1,
            Verdict::On,
            &[
                device("no-flag", Some("a@example.com"), false, false),
                device("no-email", None, true, false),
                device("blank-email", Some(""), true, false),
            ],
        );
        assert!(p.effects.is_empty());
        assert_eq!(p.records.len(), 3);
    }

    #[test]
    fn test_record_order_follows_bindings() {
        let p = plan(
            &reading(),
            Channel::Appliance1,
            Verdict::On,
            &[device("b", None, true, false), device("a", None, true, false)],
        );
        let ids: Vec<&str> = p.records.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_no_bindings_no_records() {
        let p = plan(&reading(), Channel::Appliance1, Verdict::Off, &[]);
        assert!(p.records.is_empty());
        assert!(p.effects.is_empty());
    }
}

#[cfg(test)]
mod delivery_tests {
    use crate::dispatch::{
        ActionQueue, ActionWorker, EmailAlert, Notifier, RelayActuator, SideEffect,
    };
    use crate::error::DispatchError;
    use crate::health::{components, ComponentStatus, HealthRegistry};
    use crate::observability::StructuredLogger;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_alert(&self, alert: &EmailAlert) -> Result<(), DispatchError> {
            if self.fail_for.as_deref() == Some(alert.recipient.as_str()) {
                return Err(DispatchError::Notification {
                    recipient: alert.recipient.clone(),
                    reason: "connection refused".to_string(),
                });
            }
            self.sent.lock().unwrap().push(alert.recipient.clone());
            Ok(())
        }
    }

    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn send_alert(&self, _alert: &EmailAlert) -> Result<(), DispatchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRelay {
        switched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelayActuator for RecordingRelay {
        async fn deactivate(&self, device_id: &str) -> Result<(), DispatchError> {
            self.switched.lock().unwrap().push(device_id.to_string());
            Ok(())
        }
    }

    fn alert(device_id: &str, recipient: &str) -> SideEffect {
        SideEffect::EmailAlert(EmailAlert {
            device_id: device_id.to_string(),
            recipient: recipient.to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        })
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (queue, _rx) = ActionQueue::bounded(1, StructuredLogger::new("test"));
        assert!(queue.enqueue(alert("d1", "a@example.com")));
        assert!(!queue.enqueue(alert("d2", "b@example.com")));
    }

    #[test]
    fn test_closed_queue_drops() {
        let (queue, rx) = ActionQueue::bounded(4, StructuredLogger::new("test"));
        drop(rx);
        assert!(!queue.enqueue(SideEffect::RelayOff {
            device_id: "d1".to_string()
        }));
    }

    #[tokio::test]
    async fn test_failed_alert_does_not_block_others() {
        let notifier = Arc::new(RecordingNotifier {
            fail_for: Some("bad@example.com".to_string()),
            ..Default::default()
        });
        let relay = Arc::new(RecordingRelay::default());
        let (queue, rx) = ActionQueue::bounded(16, StructuredLogger::new("test"));
        let worker = ActionWorker::new(
            rx,
            notifier.clone(),
            relay.clone(),
            StructuredLogger::new("test"),
        );

        queue.enqueue(alert("d1", "bad@example.com"));
        queue.enqueue(alert("d2", "good@example.com"));
        queue.enqueue(SideEffect::RelayOff {
            device_id: "d3".to_string(),
        });
        drop(queue);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        worker.run(shutdown_rx).await;

        assert_eq!(*notifier.sent.lock().unwrap(), vec!["good@example.com"]);
        assert_eq!(*relay.switched.lock().unwrap(), vec!["d3"]);
    }

    #[tokio::test]
    async fn test_slow_notifier_times_out() {
        let relay = Arc::new(RecordingRelay::default());
        let (_queue, rx) = ActionQueue::bounded(4, StructuredLogger::new("test"));
        let worker = ActionWorker::new(
            rx,
            Arc::new(SlowNotifier),
            relay,
            StructuredLogger::new("test"),
        )
        .with_notification_timeout(Duration::from_millis(50));

        // Completes once the send timeout elapses instead of waiting out the send
        tokio::time::timeout(Duration::from_secs(5), worker.handle(alert("d1", "a@example.com")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let (_queue, rx) = ActionQueue::bounded(4, StructuredLogger::new("test"));
        let worker = ActionWorker::new(
            rx,
            Arc::new(RecordingNotifier::default()),
            Arc::new(RecordingRelay::default()),
            StructuredLogger::new("test"),
        );
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    struct PanickingRelay;

    #[async_trait]
    impl RelayActuator for PanickingRelay {
        async fn deactivate(&self, _device_id: &str) -> Result<(), DispatchError> {
            panic!("relay driver crashed");
        }
    }

    async fn registry_with_worker() -> HealthRegistry {
        let health = HealthRegistry::new();
        health.register(components::ACTION_WORKER).await;
        health.set_ready(true).await;
        health
    }

    #[tokio::test]
    async fn test_exited_worker_reported_unhealthy() {
        let health = registry_with_worker().await;
        let (queue, rx) = ActionQueue::bounded(4, StructuredLogger::new("test"));
        let worker = ActionWorker::new(
            rx,
            Arc::new(RecordingNotifier::default()),
            Arc::new(RecordingRelay::default()),
            StructuredLogger::new("test"),
        );
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = worker.spawn(shutdown_rx, health.clone());
        assert!(health.readiness().await.ready);

        drop(queue);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let worker_health = &health.health().await.components[components::ACTION_WORKER];
        assert_eq!(worker_health.status, ComponentStatus::Unhealthy);
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_panicked_worker_reported_unhealthy() {
        let health = registry_with_worker().await;
        let (queue, rx) = ActionQueue::bounded(4, StructuredLogger::new("test"));
        let worker = ActionWorker::new(
            rx,
            Arc::new(RecordingNotifier::default()),
            Arc::new(PanickingRelay),
            StructuredLogger::new("test"),
        );
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = worker.spawn(shutdown_rx, health.clone());

        queue.enqueue(SideEffect::RelayOff {
            device_id: "d1".to_string(),
        });
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let worker_health = &health.health().await.components[components::ACTION_WORKER];
        assert_eq!(worker_health.status, ComponentStatus::Unhealthy);
        assert_eq!(
            worker_health.message.as_deref(),
            Some("action worker panicked")
        );
    }
}
