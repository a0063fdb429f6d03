//! Notification fan-out and delivery policies.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{FailingTransport, RecordingTransport};
use futures::future::join_all;
use pinger::error::{DeliveryError, DispatchError};
use pinger::{
    DeliveryPolicy, DispatchReport, NotificationDispatcher, SiteConfig, Subscriber,
    SubscriberConfig, Transport, TransportRegistry,
};

fn subscriber(destination: &str, transport: &str) -> SubscriberConfig {
    SubscriberConfig { destination: destination.into(), transport: transport.into() }
}

fn registry() -> (TransportRegistry, Arc<RecordingTransport>) {
    let recording = Arc::new(RecordingTransport::default());
    let registry = TransportRegistry::new()
        .register("email", recording.clone())
        .register("sms", Arc::new(FailingTransport));
    (registry, recording)
}

#[tokio::test]
async fn test_partial_failure_is_reported_not_raised() {
    common::init_tracing();
    let (registry, recording) = registry();
    let dispatcher = NotificationDispatcher::new(
        &[subscriber("ops@example.net", "email"), subscriber("+15550100", "sms")],
        &registry,
        true,
        DeliveryPolicy::RequireOne,
    )
    .unwrap();

    let report = dispatcher.send("web [x]", "web [x] just went down. timeout").await.unwrap();

    assert_eq!(report, DispatchReport::Delivered { delivered: 1, failed: 1 });
    assert_eq!(recording.bodies(), ["web [x] just went down. timeout"]);
}

#[tokio::test]
async fn test_all_failed_is_an_error_under_require_one() {
    let (registry, _) = registry();
    let dispatcher = NotificationDispatcher::new(
        &[subscriber("+15550100", "sms"), subscriber("+15550101", "sms")],
        &registry,
        true,
        DeliveryPolicy::RequireOne,
    )
    .unwrap();

    let result = dispatcher.send("s", "b").await;
    assert!(matches!(result, Err(DispatchError::AllDeliveriesFailed(2))));
}

#[tokio::test]
async fn test_best_effort_never_fails() {
    let (registry, _) = registry();
    let dispatcher = NotificationDispatcher::new(
        &[subscriber("+15550100", "sms")],
        &registry,
        true,
        DeliveryPolicy::BestEffort,
    )
    .unwrap();

    let report = dispatcher.send("s", "b").await.unwrap();
    assert_eq!(report, DispatchReport::Delivered { delivered: 0, failed: 1 });
}

#[tokio::test]
async fn test_disabled_dispatcher_suppresses() {
    let (registry, recording) = registry();
    let dispatcher = NotificationDispatcher::new(
        &[subscriber("ops@example.net", "email")],
        &registry,
        false,
        DeliveryPolicy::RequireOne,
    )
    .unwrap();

    assert_eq!(dispatcher.send("s", "b").await.unwrap(), DispatchReport::Suppressed);
    assert!(recording.sent().is_empty());
}

#[test]
fn test_every_bad_subscriber_reported() {
    let (registry, _) = registry();
    let result = NotificationDispatcher::new(
        &[
            subscriber("ops@example.net", "pigeon"),
            subscriber("ops@example.net", "email"),
            subscriber("+15550100", "fax"),
        ],
        &registry,
        true,
        DeliveryPolicy::RequireOne,
    );

    match result {
        Err(pinger::ConfigurationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
        Err(other) => panic!("expected two errors, got {other}"),
        Ok(_) => panic!("expected construction to fail"),
    }
}

#[test]
fn test_site_without_transport_settings_rejected() {
    let config = SiteConfig {
        subscribers: vec![subscriber("ops@example.net", "email")],
        ..Default::default()
    };

    assert!(matches!(
        NotificationDispatcher::from_site(&config),
        Err(pinger::ConfigurationError::TransportNotConfigured("email"))
    ));
}

/// Tracks how many deliveries are in flight per destination.
#[derive(Default)]
struct Overlap {
    in_flight: Mutex<HashMap<String, usize>>,
    max_seen: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl Transport for Overlap {
    async fn deliver(&self, subscriber: &Subscriber, _: &str, _: &str) -> Result<(), DeliveryError> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(subscriber.destination.clone()).or_default();
            *count += 1;
            let mut max_seen = self.max_seen.lock().unwrap();
            let max = max_seen.entry(subscriber.destination.clone()).or_default();
            *max = (*max).max(*count);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;

        *self.in_flight.lock().unwrap().get_mut(&subscriber.destination).unwrap() -= 1;
        Ok(())
    }
}

#[tokio::test]
async fn test_deliveries_to_one_subscriber_are_serialized() {
    let overlap = Arc::new(Overlap::default());
    let registry = TransportRegistry::new().register("email", overlap.clone());
    let dispatcher = NotificationDispatcher::new(
        &[subscriber("a@example.net", "email"), subscriber("b@example.net", "email")],
        &registry,
        true,
        DeliveryPolicy::RequireOne,
    )
    .unwrap();

    let reports = join_all((0..5).map(|i| {
        let dispatcher = &dispatcher;
        async move { dispatcher.send(&format!("subject {i}"), "body").await }
    }))
    .await;

    for report in reports {
        assert_eq!(report.unwrap(), DispatchReport::Delivered { delivered: 2, failed: 0 });
    }
    let max_seen = overlap.max_seen.lock().unwrap();
    assert_eq!(max_seen.get("a@example.net"), Some(&1));
    assert_eq!(max_seen.get("b@example.net"), Some(&1));
}

#[tokio::test]
async fn test_repeated_subscriber_entries_share_one_lock() {
    let overlap = Arc::new(Overlap::default());
    let registry = TransportRegistry::new().register("email", overlap.clone());
    let dispatcher = NotificationDispatcher::new(
        &[subscriber("a@example.net", "email"), subscriber(" a@example.net ", "EMAIL")],
        &registry,
        true,
        DeliveryPolicy::RequireOne,
    )
    .unwrap();

    let report = dispatcher.send("subject", "body").await.unwrap();

    assert_eq!(report, DispatchReport::Delivered { delivered: 2, failed: 0 });
    assert_eq!(overlap.max_seen.lock().unwrap().get("a@example.net"), Some(&1));
}
