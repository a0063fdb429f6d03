//! Notification fan-out.
//!
//! # Data Flow
//! ```text
//! Incident (just down / back up)
//!     → NotificationDispatcher::send(subject, body)
//!     → one Route per subscriber (transport resolved at construction)
//!     → Transport::deliver, serialized per subscriber
//! ```
//!
//! Transports are looked up by keyword once, when the dispatcher is built, so
//! a typo in the config fails at startup instead of at the first outage.

pub mod email;
pub mod sms;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;

pub use email::EmailTransport;
pub use sms::SmsTransport;

use crate::config::{DeliveryPolicy, SiteConfig, SubscriberConfig};
use crate::error::{ConfigurationError, DeliveryError, DispatchError};

/// Upper bound for a single delivery attempt.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport keywords this crate knows how to build.
pub const KNOWN_TRANSPORTS: [&str; 3] = ["email", "sms", "twilio-sms"];

/// A notification recipient with its resolved transport keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub destination: String,
    pub transport: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Check a subscriber address once, at dispatcher construction.
    fn validate(&self, _subscriber: &Subscriber) -> Result<(), ConfigurationError> {
        Ok(())
    }

    async fn deliver(
        &self,
        subscriber: &Subscriber,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError>;
}

/// Keyword to transport lookup table.
#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, keyword: &str, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(keyword.to_ascii_lowercase(), transport);
        self
    }

    /// Build the transports whose settings are present in the site config.
    pub fn from_site(config: &SiteConfig) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();

        if let Some(smtp) = &config.smtp {
            registry = registry.register("email", Arc::new(EmailTransport::new(smtp)?));
        }

        if let Some(twilio) = &config.twilio {
            let sms: Arc<dyn Transport> = Arc::new(SmsTransport::new(twilio)?);
            registry = registry.register("sms", sms.clone()).register("twilio-sms", sms);
        }

        Ok(registry)
    }

    fn resolve(&self, subscriber: &SubscriberConfig) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let keyword = subscriber.transport.trim().to_ascii_lowercase();
        if let Some(transport) = self.transports.get(&keyword) {
            return Ok(transport.clone());
        }

        match KNOWN_TRANSPORTS.iter().find(|known| **known == keyword) {
            Some(known) => Err(ConfigurationError::TransportNotConfigured(*known)),
            None => Err(ConfigurationError::UnknownTransport {
                destination: subscriber.destination.clone(),
                transport: subscriber.transport.clone(),
            }),
        }
    }
}

struct Route {
    subscriber: Subscriber,
    transport: Arc<dyn Transport>,
    // Transports are not assumed reentrant for one recipient. Entries with the
    // same transport and destination share a lock.
    lock: Arc<Mutex<()>>,
}

impl Route {
    async fn deliver(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let _guard = self.lock.lock().await;
        tracing::info!(
            destination = %self.subscriber.destination,
            transport = %self.subscriber.transport,
            "Sending notification"
        );
        self.transport.deliver(&self.subscriber, subject, body).await
    }
}

/// What happened to one `send()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReport {
    /// Notifications are globally disabled; nothing was attempted.
    Suppressed,
    Delivered { delivered: usize, failed: usize },
}

/// Fans a `(subject, body)` pair out to every subscriber.
pub struct NotificationDispatcher {
    routes: Vec<Route>,
    enabled: bool,
    policy: DeliveryPolicy,
}

impl NotificationDispatcher {
    /// Resolve every subscriber's transport, reporting all problems at once.
    pub fn new(
        subscribers: &[SubscriberConfig],
        registry: &TransportRegistry,
        enabled: bool,
        policy: DeliveryPolicy,
    ) -> Result<Self, ConfigurationError> {
        let mut routes = Vec::with_capacity(subscribers.len());
        let mut locks: HashMap<(String, String), Arc<Mutex<()>>> = HashMap::new();
        let mut errors = Vec::new();

        for config in subscribers {
            let transport = match registry.resolve(config) {
                Ok(transport) => transport,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let subscriber = Subscriber {
                destination: config.destination.trim().to_string(),
                transport: config.transport.trim().to_ascii_lowercase(),
            };
            if let Err(e) = transport.validate(&subscriber) {
                errors.push(e);
                continue;
            }

            tracing::debug!(
                destination = %subscriber.destination,
                transport = %subscriber.transport,
                "Registered subscriber"
            );
            let lock = locks
                .entry((subscriber.transport.clone(), subscriber.destination.clone()))
                .or_default()
                .clone();
            routes.push(Route { subscriber, transport, lock });
        }

        match errors.len() {
            0 => Ok(Self { routes, enabled, policy }),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigurationError::Multiple(errors)),
        }
    }

    /// Build the dispatcher and its transports from a site config.
    pub fn from_site(config: &SiteConfig) -> Result<Self, ConfigurationError> {
        let registry = TransportRegistry::from_site(config)?;
        Self::new(
            &config.subscribers,
            &registry,
            config.notifications_enabled,
            config.delivery_policy,
        )
    }

    /// A dispatcher that never sends anything.
    pub fn disabled() -> Self {
        Self { routes: Vec::new(), enabled: false, policy: DeliveryPolicy::BestEffort }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &Subscriber> {
        self.routes.iter().map(|route| &route.subscriber)
    }

    /// Deliver to every subscriber; one failed delivery never stops the rest.
    pub async fn send(&self, subject: &str, body: &str) -> Result<DispatchReport, DispatchError> {
        if !self.enabled {
            tracing::debug!(subject, "Notifications disabled, not sending");
            return Ok(DispatchReport::Suppressed);
        }

        let results = join_all(self.routes.iter().map(|route| route.deliver(subject, body))).await;

        let mut failed = 0;
        for (route, result) in self.routes.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                tracing::warn!(
                    destination = %route.subscriber.destination,
                    transport = %route.subscriber.transport,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }

        let delivered = self.routes.len() - failed;
        if delivered == 0 && failed > 0 && self.policy == DeliveryPolicy::RequireOne {
            return Err(DispatchError::AllDeliveriesFailed(failed));
        }

        Ok(DispatchReport::Delivered { delivered, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Null;

    #[async_trait]
    impl Transport for Null {
        async fn deliver(&self, _: &Subscriber, _: &str, _: &str) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn subscriber(destination: &str, transport: &str) -> SubscriberConfig {
        SubscriberConfig { destination: destination.into(), transport: transport.into() }
    }

    #[test]
    fn test_unknown_transport_rejected_at_construction() {
        let registry = TransportRegistry::new().register("email", Arc::new(Null));
        let result = NotificationDispatcher::new(
            &[subscriber("ops@example.net", "pager")],
            &registry,
            true,
            DeliveryPolicy::RequireOne,
        );
        assert!(matches!(result, Err(ConfigurationError::UnknownTransport { .. })));
    }

    #[test]
    fn test_known_but_unconfigured_transport_rejected() {
        let result = NotificationDispatcher::new(
            &[subscriber("+15550100", "SMS")],
            &TransportRegistry::new(),
            true,
            DeliveryPolicy::RequireOne,
        );
        assert_eq!(result.err(), Some(ConfigurationError::TransportNotConfigured("sms")));
    }

    #[test]
    fn test_keywords_are_normalized() {
        let registry = TransportRegistry::new().register("twilio-sms", Arc::new(Null));
        let dispatcher = NotificationDispatcher::new(
            &[subscriber(" +15550100 ", "Twilio-SMS")],
            &registry,
            true,
            DeliveryPolicy::RequireOne,
        )
        .unwrap();

        let subscribers: Vec<_> = dispatcher.subscribers().cloned().collect();
        assert_eq!(
            subscribers,
            [Subscriber { destination: "+15550100".into(), transport: "twilio-sms".into() }]
        );
    }

    #[tokio::test]
    async fn test_no_subscribers_is_not_a_failure() {
        let dispatcher = NotificationDispatcher::new(
            &[],
            &TransportRegistry::new(),
            true,
            DeliveryPolicy::RequireOne,
        )
        .unwrap();

        let report = dispatcher.send("subject", "body").await.unwrap();
        assert_eq!(report, DispatchReport::Delivered { delivered: 0, failed: 0 });
    }
}
