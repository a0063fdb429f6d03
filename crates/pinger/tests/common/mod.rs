//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pinger::error::{AgentError, CacheError, DeliveryError, PersistenceError};
use pinger::{
    AgentReply, CycleContext, DeliveryPolicy, DhcpAgent, IncidentRecord, IncidentStore,
    MemoryIncidentStore, NotificationDispatcher, ProbeContext, SiteConfig, SnapshotCache,
    Subscriber, SubscriberConfig, TargetDefinition, Transport, TransportRegistry,
};

pub const AGENT: &str = "http://agent.test/_dhcp/<<MAC>>";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Agent URL a DHCP target with `mac` resolves to.
pub fn agent_url(mac: &str) -> String {
    AGENT.replace("<<MAC>>", mac)
}

/// DHCP target definition; its health is scripted through [`FakeAgent`].
pub fn dhcp(name: &str, mac: &str) -> TargetDefinition {
    TargetDefinition {
        name: name.into(),
        kind: "dhcp".into(),
        url: Some(AGENT.into()),
        mac: Some(mac.into()),
        ..Default::default()
    }
}

pub fn site(targets: Vec<TargetDefinition>) -> SiteConfig {
    SiteConfig {
        site: "https://status.example.net".into(),
        timeout_secs: 2,
        targets,
        subscribers: vec![SubscriberConfig {
            destination: "ops@example.net".into(),
            transport: "email".into(),
        }],
        ..Default::default()
    }
}

/// DHCP agent whose verdict per URL is set by the test.
#[derive(Default)]
pub struct FakeAgent {
    alive: Mutex<HashMap<String, bool>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn set(&self, mac: &str, alive: bool) {
        self.alive.lock().unwrap().insert(agent_url(mac), alive);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DhcpAgent for FakeAgent {
    async fn query(&self, target: &str) -> Result<AgentReply, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let alive = self.alive.lock().unwrap().get(target).copied();
        match alive {
            Some(true) => Ok(AgentReply::alive("lease offered")),
            Some(false) => Ok(AgentReply::dead(Some("no lease offered".into()))),
            None => Err(AgentError::Status(404)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub destination: String,
    pub subject: String,
    pub body: String,
}

/// Transport that remembers every message.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.body).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent {
            destination: subscriber.destination.clone(),
            subject: subject.into(),
            body: body.into(),
        });
        Ok(())
    }
}

/// Transport that always fails.
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn deliver(&self, _: &Subscriber, _: &str, _: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError::Rejected { status: 503, body: "unavailable".into() })
    }
}

pub struct FailingStore;

#[async_trait]
impl IncidentStore for FailingStore {
    async fn insert(&self, _: &IncidentRecord) -> Result<i64, PersistenceError> {
        Err(anyhow::anyhow!("disk full").into())
    }

    async fn list_recent(&self, _: usize) -> Result<Vec<IncidentRecord>, PersistenceError> {
        Err(anyhow::anyhow!("disk full").into())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        Err(anyhow::anyhow!("disk full").into())
    }
}

pub struct FailingCache;

#[async_trait]
impl SnapshotCache for FailingCache {
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(anyhow::anyhow!("connection refused").into())
    }

    async fn put(&self, _: &str, _: Vec<u8>) -> Result<(), CacheError> {
        Err(anyhow::anyhow!("connection refused").into())
    }

    async fn delete(&self, _: &str) -> Result<(), CacheError> {
        Err(anyhow::anyhow!("connection refused").into())
    }
}

/// Dispatcher sending everything for `config` to `transport` as "email".
pub fn recording_dispatcher(
    config: &SiteConfig,
    transport: Arc<RecordingTransport>,
) -> NotificationDispatcher {
    let registry = TransportRegistry::new().register("email", transport);
    NotificationDispatcher::new(
        &config.subscribers,
        &registry,
        config.notifications_enabled,
        DeliveryPolicy::RequireOne,
    )
    .unwrap()
}

/// Collaborators for driving targets and monitors directly.
pub struct Harness {
    pub agent: Arc<FakeAgent>,
    pub transport: Arc<RecordingTransport>,
    pub probe: ProbeContext,
    pub dispatcher: NotificationDispatcher,
    pub store: MemoryIncidentStore,
}

impl Harness {
    pub fn new(config: &SiteConfig) -> Self {
        init_tracing();
        let agent = Arc::new(FakeAgent::new());
        let transport = Arc::new(RecordingTransport::default());
        let probe = ProbeContext::new(config.timeout()).unwrap().with_agent(agent.clone());
        let dispatcher = recording_dispatcher(config, transport.clone());
        Self { agent, transport, probe, dispatcher, store: MemoryIncidentStore::new() }
    }

    pub fn ctx(&self) -> CycleContext<'_> {
        CycleContext { probe: &self.probe, dispatcher: &self.dispatcher, incidents: &self.store }
    }
}
