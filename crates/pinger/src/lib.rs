//! Pinger - health-check state machine and incident lifecycle engine
//!
//! Probes a fixed set of network targets, tracks consecutive failures per
//! target, opens and retires incidents with hysteresis, and notifies
//! subscribers when a target goes down or comes back up. State lives in a
//! snapshot cache between invocations so the engine can be driven by a
//! stateless scheduler.

pub mod agent;
pub mod check;
pub mod config;
pub mod error;
pub mod incident;
pub mod monitor;
pub mod notify;
pub mod store;
pub mod target;

// Re-export main types
pub use agent::{AgentReply, DhcpAgent, HttpDhcpAgent};
pub use check::{CheckStrategy, Checker, ProbeContext};
pub use config::{DeliveryPolicy, SiteConfig, SubscriberConfig, TargetDefinition};
pub use error::{ConfigurationError, ProbeError};
pub use incident::{ESCALATION_THRESHOLD, Incident, IncidentRecord};
pub use monitor::{CycleReport, CycleRunner, Monitor, MonitorSnapshot};
pub use notify::{DispatchReport, NotificationDispatcher, Subscriber, Transport, TransportRegistry};
pub use store::{IncidentStore, MemoryCache, MemoryIncidentStore, SnapshotCache};
pub use target::{CycleContext, CycleOutcome, Target, TargetView};
