//! Error types for the pinger engine.
//!
//! Probe failures are ordinary data (they become a failed check), everything
//! else is either fatal at construction (`ConfigurationError`) or logged and
//! absorbed by the component that owns the side effect.

use thiserror::Error;

/// A single probe failed. Always recovered into a failed check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ProbeError {
    reason: String,
}

impl ProbeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    /// Human readable reason, as shown in the target response.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// The remote DHCP agent could not be reached or answered garbage.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("agent returned status {0}")]
    Status(u16),
}

/// Problems found while turning configuration into a monitor or dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("target `{target}` has unknown type `{kind}`")]
    UnknownTargetType { target: String, kind: String },
    #[error("target `{target}` is missing required field `{field}`")]
    MissingField { target: String, field: &'static str },
    #[error("target `{target}` has invalid field `{field}`: {reason}")]
    InvalidField { target: String, field: &'static str, reason: String },
    #[error("target name `{0}` is used more than once")]
    DuplicateTarget(String),
    #[error("target name must not be empty")]
    EmptyTargetName,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("site identifier must not be empty")]
    EmptySite,
    #[error("subscriber `{destination}` uses unknown transport `{transport}`")]
    UnknownTransport { destination: String, transport: String },
    #[error("transport `{0}` is used by a subscriber but not configured")]
    TransportNotConfigured(&'static str),
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("{} configuration problems: {}", .0.len(), join(.0))]
    Multiple(Vec<ConfigurationError>),
}

fn join(errors: &[ConfigurationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Durable incident store failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Snapshot cache store failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Snapshot encoding or decoding failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("snapshot decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("snapshot schema version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("snapshot state for target `{0}` is inconsistent")]
    Inconsistent(String),
}

/// One subscriber's transport failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid message: {0}")]
    Message(String),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outcome of a fan-out when the delivery policy treats it as failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("all {0} deliveries failed")]
    AllDeliveriesFailed(usize),
}
