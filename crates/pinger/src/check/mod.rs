//! Check strategies - one probe per target kind.
//!
//! A strategy is chosen once, when configuration is turned into a monitor,
//! through the [`STRATEGIES`] lookup table. After that it is plain immutable
//! data: it is serialized into snapshots and only needs a [`ProbeContext`]
//! (timeout, shared HTTP client, DHCP agent) to run.

pub mod dhcp;
pub mod http;
pub mod icmp;
pub mod ntp;
pub mod tcp;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

pub use dhcp::DhcpCheck;
pub use http::HttpCheck;
pub use icmp::IcmpCheck;
pub use ntp::NtpCheck;
pub use tcp::TcpCheck;

use crate::agent::{DhcpAgent, HttpDhcpAgent};
use crate::config::TargetDefinition;
use crate::error::{ConfigurationError, ProbeError};

/// Runtime resources shared by every probe of a cycle.
#[derive(Clone)]
pub struct ProbeContext {
    timeout: Duration,
    http: reqwest::Client,
    agent: Arc<dyn DhcpAgent>,
}

impl ProbeContext {
    /// Build a context with its own HTTP client and an HTTP DHCP agent.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(timeout, http))
    }

    /// Build a context around an existing HTTP client.
    pub fn with_client(timeout: Duration, http: reqwest::Client) -> Self {
        let agent = Arc::new(HttpDhcpAgent::new(http.clone(), timeout));
        Self { timeout, http, agent }
    }

    /// Replace the DHCP agent collaborator.
    pub fn with_agent(mut self, agent: Arc<dyn DhcpAgent>) -> Self {
        self.agent = agent;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn agent(&self) -> &dyn DhcpAgent {
        self.agent.as_ref()
    }
}

/// Checker trait implemented by every strategy variant.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Run the probe, returning a success detail.
    async fn check(&self, ctx: &ProbeContext) -> Result<String, ProbeError>;

    /// Short endpoint description used in pretty names.
    fn description(&self) -> String;

    /// Strategy specific fields for display.
    fn fields(&self) -> Vec<(&'static str, String)>;
}

/// Closed set of check strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckStrategy {
    Tcp(TcpCheck),
    Icmp(IcmpCheck),
    Http(HttpCheck),
    Ntp(NtpCheck),
    Dhcp(DhcpCheck),
}

type StrategyBuilder = fn(&TargetDefinition, &str) -> Result<CheckStrategy, ConfigurationError>;

/// Configuration keyword to constructor.
const STRATEGIES: &[(&str, StrategyBuilder)] = &[
    ("tcp", build_tcp),
    ("icmp", build_icmp),
    ("http", build_http),
    ("ntp", build_ntp),
    ("dhcp", build_dhcp),
];

fn build_tcp(def: &TargetDefinition, _: &str) -> Result<CheckStrategy, ConfigurationError> {
    TcpCheck::from_definition(def).map(CheckStrategy::Tcp)
}

fn build_icmp(def: &TargetDefinition, _: &str) -> Result<CheckStrategy, ConfigurationError> {
    IcmpCheck::from_definition(def).map(CheckStrategy::Icmp)
}

fn build_http(def: &TargetDefinition, _: &str) -> Result<CheckStrategy, ConfigurationError> {
    HttpCheck::from_definition(def).map(CheckStrategy::Http)
}

fn build_ntp(def: &TargetDefinition, _: &str) -> Result<CheckStrategy, ConfigurationError> {
    NtpCheck::from_definition(def).map(CheckStrategy::Ntp)
}

fn build_dhcp(
    def: &TargetDefinition,
    mac_placeholder: &str,
) -> Result<CheckStrategy, ConfigurationError> {
    DhcpCheck::from_definition(def, mac_placeholder).map(CheckStrategy::Dhcp)
}

impl CheckStrategy {
    /// Resolve a configured target into a strategy.
    pub fn from_definition(
        definition: &TargetDefinition,
        mac_placeholder: &str,
    ) -> Result<Self, ConfigurationError> {
        let keyword = definition.kind.trim().to_ascii_lowercase();
        let (_, build) = STRATEGIES.iter().find(|(name, _)| *name == keyword).ok_or_else(|| {
            ConfigurationError::UnknownTargetType {
                target: definition.name.clone(),
                kind: definition.kind.clone(),
            }
        })?;
        build(definition, mac_placeholder)
    }

    /// Configuration keyword of this strategy.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckStrategy::Tcp(_) => "tcp",
            CheckStrategy::Icmp(_) => "icmp",
            CheckStrategy::Http(_) => "http",
            CheckStrategy::Ntp(_) => "ntp",
            CheckStrategy::Dhcp(_) => "dhcp",
        }
    }

    fn checker(&self) -> &dyn Checker {
        match self {
            CheckStrategy::Tcp(c) => c,
            CheckStrategy::Icmp(c) => c,
            CheckStrategy::Http(c) => c,
            CheckStrategy::Ntp(c) => c,
            CheckStrategy::Dhcp(c) => c,
        }
    }

    pub async fn execute(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        self.checker().check(ctx).await
    }

    pub fn description(&self) -> String {
        self.checker().description()
    }

    pub fn fields(&self) -> BTreeMap<&'static str, String> {
        self.checker().fields().into_iter().collect()
    }
}

/// Fetch a required field or report which one is missing.
pub(crate) fn required<'a, T>(
    definition: &'a TargetDefinition,
    value: &'a Option<T>,
    field: &'static str,
) -> Result<&'a T, ConfigurationError> {
    value.as_ref().ok_or_else(|| ConfigurationError::MissingField {
        target: definition.name.clone(),
        field,
    })
}

/// Host names are handed to sockets and to the ping binary; reject anything
/// that could be read as an option.
pub(crate) fn validate_host(
    definition: &TargetDefinition,
    host: &str,
) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidField {
        target: definition.name.clone(),
        field: "ip",
        reason: reason.into(),
    };

    if host.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if host.starts_with('-') {
        return Err(invalid("must not start with '-'"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }
    Ok(())
}

/// Only http(s) URLs can be probed.
pub(crate) fn validate_url(
    definition: &TargetDefinition,
    url: &str,
) -> Result<(), ConfigurationError> {
    let parsed = Url::parse(url).map_err(|e| ConfigurationError::InvalidField {
        target: definition.name.clone(),
        field: "url",
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigurationError::InvalidField {
            target: definition.name.clone(),
            field: "url",
            reason: format!("unsupported URL scheme: {scheme}"),
        }),
    }
}

/// Milliseconds elapsed, formatted the way every timed probe reports it.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    format!("elapsed_ms = {:.2}", elapsed.as_secs_f64() * 1000.0)
}
