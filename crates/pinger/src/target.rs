//! A monitored endpoint and its failure hysteresis.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::check::{CheckStrategy, ProbeContext};
use crate::config::TargetDefinition;
use crate::error::ConfigurationError;
use crate::incident::Incident;
use crate::notify::NotificationDispatcher;
use crate::store::IncidentStore;

/// Collaborators borrowed by every target during one check cycle.
#[derive(Clone, Copy)]
pub struct CycleContext<'a> {
    pub probe: &'a ProbeContext,
    pub dispatcher: &'a NotificationDispatcher,
    pub incidents: &'a dyn IncidentStore,
}

/// What a single `Target::check` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CycleOutcome {
    Healthy,
    Recovered { failures: u32, escalated: bool },
    Failing { failures: u32, notified: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub strategy: CheckStrategy,
    pub timeout_secs: u64,
    pub consecutive_failures: u32,
    pub last_recovered_failures: u32,
    pub response: String,
    pub incident: Option<Incident>,
}

/// Read-only projection used by status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetView {
    pub name: String,
    pub pretty_name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub alive: bool,
    pub failures: u32,
    pub last_recovered_failures: u32,
    pub timeout_secs: u64,
    pub response: String,
    #[serde(flatten)]
    pub fields: BTreeMap<&'static str, String>,
}

impl Target {
    pub fn new(name: impl Into<String>, strategy: CheckStrategy, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            strategy,
            timeout_secs,
            consecutive_failures: 0,
            last_recovered_failures: 0,
            response: String::new(),
            incident: None,
        }
    }

    pub fn from_definition(
        definition: &TargetDefinition,
        mac_placeholder: &str,
        timeout_secs: u64,
    ) -> Result<Self, ConfigurationError> {
        let strategy = CheckStrategy::from_definition(definition, mac_placeholder)?;
        Ok(Self::new(definition.name.trim(), strategy, timeout_secs))
    }

    /// Up exactly while no incident is open.
    pub fn is_alive(&self) -> bool {
        self.incident.is_none()
    }

    pub fn description(&self) -> String {
        self.strategy.description()
    }

    pub fn pretty_name(&self) -> String {
        format!("{} [{}]", self.name, self.description())
    }

    /// Run one probe and advance the state machine. Probe errors end here.
    pub async fn check(&mut self, ctx: &CycleContext<'_>) -> CycleOutcome {
        tracing::debug!(name = %self.name, kind = self.strategy.kind(), "Checking target");

        match self.strategy.execute(ctx.probe).await {
            Ok(detail) => {
                self.response = detail;
                match self.incident.take() {
                    None => CycleOutcome::Healthy,
                    Some(incident) => {
                        let failures = self.consecutive_failures;
                        let outcome =
                            incident.retire(&self.response, ctx.incidents, ctx.dispatcher).await;
                        self.last_recovered_failures = failures;
                        self.consecutive_failures = 0;
                        CycleOutcome::Recovered { failures, escalated: outcome.escalated }
                    }
                }
            }
            Err(e) => {
                self.response = e.reason().to_string();
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);

                let notified = match self.incident.as_mut() {
                    Some(incident) => incident.record_failure(&self.response, ctx.dispatcher).await,
                    None => {
                        let pretty_name = self.pretty_name();
                        self.incident = Some(Incident::open(&self.name, &pretty_name, &self.response));
                        false
                    }
                };

                tracing::debug!(
                    name = %self.name,
                    failures = self.consecutive_failures,
                    reason = %self.response,
                    "Check failed"
                );
                CycleOutcome::Failing { failures: self.consecutive_failures, notified }
            }
        }
    }

    pub fn view(&self) -> TargetView {
        TargetView {
            name: self.name.clone(),
            pretty_name: self.pretty_name(),
            kind: self.strategy.kind(),
            alive: self.is_alive(),
            failures: self.consecutive_failures,
            last_recovered_failures: self.last_recovered_failures,
            timeout_secs: self.timeout_secs,
            response: self.response.clone(),
            fields: self.strategy.fields(),
        }
    }
}
