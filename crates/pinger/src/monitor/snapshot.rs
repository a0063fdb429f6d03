//! Versioned snapshot schema stored in the cache between invocations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::check::CheckStrategy;
use crate::error::SnapshotError;
use crate::incident::{Incident, IncidentState};
use crate::target::Target;

/// Bumped whenever `MonitorSnapshot` or anything it contains changes shape.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub version: u32,
    pub site: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub targets: Vec<TargetState>,
}

/// Every field of a target, including its open incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub name: String,
    pub strategy: CheckStrategy,
    pub timeout_secs: u64,
    pub consecutive_failures: u32,
    pub last_recovered_failures: u32,
    pub response: String,
    pub incident: Option<Incident>,
}

impl From<&Target> for TargetState {
    fn from(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            strategy: target.strategy.clone(),
            timeout_secs: target.timeout_secs,
            consecutive_failures: target.consecutive_failures,
            last_recovered_failures: target.last_recovered_failures,
            response: target.response.clone(),
            incident: target.incident.clone(),
        }
    }
}

impl TargetState {
    /// Hysteresis counters must agree with the incident.
    fn is_consistent(&self) -> bool {
        match &self.incident {
            None => self.consecutive_failures == 0,
            Some(incident) => {
                incident.state() == IncidentState::Open
                    && incident.failure_count >= 1
                    && incident.failure_count == self.consecutive_failures
                    && incident.target_name == self.name
            }
        }
    }

    pub fn into_target(self) -> Target {
        Target {
            name: self.name,
            strategy: self.strategy,
            timeout_secs: self.timeout_secs,
            consecutive_failures: self.consecutive_failures,
            last_recovered_failures: self.last_recovered_failures,
            response: self.response,
            incident: self.incident,
        }
    }
}

impl MonitorSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(SnapshotError::Encode)
    }

    /// Decode and validate a blob. Anything not written by this schema
    /// version is rejected.
    pub fn decode(blob: &[u8]) -> Result<Self, SnapshotError> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }

        let header: Header = serde_json::from_slice(blob).map_err(SnapshotError::Decode)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let snapshot: Self = serde_json::from_slice(blob).map_err(SnapshotError::Decode)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::new();
        for state in &self.targets {
            if !seen.insert(state.name.as_str()) || !state.is_consistent() {
                return Err(SnapshotError::Inconsistent(state.name.clone()));
            }
        }
        Ok(())
    }
}
