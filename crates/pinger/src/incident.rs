//! One continuous down-period of a target.
//!
//! An incident is opened silently on the first failed check. The "just went
//! down" notification goes out once, when the failure count reaches
//! [`ESCALATION_THRESHOLD`]. On recovery an escalated incident is persisted and
//! announced as back up; a single blip is dropped without trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::NotificationDispatcher;
use crate::store::IncidentStore;

/// Consecutive failures after which an outage is announced and recorded.
pub const ESCALATION_THRESHOLD: u32 = 2;

/// Row persisted for every escalated incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Assigned by the store.
    pub id: Option<i64>,
    pub name: String,
    pub pretty_name: String,
    /// Response of the check that closed the incident.
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub failure_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentState {
    Open,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub target_name: String,
    pub pretty_name: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub last_failure_detail: String,
    pub down_notified: bool,
}

/// Result of closing an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetireOutcome {
    /// The incident had crossed the escalation threshold.
    pub escalated: bool,
    /// Store id, when the record was persisted.
    pub record_id: Option<i64>,
}

impl Incident {
    /// Open an incident for the first failed check. Never notifies.
    pub fn open(target_name: &str, pretty_name: &str, detail: &str) -> Self {
        tracing::debug!(name = target_name, "Opening incident");
        Self {
            target_name: target_name.to_string(),
            pretty_name: pretty_name.to_string(),
            started_at: Utc::now(),
            stopped_at: None,
            failure_count: 1,
            last_failure_detail: detail.to_string(),
            down_notified: false,
        }
    }

    pub fn state(&self) -> IncidentState {
        if self.stopped_at.is_some() { IncidentState::Retired } else { IncidentState::Open }
    }

    pub fn escalated(&self) -> bool {
        self.failure_count >= ESCALATION_THRESHOLD
    }

    /// Count another failed check. Returns true when this call sent the
    /// "just went down" notification.
    pub async fn record_failure(&mut self, detail: &str, dispatcher: &NotificationDispatcher) -> bool {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_detail = detail.to_string();

        if self.failure_count != ESCALATION_THRESHOLD || self.down_notified {
            return false;
        }

        self.down_notified = true;
        tracing::info!(
            name = %self.target_name,
            failures = self.failure_count,
            "Target went down"
        );

        let body = format!("{} just went down. {}", self.pretty_name, detail);
        if let Err(e) = dispatcher.send(&self.pretty_name, &body).await {
            tracing::warn!(name = %self.target_name, error = %e, "Down notification failed");
        }
        true
    }

    /// Close the incident after a successful check.
    pub async fn retire(
        mut self,
        final_response: &str,
        store: &dyn IncidentStore,
        dispatcher: &NotificationDispatcher,
    ) -> RetireOutcome {
        let stopped_at = Utc::now();
        self.stopped_at = Some(stopped_at);

        if !self.escalated() {
            tracing::debug!(name = %self.target_name, "Discarding single-failure incident");
            return RetireOutcome { escalated: false, record_id: None };
        }

        let record = IncidentRecord {
            id: None,
            name: self.target_name.clone(),
            pretty_name: self.pretty_name.clone(),
            reason: final_response.to_string(),
            started_at: self.started_at,
            stopped_at,
            failure_count: self.failure_count,
        };

        let record_id = match store.insert(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(name = %self.target_name, error = %e, "Failed to persist incident");
                None
            }
        };

        tracing::info!(
            name = %self.target_name,
            failures = self.failure_count,
            "Target is back up"
        );

        let body = format!("{} is BACK UP after {} pings.", self.pretty_name, self.failure_count);
        if let Err(e) = dispatcher.send(&self.pretty_name, &body).await {
            tracing::warn!(name = %self.target_name, error = %e, "Recovery notification failed");
        }

        RetireOutcome { escalated: true, record_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryIncidentStore;

    #[test]
    fn test_open_incident() {
        let incident = Incident::open("web", "web [https://example.net/]", "timeout");
        assert_eq!(incident.failure_count, 1);
        assert_eq!(incident.state(), IncidentState::Open);
        assert!(!incident.down_notified);
        assert!(!incident.escalated());
    }

    #[tokio::test]
    async fn test_down_notification_flag_set_once() {
        let dispatcher = NotificationDispatcher::disabled();
        let mut incident = Incident::open("web", "web [x]", "a");

        assert!(incident.record_failure("b", &dispatcher).await);
        assert!(!incident.record_failure("c", &dispatcher).await);
        assert!(!incident.record_failure("d", &dispatcher).await);

        assert_eq!(incident.failure_count, 4);
        assert_eq!(incident.last_failure_detail, "d");
        assert!(incident.down_notified);
    }

    #[tokio::test]
    async fn test_single_failure_discarded() {
        let store = MemoryIncidentStore::new();
        let outcome = Incident::open("web", "web [x]", "a")
            .retire("status-code: 200", &store, &NotificationDispatcher::disabled())
            .await;

        assert_eq!(outcome, RetireOutcome { escalated: false, record_id: None });
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_escalated_incident_persisted() {
        let store = MemoryIncidentStore::new();
        let dispatcher = NotificationDispatcher::disabled();
        let mut incident = Incident::open("web", "web [x]", "a");
        incident.record_failure("b", &dispatcher).await;
        incident.record_failure("c", &dispatcher).await;

        let outcome = incident.retire("status-code: 200", &store, &dispatcher).await;
        assert_eq!(outcome, RetireOutcome { escalated: true, record_id: Some(1) });

        let records = store.list_recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failure_count, 3);
        assert_eq!(records[0].reason, "status-code: 200");
        assert!(records[0].stopped_at >= records[0].started_at);
    }
}
