//! The monitor aggregate: ordered targets plus the cache snapshot protocol.

pub mod runner;
pub mod snapshot;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

pub use runner::CycleRunner;
pub use snapshot::{MonitorSnapshot, SNAPSHOT_VERSION, TargetState};

use crate::config::{SiteConfig, validate_site};
use crate::error::{ConfigurationError, SnapshotError};
use crate::store::SnapshotCache;
use crate::target::{CycleContext, CycleOutcome, Target, TargetView};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub site: String,
    pub targets: Vec<Target>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub name: String,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

/// Outcomes of one pass, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TargetOutcome>,
}

impl CycleReport {
    pub fn failing(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, CycleOutcome::Failing { .. }))
            .count()
    }

    pub fn recovered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, CycleOutcome::Recovered { .. }))
            .count()
    }
}

impl Monitor {
    /// Fresh monitor: every target alive with no history.
    pub fn from_config(config: &SiteConfig) -> Result<Self, ConfigurationError> {
        validate_site(config)?;

        let targets = config
            .targets
            .iter()
            .map(|def| Target::from_definition(def, &config.mac_placeholder, config.timeout_secs))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            site: config.site.clone(),
            targets,
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    /// Check every target concurrently and advance their state machines.
    pub async fn run_check_cycle(&mut self, ctx: &CycleContext<'_>) -> CycleReport {
        let started_at = Utc::now();
        tracing::info!(site = %self.site, targets = self.targets.len(), "Starting check cycle");

        let outcomes = join_all(self.targets.iter_mut().map(|target| async move {
            let outcome = target.check(ctx).await;
            TargetOutcome { name: target.name.clone(), outcome }
        }))
        .await;

        let finished_at = Utc::now();
        self.updated_at = Some(finished_at);

        let report = CycleReport { started_at, finished_at, outcomes };
        tracing::info!(
            site = %self.site,
            failing = report.failing(),
            recovered = report.recovered(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Check cycle finished"
        );
        report
    }

    pub fn to_snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            version: SNAPSHOT_VERSION,
            site: self.site.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            targets: self.targets.iter().map(TargetState::from).collect(),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        self.to_snapshot().encode()
    }

    pub fn restore(blob: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot = MonitorSnapshot::decode(blob)?;
        Ok(Self {
            site: snapshot.site,
            targets: snapshot.targets.into_iter().map(TargetState::into_target).collect(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        })
    }

    /// Restore the cached monitor for `config.site`, or rebuild it from
    /// configuration when the cache has nothing usable.
    pub async fn load(
        cache: &dyn SnapshotCache,
        config: &SiteConfig,
    ) -> Result<Self, ConfigurationError> {
        match cache.get(&config.site).await {
            Ok(Some(blob)) => match Self::restore(&blob) {
                Ok(monitor) if monitor.site == config.site => {
                    tracing::debug!(site = %config.site, "Restored monitor from cache");
                    return Ok(monitor);
                }
                Ok(monitor) => {
                    tracing::warn!(
                        site = %config.site,
                        cached = %monitor.site,
                        "Cached snapshot belongs to another site, rebuilding"
                    );
                }
                Err(e) => {
                    tracing::warn!(site = %config.site, error = %e, "Unusable snapshot, rebuilding");
                }
            },
            Ok(None) => {
                tracing::info!(site = %config.site, "No cached monitor, building from configuration");
            }
            Err(e) => {
                tracing::warn!(site = %config.site, error = %e, "Cache read failed, rebuilding");
            }
        }

        Self::from_config(config)
    }

    pub async fn save(&self, cache: &dyn SnapshotCache) -> anyhow::Result<()> {
        let blob = self.snapshot()?;
        cache.put(&self.site, blob).await?;
        tracing::debug!(site = %self.site, "Saved monitor snapshot");
        Ok(())
    }

    pub async fn clear(cache: &dyn SnapshotCache, key: &str) -> anyhow::Result<()> {
        cache.delete(key).await?;
        tracing::info!(site = key, "Cleared monitor snapshot");
        Ok(())
    }

    /// True when no target has an open incident. Vacuously true when empty.
    pub fn all_alive(&self) -> bool {
        self.targets.iter().all(Target::is_alive)
    }

    /// True when every target has an open incident. Vacuously true when empty.
    pub fn all_dead(&self) -> bool {
        self.targets.iter().all(|t| !t.is_alive())
    }

    /// Rough "last checked" label.
    pub fn freshness(&self, now: DateTime<Utc>) -> &'static str {
        let Some(updated_at) = self.updated_at else {
            return "Never?";
        };

        let secs = (now - updated_at).num_milliseconds() as f64 / 1000.0;
        match secs {
            s if s > 1200.0 => "a while ago",
            s if s > 900.0 => "about 15 minutes ago",
            s if s > 600.0 => "about 10 minutes ago",
            s if s > 300.0 => "about 5 minutes ago",
            s if s > 240.0 => "about 4 minutes ago",
            s if s > 180.0 => "about 3 minutes ago",
            s if s > 120.0 => "about 2 minutes ago",
            s if s > 60.0 => "about 1 minute ago",
            s if s > 30.0 => "about 30 seconds ago",
            _ => "just now",
        }
    }

    pub fn views(&self) -> Vec<TargetView> {
        self.targets.iter().map(Target::view).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn monitor() -> Monitor {
        let config: SiteConfig = serde_json::from_value(serde_json::json!({
            "site": "office",
            "targets": [
                {"name": "ssh", "type": "tcp", "ip": "10.0.0.1", "port": 22},
                {"name": "gw", "type": "icmp", "ip": "10.0.0.254"},
            ]
        }))
        .unwrap();
        Monitor::from_config(&config).unwrap()
    }

    #[test]
    fn test_fresh_monitor() {
        let monitor = monitor();
        assert_eq!(monitor.site, "office");
        let names: Vec<_> = monitor.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["ssh", "gw"]);
        assert!(monitor.all_alive());
        assert!(!monitor.all_dead());
        assert!(monitor.targets.iter().all(|t| t.consecutive_failures == 0));
    }

    #[test]
    fn test_freshness_labels() {
        let mut monitor = monitor();
        let now = Utc::now();
        assert_eq!(monitor.freshness(now), "Never?");

        let cases = [
            (10, "just now"),
            (45, "about 30 seconds ago"),
            (90, "about 1 minute ago"),
            (150, "about 2 minutes ago"),
            (400, "about 5 minutes ago"),
            (1000, "about 15 minutes ago"),
            (5000, "a while ago"),
        ];
        for (ago, label) in cases {
            monitor.updated_at = Some(now - Duration::seconds(ago));
            assert_eq!(monitor.freshness(now), label, "{ago} seconds");
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let monitor = monitor();
        let restored = Monitor::restore(&monitor.snapshot().unwrap()).unwrap();
        assert_eq!(restored, monitor);
    }
}
