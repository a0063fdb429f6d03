use std::time::Duration;

use anyhow::Result;
use pinger::CycleRunner;
use tokio::time::{MissedTickBehavior, interval};

/// Run a check cycle every `every` until Ctrl-C.
///
/// A failed cycle is logged and the loop carries on; the next tick starts
/// from whatever the cache holds.
pub async fn watch(runner: &CycleRunner, every: Duration) -> Result<()> {
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        site = %runner.config().site,
        interval_secs = every.as_secs(),
        "Watching targets, press Ctrl-C to stop"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                match runner.run_once().await {
                    Ok(report) => {
                        for outcome in &report.outcomes {
                            tracing::debug!(name = %outcome.name, outcome = ?outcome.outcome, "Target checked");
                        }
                    }
                    Err(e) => tracing::error!(error = %format!("{e:#}"), "Check cycle failed"),
                }
            }
            result = &mut shutdown => {
                result?;
                tracing::info!("Shutdown signal received, stopping");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pinger::{MemoryCache, MemoryIncidentStore, SiteConfig};

    use super::*;

    #[tokio::test]
    async fn test_watch_runs_cycles_until_cancelled() {
        let cache = Arc::new(MemoryCache::new());
        let config = SiteConfig { site: "watch-test".into(), ..Default::default() };
        let runner =
            CycleRunner::from_site(config, Arc::new(MemoryIncidentStore::new()), cache.clone())
                .unwrap();

        let watched = tokio::time::timeout(Duration::from_millis(250), watch(&runner, Duration::from_millis(50))).await;

        assert!(watched.is_err(), "watch should only stop on Ctrl-C");
        assert!(cache.contains("watch-test"));
    }
}
