//! Entry point for stateless schedulers: `load -> run_check_cycle -> save`.
//!
//! Every invocation rebuilds its view of the world from the snapshot cache, so
//! a cron job, the CLI and the `watch` loop all go through the same path.
//! Cycles for one cache key never overlap within a process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;

use super::{CycleReport, Monitor};
use crate::check::ProbeContext;
use crate::config::SiteConfig;
use crate::incident::IncidentRecord;
use crate::notify::{DispatchReport, NotificationDispatcher};
use crate::store::{IncidentStore, SnapshotCache};
use crate::target::CycleContext;

pub struct CycleRunner {
    config: Arc<SiteConfig>,
    probe: Arc<ProbeContext>,
    dispatcher: Arc<NotificationDispatcher>,
    incidents: Arc<dyn IncidentStore>,
    cache: Arc<dyn SnapshotCache>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CycleRunner {
    pub fn new(
        config: Arc<SiteConfig>,
        probe: Arc<ProbeContext>,
        dispatcher: Arc<NotificationDispatcher>,
        incidents: Arc<dyn IncidentStore>,
        cache: Arc<dyn SnapshotCache>,
    ) -> Self {
        Self { config, probe, dispatcher, incidents, cache, locks: Mutex::new(HashMap::new()) }
    }

    /// Build the probe context and dispatcher from the site configuration.
    pub fn from_site(
        config: SiteConfig,
        incidents: Arc<dyn IncidentStore>,
        cache: Arc<dyn SnapshotCache>,
    ) -> anyhow::Result<Self> {
        crate::config::validate_site(&config)?;
        let probe = ProbeContext::new(config.timeout()).context("Failed to build HTTP client")?;
        let dispatcher = NotificationDispatcher::from_site(&config)?;
        Ok(Self::new(
            Arc::new(config),
            Arc::new(probe),
            Arc::new(dispatcher),
            incidents,
            cache,
        ))
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    fn context(&self) -> CycleContext<'_> {
        CycleContext {
            probe: &self.probe,
            dispatcher: &self.dispatcher,
            incidents: self.incidents.as_ref(),
        }
    }

    /// One full check pass for the configured site.
    pub async fn run_once(&self) -> anyhow::Result<CycleReport> {
        let key_lock = self.key_lock(&self.config.site);
        let _guard = key_lock.lock().await;

        let mut monitor = Monitor::load(self.cache.as_ref(), &self.config).await?;
        let report = monitor.run_check_cycle(&self.context()).await;
        monitor.save(self.cache.as_ref()).await.context("Failed to save monitor snapshot")?;

        Ok(report)
    }

    /// Current state without probing anything.
    pub async fn status(&self) -> anyhow::Result<Monitor> {
        Ok(Monitor::load(self.cache.as_ref(), &self.config).await?)
    }

    /// Forget the cached monitor; the next cycle starts from configuration.
    pub async fn clear_cache(&self) -> anyhow::Result<()> {
        let key_lock = self.key_lock(&self.config.site);
        let _guard = key_lock.lock().await;
        Monitor::clear(self.cache.as_ref(), &self.config.site).await
    }

    pub async fn recent_incidents(&self, limit: usize) -> anyhow::Result<Vec<IncidentRecord>> {
        Ok(self.incidents.list_recent(limit).await?)
    }

    pub async fn clear_incidents(&self) -> anyhow::Result<()> {
        self.incidents.clear().await?;
        tracing::info!("Cleared incident history");
        Ok(())
    }

    /// Send a test message to every subscriber.
    pub async fn test_notify(&self) -> anyhow::Result<DispatchReport> {
        let subject = format!("{} test notification", self.config.site);
        let body = format!("This is a test notification from {}.", self.config.site);
        Ok(self.dispatcher.send(&subject, &body).await?)
    }
}
