//! Human and JSON output for the CLI commands.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use pinger::{CycleOutcome, CycleReport, DispatchReport, IncidentRecord, Monitor, TargetView};
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusView {
    pub site: String,
    pub banner: &'static str,
    pub checked: &'static str,
    pub updated_at: Option<DateTime<Utc>>,
    pub targets: Vec<TargetView>,
}

impl StatusView {
    pub fn new(monitor: &Monitor, now: DateTime<Utc>) -> Self {
        let banner = if monitor.targets.is_empty() {
            "No targets configured"
        } else if monitor.all_alive() {
            "All systems operational"
        } else if monitor.all_dead() {
            "All systems down"
        } else {
            "Some systems are down"
        };

        Self {
            site: monitor.site.clone(),
            banner,
            checked: monitor.freshness(now),
            updated_at: monitor.updated_at,
            targets: monitor.views(),
        }
    }
}

fn state_label(alive: bool) -> &'static str {
    if alive { "UP" } else { "DOWN" }
}

pub fn status(view: &StatusView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} - {}", view.site, view.banner);
    let _ = writeln!(out, "Last checked: {}", view.checked);

    for target in &view.targets {
        let _ = write!(out, "  [{:<4}] {}", state_label(target.alive), target.pretty_name);
        if target.failures > 0 {
            let _ = write!(out, " ({} failed checks)", target.failures);
        }
        if !target.response.is_empty() {
            let _ = write!(out, ": {}", target.response);
        }
        out.push('\n');
    }
    out
}

pub fn cycle(report: &CycleReport) -> String {
    let mut out = String::new();
    for entry in &report.outcomes {
        let line = match entry.outcome {
            CycleOutcome::Healthy => "up".to_string(),
            CycleOutcome::Recovered { failures, escalated: true } => {
                format!("back up after {failures} failed checks")
            }
            CycleOutcome::Recovered { .. } => "back up".to_string(),
            CycleOutcome::Failing { failures, notified: true } => {
                format!("down ({failures} failed checks, notified)")
            }
            CycleOutcome::Failing { failures, .. } => format!("down ({failures} failed checks)"),
        };
        let _ = writeln!(out, "  {}: {}", entry.name, line);
    }
    let _ = writeln!(
        out,
        "{} targets checked in {} ms",
        report.outcomes.len(),
        (report.finished_at - report.started_at).num_milliseconds()
    );
    out
}

pub fn incidents(records: &[IncidentRecord]) -> String {
    if records.is_empty() {
        return "No incidents recorded\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "  #{} {} down from {} to {} ({} failed checks): {}",
            record.id.unwrap_or_default(),
            record.pretty_name,
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.stopped_at.format("%Y-%m-%d %H:%M:%S"),
            record.failure_count,
            record.reason
        );
    }
    out
}

pub fn dispatch(report: &DispatchReport) -> String {
    match report {
        DispatchReport::Suppressed => "Notifications are disabled, nothing sent\n".to_string(),
        DispatchReport::Delivered { delivered, failed } => {
            format!("Delivered to {delivered} subscribers, {failed} failed\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinger::SiteConfig;

    fn monitor() -> Monitor {
        let config: SiteConfig = serde_json::from_value(serde_json::json!({
            "site": "office",
            "targets": [{"name": "ssh", "type": "tcp", "ip": "10.0.0.1", "port": 22}]
        }))
        .unwrap();
        Monitor::from_config(&config).unwrap()
    }

    #[test]
    fn test_status_of_fresh_monitor() {
        let view = StatusView::new(&monitor(), Utc::now());
        assert_eq!(view.banner, "All systems operational");

        let text = status(&view);
        assert!(text.starts_with("office - All systems operational\nLast checked: Never?\n"));
        assert!(text.contains("[UP  ] ssh [tcp://10.0.0.1:22]"));
    }

    #[test]
    fn test_empty_incident_list() {
        assert_eq!(incidents(&[]), "No incidents recorded\n");
    }
}
