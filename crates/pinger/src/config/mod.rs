//! Site configuration consumed by the engine.
//!
//! The application crate owns where this comes from (a TOML file); the engine
//! only needs the parsed structure. Target types are kept as keywords here and
//! resolved into check strategies by [`crate::check::CheckStrategy::from_definition`].

pub mod validation;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use validation::validate_site;

/// Token replaced by a target's MAC address inside DHCP agent URLs.
pub const DEFAULT_MAC_PLACEHOLDER: &str = "<<MAC>>";

/// Default per-probe timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Everything the engine needs to build a monitor and its dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site identifier, also used as the snapshot cache key.
    pub site: String,

    /// Timeout applied to every probe, in seconds.
    pub timeout_secs: u64,

    /// Global switch, turned off to silence alerts while testing.
    pub notifications_enabled: bool,

    /// Placeholder substituted with a target MAC in DHCP agent URLs.
    pub mac_placeholder: String,

    /// How `send()` reports a fan-out where every delivery failed.
    pub delivery_policy: DeliveryPolicy,

    /// Monitored targets, checked and displayed in this order.
    pub targets: Vec<TargetDefinition>,

    /// Notification recipients.
    pub subscribers: Vec<SubscriberConfig>,

    pub smtp: Option<SmtpConfig>,

    pub twilio: Option<TwilioConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: "pinger".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            notifications_enabled: true,
            mac_placeholder: DEFAULT_MAC_PLACEHOLDER.into(),
            delivery_policy: DeliveryPolicy::default(),
            targets: Vec::new(),
            subscribers: Vec::new(),
            smtp: None,
            twilio: None,
        }
    }
}

impl SiteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One monitored endpoint as written in configuration.
///
/// Only the fields relevant to `kind` are read; the rest are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub name: String,

    /// Strategy keyword: `tcp`, `icmp`, `http`, `ntp` or `dhcp`.
    #[serde(rename = "type", alias = "service_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// A notification recipient bound to one transport keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Email address or phone number, depending on the transport.
    pub destination: String,

    /// Transport keyword: `email`, `sms` or `twilio-sms`.
    pub transport: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub pass: String,

    /// Sender address used in the `From` header.
    #[serde(default = "default_return_email")]
    pub return_email: String,
}

fn default_smtp_port() -> u16 {
    25
}

fn default_return_email() -> String {
    "you_forgot@config-return-email.oops".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub messaging_service_sid: String,

    /// Base URL of the messaging API, overridable for staging.
    #[serde(default = "default_twilio_api")]
    pub api_base: String,
}

fn default_twilio_api() -> String {
    "https://api.twilio.com".into()
}

/// Policy for reporting a notification fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryPolicy {
    /// `send()` fails only when there were subscribers and none was reached.
    #[default]
    RequireOne,
    /// `send()` never fails; delivery errors are only logged.
    BestEffort,
}
