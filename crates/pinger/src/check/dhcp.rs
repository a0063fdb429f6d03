use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::{Checker, ProbeContext, required, validate_url};
use crate::config::TargetDefinition;
use crate::error::{ConfigurationError, ProbeError};

/// Reason reported whenever the agent itself cannot be talked to.
pub const AGENT_COMMUNICATION_ERROR: &str = "error in initial agent communications";

/// Reason reported when the agent says DHCP failed without details.
pub const DHCP_FAILED: &str = "Remote machine determined that DHCP has failed the check.";

/// DHCP checker. The lease attempt happens on a remote agent; this only asks
/// the agent for its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpCheck {
    /// Agent URL with the MAC placeholder already substituted.
    pub url: String,
    pub mac: Option<String>,
}

impl DhcpCheck {
    /// Substitutes `placeholder` in `url` when both a MAC and the placeholder
    /// are present.
    pub fn new(url: &str, mac: Option<String>, placeholder: &str) -> Self {
        let url = match &mac {
            Some(mac) if !placeholder.is_empty() && url.contains(placeholder) => {
                url.replace(placeholder, mac)
            }
            _ => url.to_string(),
        };
        Self { url, mac }
    }

    pub(crate) fn from_definition(
        def: &TargetDefinition,
        placeholder: &str,
    ) -> Result<Self, ConfigurationError> {
        let url = required(def, &def.url, "url")?;
        let check = Self::new(url, def.mac.clone(), placeholder);
        validate_url(def, &check.url)?;
        Ok(check)
    }
}

#[async_trait]
impl Checker for DhcpCheck {
    async fn check(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        let reply = match timeout(ctx.timeout(), ctx.agent().query(&self.url)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!(url = %self.url, error = %e, "DHCP agent communication failed");
                return Err(ProbeError::new(AGENT_COMMUNICATION_ERROR));
            }
            Err(_) => {
                tracing::error!(url = %self.url, "DHCP agent did not answer in time");
                return Err(ProbeError::new(AGENT_COMMUNICATION_ERROR));
            }
        };

        if reply.alive {
            tracing::debug!(url = %self.url, "DHCP is alive");
            return Ok(reply.detail.unwrap_or_else(|| "NO response".into()));
        }

        let reason = reply.detail.filter(|d| !d.trim().is_empty());
        Err(ProbeError::new(reason.unwrap_or_else(|| DHCP_FAILED.into())))
    }

    fn description(&self) -> String {
        self.mac.clone().unwrap_or_else(|| "No MAC specified".into())
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("url", self.url.clone()),
            ("mac", self.mac.clone().unwrap_or_else(|| "None".into())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_substituted_into_url() {
        let check = DhcpCheck::new(
            "http://agent.local:5000/_dhcp/<<MAC>>",
            Some("aa:bb:cc:dd:ee:ff".into()),
            "<<MAC>>",
        );
        assert_eq!(check.url, "http://agent.local:5000/_dhcp/aa:bb:cc:dd:ee:ff");
        assert!(!check.url.contains("<<MAC>>"));
        assert_eq!(check.description(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_url_untouched_without_mac() {
        let check = DhcpCheck::new("http://agent.local/_dhcp/<<MAC>>", None, "<<MAC>>");
        assert_eq!(check.url, "http://agent.local/_dhcp/<<MAC>>");
        assert_eq!(check.description(), "No MAC specified");
    }

    #[test]
    fn test_url_untouched_without_placeholder() {
        let check = DhcpCheck::new("http://agent.local/_dhcp", Some("aa:bb".into()), "<<MAC>>");
        assert_eq!(check.url, "http://agent.local/_dhcp");
    }
}
