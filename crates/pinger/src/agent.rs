//! Remote DHCP agent collaborator.
//!
//! Leases can only be requested from inside the served network segment, so a
//! small agent does the DHCP exchange and answers `{alive, response}` over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AgentError;

/// Verdict returned by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentReply {
    pub alive: bool,

    /// Free text from the agent. Failed agents report it under `e`.
    #[serde(default, rename = "response", alias = "e")]
    pub detail: Option<String>,
}

impl AgentReply {
    pub fn alive(detail: impl Into<String>) -> Self {
        Self { alive: true, detail: Some(detail.into()) }
    }

    pub fn dead(detail: Option<String>) -> Self {
        Self { alive: false, detail }
    }
}

#[async_trait]
pub trait DhcpAgent: Send + Sync {
    /// Ask the agent at `target` whether a lease could be obtained.
    async fn query(&self, target: &str) -> Result<AgentReply, AgentError>;
}

/// Agent reached with a plain HTTP GET.
pub struct HttpDhcpAgent {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDhcpAgent {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl DhcpAgent for HttpDhcpAgent {
    async fn query(&self, target: &str) -> Result<AgentReply, AgentError> {
        let response = self.client.get(target).timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Status(status.as_u16()));
        }

        Ok(response.json::<AgentReply>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_decoding() {
        let ok: AgentReply = serde_json::from_str(r#"{"alive": true, "response": "offer 10.0.0.7"}"#).unwrap();
        assert_eq!(ok, AgentReply::alive("offer 10.0.0.7"));

        let failed: AgentReply = serde_json::from_str(r#"{"alive": false, "e": "no offer"}"#).unwrap();
        assert_eq!(failed, AgentReply::dead(Some("no offer".into())));

        let bare: AgentReply = serde_json::from_str(r#"{"alive": false}"#).unwrap();
        assert_eq!(bare.detail, None);
    }
}
