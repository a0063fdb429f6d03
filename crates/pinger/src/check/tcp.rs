use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Checker, ProbeContext, format_elapsed, required, validate_host};
use crate::config::TargetDefinition;
use crate::error::{ConfigurationError, ProbeError};

/// TCP port checker. Up when a stream socket connects before the timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpCheck {
    pub ip: String,
    pub port: u16,
}

impl TcpCheck {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    pub(crate) fn from_definition(def: &TargetDefinition) -> Result<Self, ConfigurationError> {
        let ip = required(def, &def.ip, "ip")?;
        let port = *required(def, &def.port, "port")?;
        validate_host(def, ip)?;
        if port == 0 {
            return Err(ConfigurationError::InvalidField {
                target: def.name.clone(),
                field: "port",
                reason: "must be between 1 and 65535".into(),
            });
        }
        Ok(Self::new(ip.clone(), port))
    }
}

#[async_trait]
impl Checker for TcpCheck {
    async fn check(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        let start = Instant::now();

        let stream = timeout(ctx.timeout(), TcpStream::connect((self.ip.as_str(), self.port)))
            .await
            .map_err(|_| ProbeError::new("TCP connection timeout"))?
            .map_err(|e| ProbeError::new(format!("TCP connection failed: {e}")))?;
        drop(stream);

        Ok(format_elapsed(start.elapsed()))
    }

    fn description(&self) -> String {
        format!("tcp://{}:{}", self.ip, self.port)
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("ip", self.ip.clone()), ("port", self.port.to_string())]
    }
}
