use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use super::{Checker, ProbeContext, required, validate_host};
use crate::config::TargetDefinition;
use crate::error::{ConfigurationError, ProbeError};

/// Reason used when ping fails without saying why.
pub const ICMP_NOT_ALIVE: &str = "ICMP host is not alive";

/// ICMP checker.
///
/// Opening raw ICMP sockets needs elevated privileges, so this sends a single
/// echo through the system `ping` binary, which is usually setuid or has
/// `cap_net_raw`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpCheck {
    pub ip: String,
}

impl IcmpCheck {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }

    pub(crate) fn from_definition(def: &TargetDefinition) -> Result<Self, ConfigurationError> {
        let ip = required(def, &def.ip, "ip")?;
        validate_host(def, ip)?;
        Ok(Self::new(ip.clone()))
    }

    fn command(&self, wait: Duration) -> Command {
        let mut command = Command::new("ping");
        command
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait.as_secs().max(1).to_string())
            .arg(&self.ip)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Checker for IcmpCheck {
    async fn check(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        // ping enforces its own reply deadline; the outer bound only catches a
        // hung process, and dropping the future kills it.
        let deadline = ctx.timeout() + Duration::from_secs(1);

        let output = timeout(deadline, self.command(ctx.timeout()).output())
            .await
            .map_err(|_| ProbeError::new("ICMP probe timeout"))?
            .map_err(|e| ProbeError::new(format!("failed to run ping: {e}")))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(ProbeError::new(ICMP_NOT_ALIVE))
        } else {
            Err(ProbeError::new(stderr))
        }
    }

    fn description(&self) -> String {
        format!("icmp://{}", self.ip)
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("ip", self.ip.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_sends_single_echo() {
        let check = IcmpCheck::new("192.0.2.1");
        let command = check.command(Duration::from_secs(3));
        let args: Vec<_> = command.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-c", "1", "-W", "3", "192.0.2.1"]);
    }

    #[test]
    fn test_description() {
        assert_eq!(IcmpCheck::new("10.0.0.1").description(), "icmp://10.0.0.1");
    }
}
