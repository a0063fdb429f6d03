//! Minimal SNTP (RFC 4330) client used by the NTP checker.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;

use super::{Checker, ProbeContext, required, validate_host};
use crate::config::TargetDefinition;
use crate::error::{ConfigurationError, ProbeError};

pub const DEFAULT_NTP_PORT: u16 = 123;

const PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
/// LI = 0, VN = 3, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0b00_011_011;
const MODE_SERVER: u8 = 4;

/// NTP checker. Up when the server answers a client request; reports the
/// local clock offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtpCheck {
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_NTP_PORT
}

impl NtpCheck {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into(), port: DEFAULT_NTP_PORT }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub(crate) fn from_definition(def: &TargetDefinition) -> Result<Self, ConfigurationError> {
        let ip = required(def, &def.ip, "ip")?;
        validate_host(def, ip)?;
        Ok(Self::new(ip.clone()).with_port(def.port.unwrap_or(DEFAULT_NTP_PORT)))
    }

    async fn query(&self) -> Result<f64, ProbeError> {
        let server = lookup_host((self.ip.as_str(), self.port))
            .await
            .map_err(|e| ProbeError::new(format!("NTP lookup failed: {e}")))?
            .next()
            .ok_or_else(|| ProbeError::new(format!("NTP lookup returned no address for {}", self.ip)))?;

        let bind = if server.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind).await.map_err(io_error)?;
        socket.connect(server).await.map_err(io_error)?;

        let originate = ntp_now();
        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_HEADER;
        request[40..48].copy_from_slice(&originate.to_be_bytes());
        socket.send(&request).await.map_err(io_error)?;

        let mut reply = [0u8; 512];
        let len = socket.recv(&mut reply).await.map_err(io_error)?;
        let destination = ntp_now();

        parse_offset(&reply[..len], originate, destination)
    }
}

fn io_error(e: std::io::Error) -> ProbeError {
    ProbeError::new(format!("NTP request failed: {e}"))
}

/// Current time as a 64-bit NTP timestamp (32.32 fixed point).
fn ntp_now() -> u64 {
    let since_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    to_ntp(since_unix)
}

fn to_ntp(since_unix: Duration) -> u64 {
    let seconds = since_unix.as_secs() + NTP_UNIX_OFFSET;
    let fraction = (u64::from(since_unix.subsec_nanos()) << 32) / 1_000_000_000;
    (seconds << 32) | fraction
}

fn to_seconds(timestamp: u64) -> f64 {
    (timestamp >> 32) as f64 + (timestamp & 0xFFFF_FFFF) as f64 / 4_294_967_296.0
}

fn read_timestamp(packet: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&packet[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

/// Validate a server reply and compute the clock offset in seconds.
fn parse_offset(packet: &[u8], originate: u64, destination: u64) -> Result<f64, ProbeError> {
    if packet.len() < PACKET_LEN {
        return Err(ProbeError::new(format!("NTP reply too short ({} bytes)", packet.len())));
    }

    let mode = packet[0] & 0b111;
    if mode != MODE_SERVER {
        return Err(ProbeError::new(format!("NTP reply has unexpected mode {mode}")));
    }

    let stratum = packet[1];
    if stratum == 0 {
        let code = String::from_utf8_lossy(&packet[12..16]).trim_end_matches('\0').to_string();
        return Err(ProbeError::new(format!("NTP server sent kiss-o'-death {code}")));
    }

    if read_timestamp(packet, 24) != originate {
        return Err(ProbeError::new("NTP reply does not match request"));
    }

    let t1 = to_seconds(originate);
    let t2 = to_seconds(read_timestamp(packet, 32));
    let t3 = to_seconds(read_timestamp(packet, 40));
    let t4 = to_seconds(destination);

    Ok(((t2 - t1) + (t3 - t4)) / 2.0)
}

#[async_trait]
impl Checker for NtpCheck {
    async fn check(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        let offset = timeout(ctx.timeout(), self.query())
            .await
            .map_err(|_| ProbeError::new("NTP request timeout"))??;

        Ok(format!("offset = {offset:.2}"))
    }

    fn description(&self) -> String {
        format!("ntp://{}", self.ip)
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("ip", self.ip.clone()), ("port", self.port.to_string())]
    }
}
