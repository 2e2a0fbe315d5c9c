//! Device transport: SSH command execution and SNMP GET/WALK.
//!
//! Every call is bounded by a deadline. The blocking libssh2 and SNMP
//! sockets run on the blocking thread pool.

mod snmp;
mod ssh;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Olt;

pub use snmp::SnmpClient;
pub use ssh::SshClient;

/// Transport-level failure. Services convert these into failure results.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("snmp error: {0}")]
    Snmp(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("task join error: {0}")]
    Join(String),
}

impl TransportError {
    pub fn is_auth(&self) -> bool {
        matches!(self, TransportError::Auth(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => SnmpVersion::V1,
            _ => SnmpVersion::V2c,
        }
    }
}

/// Connection parameters for one device
#[derive(Debug, Clone)]
pub struct DeviceEndpoint {
    pub host: String,
    pub ssh_port: u16,
    pub username: String,
    pub password: String,
    pub snmp_port: u16,
    pub snmp_community: String,
    pub snmp_version: SnmpVersion,
}

impl DeviceEndpoint {
    pub fn from_olt(olt: &Olt, default_community: &str) -> Self {
        Self {
            host: olt.ip_address.clone(),
            ssh_port: olt.port,
            username: olt.username.clone(),
            password: olt.password.clone(),
            snmp_port: olt.snmp_port,
            snmp_community: olt
                .snmp_community
                .clone()
                .unwrap_or_else(|| default_community.to_string()),
            snmp_version: SnmpVersion::parse(&olt.snmp_version),
        }
    }

    /// Session cache key
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.ssh_port)
    }
}

/// Owned SNMP value
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    Counter(u64),
    Timeticks(u32),
    Bytes(Vec<u8>),
    Oid(String),
    IpAddress([u8; 4]),
    Null,
}

impl SnmpValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(v) => Some(*v),
            SnmpValue::Counter(v) => i64::try_from(*v).ok(),
            SnmpValue::Timeticks(v) => Some(*v as i64),
            SnmpValue::Bytes(b) => String::from_utf8_lossy(b).trim().parse().ok(),
            _ => None,
        }
    }

    /// Printable form; octet strings that are not text are hex-encoded
    pub fn as_text(&self) -> String {
        match self {
            SnmpValue::Integer(v) => v.to_string(),
            SnmpValue::Counter(v) => v.to_string(),
            SnmpValue::Timeticks(v) => v.to_string(),
            SnmpValue::Bytes(b) => {
                if b.iter().all(|c| c.is_ascii_graphic() || *c == b' ') {
                    String::from_utf8_lossy(b).trim().to_string()
                } else {
                    b.iter().map(|c| format!("{:02X}", c)).collect()
                }
            }
            SnmpValue::Oid(s) => s.clone(),
            SnmpValue::IpAddress(a) => format!("{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            SnmpValue::Null => String::new(),
        }
    }
}

/// Device access used by the OLT service
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Run one CLI command and return its output
    async fn exec(&self, endpoint: &DeviceEndpoint, command: &str) -> Result<String, TransportError>;

    /// GET one OID; Ok(None) when the agent reports no such object
    async fn snmp_get(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Option<SnmpValue>, TransportError>;

    /// WALK a subtree, returning (full OID, value) pairs in agent order
    async fn snmp_walk(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Vec<(String, SnmpValue)>, TransportError>;

    /// Open and cache a session for later exec calls
    async fn open_session(&self, endpoint: &DeviceEndpoint) -> Result<(), TransportError>;

    /// Drop a cached session. Returns whether one existed.
    async fn close_session(&self, endpoint: &DeviceEndpoint) -> bool;
}

/// Production transport combining SSH and SNMP clients
pub struct NetTransport {
    ssh: SshClient,
    snmp: SnmpClient,
}

impl NetTransport {
    pub fn new(ssh_timeout: Duration, snmp_timeout: Duration) -> Self {
        Self {
            ssh: SshClient::new(ssh_timeout),
            snmp: SnmpClient::new(snmp_timeout),
        }
    }
}

#[async_trait]
impl DeviceTransport for NetTransport {
    async fn exec(&self, endpoint: &DeviceEndpoint, command: &str) -> Result<String, TransportError> {
        self.ssh.exec(endpoint, command).await
    }

    async fn snmp_get(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Option<SnmpValue>, TransportError> {
        self.snmp.get(endpoint, oid).await
    }

    async fn snmp_walk(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Vec<(String, SnmpValue)>, TransportError> {
        self.snmp.walk(endpoint, oid).await
    }

    async fn open_session(&self, endpoint: &DeviceEndpoint) -> Result<(), TransportError> {
        self.ssh.open(endpoint).await
    }

    async fn close_session(&self, endpoint: &DeviceEndpoint) -> bool {
        self.ssh.close(endpoint)
    }
}

/// Run blocking device I/O on the blocking pool under a deadline
pub(crate) async fn run_blocking<T, F>(deadline: Duration, f: F) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
{
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(TransportError::Join(e.to_string())),
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snmp_value_text() {
        assert_eq!(SnmpValue::Bytes(b"HWTC12345678".to_vec()).as_text(), "HWTC12345678");
        assert_eq!(SnmpValue::Bytes(vec![0x48, 0x57, 0x00, 0xff]).as_text(), "485700FF");
        assert_eq!(SnmpValue::Integer(-2150).as_i64(), Some(-2150));
        assert_eq!(SnmpValue::Null.as_i64(), None);
    }

    #[test]
    fn test_snmp_version_parse() {
        assert_eq!(SnmpVersion::parse("v1"), SnmpVersion::V1);
        assert_eq!(SnmpVersion::parse("2c"), SnmpVersion::V2c);
        assert_eq!(SnmpVersion::parse(""), SnmpVersion::V2c);
    }

    #[tokio::test]
    async fn test_run_blocking_deadline() {
        let result: Result<(), _> = run_blocking(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
