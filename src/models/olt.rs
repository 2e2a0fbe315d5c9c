use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical OLT management protocol values
pub mod management_protocol {
    pub const SSH: &str = "ssh";
    pub const SNMP: &str = "snmp";
}

/// Canonical OLT health values
pub mod health_status {
    pub const HEALTHY: &str = "healthy";
    pub const UNHEALTHY: &str = "unhealthy";
    pub const UNKNOWN: &str = "unknown";
}

/// Canonical ONU status values
pub mod onu_status {
    pub const ONLINE: &str = "online";
    pub const OFFLINE: &str = "offline";
}

/// Olt is a managed optical line terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Olt {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
    pub management_protocol: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_community: Option<String>,
    pub snmp_version: String,
    pub snmp_port: u16,
    pub brand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub status: String,
    pub health_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backup_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Olt {
    pub fn uses_snmp(&self) -> bool {
        self.management_protocol.eq_ignore_ascii_case(management_protocol::SNMP)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOltRequest {
    pub name: String,
    pub ip_address: String,
    pub port: Option<u16>,
    pub management_protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub snmp_community: Option<String>,
    pub snmp_version: Option<String>,
    pub snmp_port: Option<u16>,
    pub brand: String,
    pub model: Option<String>,
}

/// Onu is an optical network unit attached to an OLT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Onu {
    pub id: i64,
    pub olt_id: i64,
    pub pon_port: String,
    pub onu_id: i64,
    pub serial_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: String,
    pub is_authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_rx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_tx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// OnuRecord is one ONU as reported by a device listing, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnuRecord {
    pub pon_port: String,
    pub onu_id: i64,
    pub serial_number: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_rx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_tx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<i64>,
}

impl OnuRecord {
    pub fn new(pon_port: &str, onu_id: i64, serial_number: &str, status: &str) -> Self {
        Self {
            pon_port: pon_port.to_string(),
            onu_id,
            serial_number: serial_number.to_string(),
            status: status.to_string(),
            signal_rx: None,
            signal_tx: None,
            distance: None,
        }
    }
}

/// Live ONU status. Always the full shape; unknown fields are None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnuStatus {
    pub status: Option<String>,
    pub signal_rx: Option<f64>,
    pub signal_tx: Option<f64>,
    pub distance: Option<i64>,
    pub uptime: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Backup kinds
pub mod backup_type {
    pub const MANUAL: &str = "manual";
    pub const SCHEDULED: &str = "scheduled";
}

/// OltBackup is a stored configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OltBackup {
    pub id: i64,
    pub olt_id: i64,
    pub file_path: String,
    pub file_size: i64,
    pub backup_type: String,
    pub created_at: DateTime<Utc>,
}

/// Backup list entry with a file existence check
#[derive(Debug, Clone, Serialize)]
pub struct OltBackupEntry {
    #[serde(flatten)]
    pub backup: OltBackup,
    pub size_human: String,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub latency_ms: u64,
}

/// OLT statistics. ONU counts come from stored rows, the rest from a live poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OltStatistics {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
    pub temperature: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub total_onus: i64,
    pub online_onus: i64,
    pub offline_onus: i64,
}

/// Per-PON-port ONU occupancy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortUsage {
    pub pon_port: String,
    pub total_onus: i64,
    pub online_onus: i64,
    pub offline_onus: i64,
    pub utilization_percent: f64,
}
