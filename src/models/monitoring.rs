use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical monitor status values
pub mod monitor_status {
    pub const ONLINE: &str = "online";
    pub const OFFLINE: &str = "offline";
    /// Reachable, but serving no subscribers
    pub const DEGRADED: &str = "degraded";
    pub const UNKNOWN: &str = "unknown";
}

/// Canonical bandwidth period values
pub mod period_type {
    pub const RAW: &str = "raw";
    pub const HOURLY: &str = "hourly";
    pub const DAILY: &str = "daily";
    pub const WEEKLY: &str = "weekly";
    pub const MONTHLY: &str = "monthly";
}

/// Reference to any monitorable device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum DeviceRef {
    Router(i64),
    Olt(i64),
    Onu(i64),
}

impl DeviceRef {
    /// Stored discriminator value
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceRef::Router(_) => "router",
            DeviceRef::Olt(_) => "olt",
            DeviceRef::Onu(_) => "onu",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            DeviceRef::Router(id) | DeviceRef::Olt(id) | DeviceRef::Onu(id) => *id,
        }
    }

    /// Rebuild a reference from its stored (kind, id) pair
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "router" => Some(DeviceRef::Router(id)),
            "olt" => Some(DeviceRef::Olt(id)),
            "onu" => Some(DeviceRef::Onu(id)),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.id())
    }
}

/// DeviceMonitor is the latest health snapshot of one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMonitor {
    pub id: i64,
    pub device: DeviceRef,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,
    pub last_check_at: DateTime<Utc>,
}

/// Metrics gathered by one monitoring poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,
}

impl DeviceMetrics {
    pub fn offline() -> Self {
        Self {
            status: monitor_status::OFFLINE.to_string(),
            ..Default::default()
        }
    }
}

/// BandwidthUsage is one raw sample or one rolled-up bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthUsage {
    pub id: i64,
    pub device: DeviceRef,
    pub timestamp: DateTime<Utc>,
    pub upload_bytes: i64,
    pub download_bytes: i64,
    pub total_bytes: i64,
    pub period_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_at: Option<DateTime<Utc>>,
}

/// A bandwidth point without storage bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    pub timestamp: DateTime<Utc>,
    pub upload_bytes: i64,
    pub download_bytes: i64,
    pub total_bytes: i64,
}

impl From<&BandwidthUsage> for BandwidthSample {
    fn from(row: &BandwidthUsage) -> Self {
        Self {
            timestamp: row.timestamp,
            upload_bytes: row.upload_bytes,
            download_bytes: row.download_bytes,
            total_bytes: row.total_bytes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSummary {
    pub total_upload: i64,
    pub total_download: i64,
    pub total_bytes: i64,
    pub average_upload: f64,
    pub average_download: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthReport {
    pub device_type: String,
    pub device_id: i64,
    pub period_type: String,
    pub data: Vec<BandwidthSample>,
    pub summary: BandwidthSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDataset {
    pub label: String,
    pub data: Vec<f64>,
}

/// Chart-ready series sharing one label axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthGraph {
    pub labels: Vec<String>,
    pub datasets: Vec<GraphDataset>,
}

/// One row of the dashboard view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatusEntry {
    pub id: i64,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub degraded: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStatus {
    pub routers: Vec<DeviceStatusEntry>,
    pub olts: Vec<DeviceStatusEntry>,
    pub summary: StatusSummary,
}

/// Result of one monitoring sweep over all devices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorRunSummary {
    pub checked: usize,
    pub online: usize,
    pub offline: usize,
    pub failed: usize,
}
