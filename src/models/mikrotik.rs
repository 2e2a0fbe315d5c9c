use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical router API reachability values
pub mod api_status {
    pub const ONLINE: &str = "online";
    pub const OFFLINE: &str = "offline";
    pub const UNKNOWN: &str = "unknown";
}

/// Canonical PPPoE mirror status values
pub mod pppoe_status {
    pub const SYNCED: &str = "synced";
    pub const INACTIVE: &str = "inactive";
}

/// MikrotikRouter is a managed router reachable through its management API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MikrotikRouter {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_id: Option<i64>,
    pub name: String,
    pub ip_address: String,
    pub api_port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub radius_secret: Option<String>,
    pub status: String,
    pub api_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
    /// Set once RADIUS provisioning completed with every step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRouterRequest {
    pub name: String,
    pub ip_address: String,
    pub api_port: Option<u16>,
    pub username: String,
    pub password: String,
    pub radius_secret: Option<String>,
    pub nas_id: Option<i64>,
}

/// Nas is a RADIUS client record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nas {
    pub id: i64,
    pub nasname: String,
    pub shortname: String,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Address of the RADIUS server this NAS authenticates against
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNasRequest {
    pub nasname: String,
    pub shortname: String,
    pub secret: String,
    pub server: String,
    pub description: Option<String>,
}

/// PPPoE secret mirrored locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MikrotikPppoeUser {
    pub id: i64,
    pub router_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub service: String,
    pub profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePppoeUserRequest {
    pub router_id: i64,
    pub username: String,
    pub password: String,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    pub local_address: Option<String>,
    pub remote_address: Option<String>,
}

fn default_service() -> String {
    "pppoe".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

/// Partial update of a PPPoE secret. Only Some fields are sent and mirrored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePppoeUserRequest {
    pub password: Option<String>,
    pub service: Option<String>,
    pub profile: Option<String>,
    pub local_address: Option<String>,
    pub remote_address: Option<String>,
}

impl UpdatePppoeUserRequest {
    pub fn is_empty(&self) -> bool {
        self.password.is_none()
            && self.service.is_none()
            && self.profile.is_none()
            && self.local_address.is_none()
            && self.remote_address.is_none()
    }
}

/// One active PPP session on a router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    #[serde(default, alias = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub uptime: String,
    #[serde(default, rename = "caller-id", skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// Per-step outcome of first-connect RADIUS provisioning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningSteps {
    pub radius_client: bool,
    pub ppp_aaa: bool,
    pub radius_incoming: bool,
    pub backup: bool,
    pub netwatch: bool,
    pub nas_table: bool,
}

impl ProvisioningSteps {
    pub fn failed_count(&self) -> usize {
        [
            self.radius_client,
            self.ppp_aaa,
            self.radius_incoming,
            self.backup,
            self.netwatch,
            self.nas_table,
        ]
        .iter()
        .filter(|ok| !**ok)
        .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<ProvisioningSteps>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub filename: String,
}
