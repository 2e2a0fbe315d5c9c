use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical pool / subnet lifecycle values
pub mod ip_status {
    pub const ACTIVE: &str = "active";
    pub const INACTIVE: &str = "inactive";
}

/// Canonical allocation status values
pub mod allocation_status {
    pub const ALLOCATED: &str = "allocated";
    pub const RELEASED: &str = "released";
}

/// Canonical allocation history actions
pub mod allocation_action {
    pub const ALLOCATED: &str = "allocated";
    pub const RELEASED: &str = "released";
}

/// IpPool is a named address range owning zero or more subnets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPool {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_ip: String,
    pub end_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIpPoolRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_ip: String,
    pub end_ip: String,
    pub gateway: Option<String>,
    pub status: Option<String>,
}

/// IpSubnet is a CIDR block belonging to exactly one pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpSubnet {
    pub id: i64,
    pub pool_id: i64,
    pub network: String,
    pub prefix_length: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IpSubnet {
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.network, self.prefix_length)
    }

    pub fn is_active(&self) -> bool {
        self.status == ip_status::ACTIVE
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIpSubnetRequest {
    pub pool_id: i64,
    /// CIDR notation, e.g. "10.0.0.0/24". Host bits are cleared on create.
    pub cidr: String,
    pub gateway: Option<String>,
    pub vlan_id: Option<i64>,
    pub status: Option<String>,
}

/// IpAllocation is one leased address; never physically deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAllocation {
    pub id: i64,
    pub subnet_id: i64,
    pub ip_address: String,
    pub mac_address: String,
    pub username: String,
    pub status: String,
    pub allocated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

/// Append-only audit entry for an allocation transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAllocationHistory {
    pub id: i64,
    pub allocation_id: i64,
    pub ip_address: String,
    pub mac_address: String,
    pub username: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Derived utilization of a pool across all of its subnets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolUtilization {
    pub total: u64,
    pub allocated: u64,
    pub available: u64,
    pub utilization_percent: f64,
}

/// Outcome of releasing an allocation at the storage layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    NotFound,
    AlreadyReleased,
    Released,
}
