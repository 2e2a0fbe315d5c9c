use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::db::Store;
use crate::models::*;
use crate::utils;

/// IP address management over pools and subnets.
///
/// Allocation is linearized per subnet: a lazily created async mutex per
/// subnet id is held across the scan and insert, and the store runs both in
/// one transaction. Different subnets allocate independently.
pub struct IpamService {
    store: Store,
    subnet_locks: std::sync::Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl IpamService {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            subnet_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn subnet_lock(&self, subnet_id: i64) -> Arc<Mutex<()>> {
        let mut locks = match self.subnet_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(subnet_id).or_default().clone()
    }

    // ========== Pools & Subnets ==========

    pub async fn create_pool(&self, req: &CreateIpPoolRequest) -> Result<IpPool> {
        for ip in [&req.start_ip, &req.end_ip] {
            if !utils::is_valid_ipv4(ip) {
                anyhow::bail!("Invalid IPv4 address: {}", ip);
            }
        }
        let pool = self.store.create_ip_pool(req).await?;
        tracing::info!("Created IP pool {} ({} - {})", pool.name, pool.start_ip, pool.end_ip);
        Ok(pool)
    }

    pub async fn get_pool(&self, pool_id: i64) -> Result<Option<IpPool>> {
        self.store.get_ip_pool(pool_id).await
    }

    pub async fn list_pools(&self) -> Result<Vec<IpPool>> {
        self.store.list_ip_pools().await
    }

    pub async fn create_subnet(&self, req: &CreateIpSubnetRequest) -> Result<IpSubnet> {
        self.store
            .get_ip_pool(req.pool_id)
            .await?
            .ok_or_else(|| crate::db::NotFoundError::new("IP pool", &req.pool_id.to_string()))?;

        let subnet = self.store.create_ip_subnet(req).await?;
        tracing::info!("Created subnet {} in pool {}", subnet.cidr(), subnet.pool_id);
        Ok(subnet)
    }

    pub async fn get_subnet(&self, subnet_id: i64) -> Result<Option<IpSubnet>> {
        self.store.get_ip_subnet(subnet_id).await
    }

    pub async fn list_subnets(&self, pool_id: i64) -> Result<Vec<IpSubnet>> {
        self.store.list_ip_subnets(pool_id).await
    }

    pub async fn set_subnet_status(&self, subnet_id: i64, status: &str) -> Result<()> {
        self.store.update_ip_subnet_status(subnet_id, status).await
    }

    // ========== Allocation ==========

    /// Lease the lowest free usable address of an active subnet.
    /// None when the subnet is unknown, inactive or full.
    pub async fn allocate_ip(&self, subnet_id: i64, mac: &str, username: &str) -> Result<Option<IpAllocation>> {
        let lock = self.subnet_lock(subnet_id);
        let _guard = lock.lock().await;

        // Re-read under the lock so a concurrent status change is honored
        let Some(subnet) = self.store.get_ip_subnet(subnet_id).await? else {
            tracing::warn!("Allocation requested for unknown subnet {}", subnet_id);
            return Ok(None);
        };
        if !subnet.is_active() {
            tracing::warn!("Subnet {} is {}, not allocating", subnet.cidr(), subnet.status);
            return Ok(None);
        }

        let mac = utils::normalize_mac(mac);
        let allocation = self
            .store
            .allocate_first_free_ip(&subnet, &mac, username)
            .await
            .with_context(|| format!("Failed to allocate in subnet {}", subnet.cidr()))?;

        match &allocation {
            Some(a) => tracing::info!("Allocated {} to {} ({})", a.ip_address, a.username, a.mac_address),
            None => tracing::warn!("Subnet {} is full", subnet.cidr()),
        }
        Ok(allocation)
    }

    /// False for an unknown allocation. Releasing twice is a no-op that
    /// still returns true.
    pub async fn release_ip(&self, allocation_id: i64) -> Result<bool> {
        match self.store.release_ip_allocation(allocation_id).await? {
            ReleaseOutcome::NotFound => Ok(false),
            ReleaseOutcome::AlreadyReleased => {
                tracing::debug!("Allocation {} already released", allocation_id);
                Ok(true)
            }
            ReleaseOutcome::Released => {
                tracing::info!("Released allocation {}", allocation_id);
                Ok(true)
            }
        }
    }

    /// Usable addresses without an active allocation, ascending
    pub async fn get_available_ips(&self, subnet_id: i64) -> Result<Vec<Ipv4Addr>> {
        let Some(subnet) = self.store.get_ip_subnet(subnet_id).await? else {
            return Ok(Vec::new());
        };
        let net = utils::parse_cidr(&subnet.cidr()).map_err(|e| anyhow::anyhow!(e))?;
        let taken = self.store.list_active_addresses(subnet_id).await?;

        Ok(utils::usable_hosts(net).filter(|ip| !taken.contains(ip)).collect())
    }

    pub async fn get_pool_utilization(&self, pool_id: i64) -> Result<PoolUtilization> {
        let subnets = self.store.list_ip_subnets(pool_id).await?;
        let total: u64 = subnets.iter().map(|s| utils::usable_count(s.prefix_length)).sum();
        let allocated = self.store.count_active_allocations_in_pool(pool_id).await?;

        let utilization_percent = if total == 0 {
            0.0
        } else {
            utils::round_to(allocated as f64 / total as f64 * 100.0, 1)
        };

        Ok(PoolUtilization {
            total,
            allocated,
            available: total.saturating_sub(allocated),
            utilization_percent,
        })
    }

    pub async fn get_allocation(&self, allocation_id: i64) -> Result<Option<IpAllocation>> {
        self.store.get_ip_allocation(allocation_id).await
    }

    pub async fn find_active_allocation_by_mac(&self, subnet_id: i64, mac: &str) -> Result<Option<IpAllocation>> {
        self.store
            .find_active_allocation_by_mac(subnet_id, &utils::normalize_mac(mac))
            .await
    }

    /// Oldest first
    pub async fn get_allocation_history(&self, allocation_id: i64) -> Result<Vec<IpAllocationHistory>> {
        self.store.list_ip_allocation_history(allocation_id).await
    }
}
