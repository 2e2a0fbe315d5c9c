use std::collections::HashSet;
use std::net::Ipv4Addr;

use anyhow::Result;

use crate::models::*;
use super::Store;
use super::ipam;

impl Store {
    // ========== IP Pool Operations ==========

    pub async fn list_ip_pools(&self) -> Result<Vec<IpPool>> {
        ipam::IpPoolRepo::list(&self.pool).await
    }

    pub async fn get_ip_pool(&self, id: i64) -> Result<Option<IpPool>> {
        ipam::IpPoolRepo::get(&self.pool, id).await
    }

    pub async fn create_ip_pool(&self, req: &CreateIpPoolRequest) -> Result<IpPool> {
        ipam::IpPoolRepo::create(&self.pool, req).await
    }

    pub async fn update_ip_pool_status(&self, id: i64, status: &str) -> Result<()> {
        ipam::IpPoolRepo::update_status(&self.pool, id, status).await
    }

    // ========== IP Subnet Operations ==========

    pub async fn list_ip_subnets(&self, pool_id: i64) -> Result<Vec<IpSubnet>> {
        ipam::IpSubnetRepo::list_by_pool(&self.pool, pool_id).await
    }

    pub async fn get_ip_subnet(&self, id: i64) -> Result<Option<IpSubnet>> {
        ipam::IpSubnetRepo::get(&self.pool, id).await
    }

    pub async fn create_ip_subnet(&self, req: &CreateIpSubnetRequest) -> Result<IpSubnet> {
        ipam::IpSubnetRepo::create(&self.pool, req).await
    }

    pub async fn update_ip_subnet_status(&self, id: i64, status: &str) -> Result<()> {
        ipam::IpSubnetRepo::update_status(&self.pool, id, status).await
    }

    // ========== IP Allocation Operations ==========

    pub async fn get_ip_allocation(&self, id: i64) -> Result<Option<IpAllocation>> {
        ipam::IpAllocationRepo::get(&self.pool, id).await
    }

    pub async fn find_active_allocation_by_mac(&self, subnet_id: i64, mac: &str) -> Result<Option<IpAllocation>> {
        ipam::IpAllocationRepo::find_active_by_mac(&self.pool, subnet_id, mac).await
    }

    pub async fn list_active_addresses(&self, subnet_id: i64) -> Result<HashSet<Ipv4Addr>> {
        ipam::IpAllocationRepo::list_active_addresses(&self.pool, subnet_id).await
    }

    pub async fn count_active_allocations_in_pool(&self, pool_id: i64) -> Result<u64> {
        ipam::IpAllocationRepo::count_active_in_pool(&self.pool, pool_id).await
    }

    pub async fn allocate_first_free_ip(
        &self,
        subnet: &IpSubnet,
        mac: &str,
        username: &str,
    ) -> Result<Option<IpAllocation>> {
        ipam::IpAllocationRepo::allocate_first_free(&self.pool, subnet, mac, username).await
    }

    pub async fn release_ip_allocation(&self, id: i64) -> Result<ReleaseOutcome> {
        ipam::IpAllocationRepo::release(&self.pool, id).await
    }

    pub async fn list_ip_allocation_history(&self, allocation_id: i64) -> Result<Vec<IpAllocationHistory>> {
        ipam::IpAllocationRepo::history(&self.pool, allocation_id).await
    }
}
