mod bandwidth;
mod ipam;
mod monitors;
mod olts;
mod onus;
mod pppoe_users;
mod routers;
pub(crate) mod row_helpers;
mod store_ipam;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;

pub use bandwidth::bucket_start;

/// Typed error for "resource not found" that callers can downcast to
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with the default pool size
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ========== OLT Operations ==========

    pub async fn list_olts(&self) -> Result<Vec<Olt>> {
        olts::OltRepo::list(&self.pool).await
    }

    pub async fn get_olt(&self, id: i64) -> Result<Option<Olt>> {
        olts::OltRepo::get(&self.pool, id).await
    }

    pub async fn create_olt(&self, req: &CreateOltRequest) -> Result<Olt> {
        olts::OltRepo::create(&self.pool, req).await
    }

    pub async fn update_olt_health(&self, id: i64, health: &str) -> Result<()> {
        olts::OltRepo::update_health(&self.pool, id, health).await
    }

    pub async fn update_olt_backup_time(&self, id: i64) -> Result<()> {
        olts::OltRepo::update_backup_time(&self.pool, id).await
    }

    // ========== OLT Backup Operations ==========

    pub async fn create_olt_backup(
        &self,
        olt_id: i64,
        file_path: &str,
        file_size: i64,
        backup_type: &str,
    ) -> Result<OltBackup> {
        olts::OltBackupRepo::create(&self.pool, olt_id, file_path, file_size, backup_type).await
    }

    pub async fn list_olt_backups(&self, olt_id: i64) -> Result<Vec<OltBackup>> {
        olts::OltBackupRepo::list_by_olt(&self.pool, olt_id).await
    }

    pub async fn get_olt_backup(&self, olt_id: i64, backup_id: i64) -> Result<Option<OltBackup>> {
        olts::OltBackupRepo::get_for_olt(&self.pool, olt_id, backup_id).await
    }

    // ========== ONU Operations ==========

    pub async fn get_onu(&self, id: i64) -> Result<Option<Onu>> {
        onus::OnuRepo::get(&self.pool, id).await
    }

    pub async fn list_onus(&self, olt_id: i64) -> Result<Vec<Onu>> {
        onus::OnuRepo::list_by_olt(&self.pool, olt_id).await
    }

    pub async fn upsert_onu(&self, olt_id: i64, record: &OnuRecord) -> Result<()> {
        onus::OnuRepo::upsert(&self.pool, olt_id, record).await
    }

    pub async fn update_onu_live_status(&self, id: i64, status: &OnuStatus) -> Result<()> {
        onus::OnuRepo::update_live_status(&self.pool, id, status).await
    }

    pub async fn set_onu_authorized(&self, id: i64, authorized: bool) -> Result<()> {
        onus::OnuRepo::set_authorized(&self.pool, id, authorized).await
    }

    pub async fn count_onus(&self, olt_id: i64) -> Result<(i64, i64)> {
        onus::OnuRepo::count_by_olt(&self.pool, olt_id).await
    }

    // ========== Router Operations ==========

    pub async fn list_routers(&self) -> Result<Vec<MikrotikRouter>> {
        routers::RouterRepo::list(&self.pool).await
    }

    pub async fn get_router(&self, id: i64) -> Result<Option<MikrotikRouter>> {
        routers::RouterRepo::get(&self.pool, id).await
    }

    pub async fn create_router(&self, req: &CreateRouterRequest) -> Result<MikrotikRouter> {
        routers::RouterRepo::create(&self.pool, req).await
    }

    pub async fn update_router_api_status(
        &self,
        id: i64,
        api_status: &str,
        last_error: Option<&str>,
        response_time_ms: Option<i64>,
    ) -> Result<()> {
        routers::RouterRepo::update_api_status(&self.pool, id, api_status, last_error, response_time_ms).await
    }

    pub async fn set_router_nas(&self, id: i64, nas_id: i64) -> Result<()> {
        routers::RouterRepo::set_nas(&self.pool, id, nas_id).await
    }

    pub async fn mark_router_provisioned(&self, id: i64) -> Result<()> {
        routers::RouterRepo::mark_provisioned(&self.pool, id).await
    }

    // ========== NAS Operations ==========

    pub async fn get_nas(&self, id: i64) -> Result<Option<Nas>> {
        routers::NasRepo::get(&self.pool, id).await
    }

    pub async fn create_nas(&self, req: &CreateNasRequest) -> Result<Nas> {
        routers::NasRepo::create(&self.pool, req).await
    }

    pub async fn update_nas_name(&self, id: i64, nasname: &str) -> Result<()> {
        routers::NasRepo::update_nasname(&self.pool, id, nasname).await
    }

    // ========== PPPoE Mirror Operations ==========

    pub async fn list_pppoe_users(&self, router_id: i64) -> Result<Vec<MikrotikPppoeUser>> {
        pppoe_users::PppoeUserRepo::list_by_router(&self.pool, router_id).await
    }

    pub async fn get_pppoe_user(&self, router_id: i64, username: &str) -> Result<Option<MikrotikPppoeUser>> {
        pppoe_users::PppoeUserRepo::get_by_router(&self.pool, router_id, username).await
    }

    pub async fn find_pppoe_user(&self, username: &str) -> Result<Option<MikrotikPppoeUser>> {
        pppoe_users::PppoeUserRepo::find_latest(&self.pool, username).await
    }

    pub async fn upsert_pppoe_user(&self, req: &CreatePppoeUserRequest) -> Result<MikrotikPppoeUser> {
        pppoe_users::PppoeUserRepo::upsert(&self.pool, req).await
    }

    pub async fn update_pppoe_user(&self, id: i64, changes: &UpdatePppoeUserRequest) -> Result<()> {
        pppoe_users::PppoeUserRepo::apply_changes(&self.pool, id, changes).await
    }

    pub async fn set_pppoe_user_status(&self, id: i64, status: &str) -> Result<()> {
        pppoe_users::PppoeUserRepo::set_status(&self.pool, id, status).await
    }

    // ========== Monitoring Operations ==========

    pub async fn get_device_monitor(&self, device: DeviceRef) -> Result<Option<DeviceMonitor>> {
        monitors::DeviceMonitorRepo::get(&self.pool, device).await
    }

    pub async fn list_device_monitors(&self) -> Result<Vec<DeviceMonitor>> {
        monitors::DeviceMonitorRepo::list(&self.pool).await
    }

    pub async fn upsert_device_monitor(&self, device: DeviceRef, metrics: &DeviceMetrics) -> Result<DeviceMonitor> {
        monitors::DeviceMonitorRepo::upsert(&self.pool, device, metrics).await
    }

    // ========== Bandwidth Operations ==========

    pub async fn insert_bandwidth_sample(
        &self,
        device: DeviceRef,
        upload_bytes: i64,
        download_bytes: i64,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        bandwidth::BandwidthRepo::insert_raw(&self.pool, device, upload_bytes, download_bytes, at).await
    }

    pub async fn list_bandwidth(
        &self,
        device: DeviceRef,
        period: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BandwidthUsage>> {
        bandwidth::BandwidthRepo::list_range(&self.pool, device, period, from, to).await
    }

    pub async fn rollup_bandwidth(
        &self,
        source: &str,
        target: &str,
        cutoff: DateTime<Utc>,
        bucket_secs: i64,
        parents: &[(&str, i64)],
    ) -> Result<usize> {
        bandwidth::BandwidthRepo::rollup(&self.pool, source, target, cutoff, bucket_secs, parents).await
    }

    pub async fn prune_bandwidth(&self, before: DateTime<Utc>) -> Result<u64> {
        bandwidth::BandwidthRepo::prune_consumed(&self.pool, before).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;

    /// A migrated store backed by a throwaway file
    pub async fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let store = Store::new(path.to_str().expect("utf-8 path"))
            .await
            .expect("store");
        (store, dir)
    }
}
