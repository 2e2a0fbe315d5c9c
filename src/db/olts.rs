use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::{map_olt_backup_row, map_olt_row};

const SELECT_OLT: &str = r#"
    SELECT id, name, ip_address, port, management_protocol, username, password,
           snmp_community, snmp_version, snmp_port, brand, model, status, health_status,
           last_backup_at, last_health_check_at, created_at, updated_at
    FROM olts
"#;

/// OLT database operations
pub struct OltRepo;

impl OltRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Olt>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_OLT))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_olt_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Olt>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_OLT))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_olt_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateOltRequest) -> Result<Olt> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO olts (name, ip_address, port, management_protocol, username, password,
                              snmp_community, snmp_version, snmp_port, brand, model,
                              status, health_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', 'unknown', ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(&req.ip_address)
        .bind(req.port.unwrap_or(22) as i64)
        .bind(req.management_protocol.as_deref().unwrap_or(management_protocol::SSH))
        .bind(req.username.clone().unwrap_or_default())
        .bind(req.password.clone().unwrap_or_default())
        .bind(req.snmp_community.clone().unwrap_or_default())
        .bind(req.snmp_version.as_deref().unwrap_or("v2c"))
        .bind(req.snmp_port.unwrap_or(161) as i64)
        .bind(&req.brand)
        .bind(req.model.clone().unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("OLT not found after creation")
    }

    pub async fn update_health(pool: &Pool<Sqlite>, id: i64, health: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE olts SET health_status = ?, last_health_check_at = ?, updated_at = ? WHERE id = ?")
            .bind(health)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn update_backup_time(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE olts SET last_backup_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

const SELECT_BACKUP: &str = r#"
    SELECT id, olt_id, file_path, file_size, backup_type, created_at
    FROM olt_backups
"#;

/// OLT configuration backup records
pub struct OltBackupRepo;

impl OltBackupRepo {
    pub async fn create(
        pool: &Pool<Sqlite>,
        olt_id: i64,
        file_path: &str,
        file_size: i64,
        backup_type: &str,
    ) -> Result<OltBackup> {
        let result = sqlx::query(
            "INSERT INTO olt_backups (olt_id, file_path, file_size, backup_type, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(olt_id)
        .bind(file_path)
        .bind(file_size)
        .bind(backup_type)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_BACKUP))
            .bind(result.last_insert_rowid())
            .fetch_optional(pool)
            .await?;

        row.as_ref()
            .map(map_olt_backup_row)
            .context("OLT backup not found after creation")
    }

    /// Backups of one OLT, newest first
    pub async fn list_by_olt(pool: &Pool<Sqlite>, olt_id: i64) -> Result<Vec<OltBackup>> {
        let rows = sqlx::query(&format!("{} WHERE olt_id = ? ORDER BY created_at DESC, id DESC", SELECT_BACKUP))
            .bind(olt_id)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_olt_backup_row).collect())
    }

    /// A backup only when it belongs to the given OLT
    pub async fn get_for_olt(pool: &Pool<Sqlite>, olt_id: i64, backup_id: i64) -> Result<Option<OltBackup>> {
        let row = sqlx::query(&format!("{} WHERE id = ? AND olt_id = ?", SELECT_BACKUP))
            .bind(backup_id)
            .bind(olt_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_olt_backup_row))
    }
}
