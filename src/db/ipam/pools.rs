use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::db::row_helpers::map_ip_pool_row;
use crate::models::*;

const SELECT_POOL: &str = r#"
    SELECT id, name, description, start_ip, end_ip, gateway, status, created_at, updated_at
    FROM ip_pools
"#;

/// IP pool database operations
pub struct IpPoolRepo;

impl IpPoolRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<IpPool>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_POOL))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_ip_pool_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<IpPool>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_POOL))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_ip_pool_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateIpPoolRequest) -> Result<IpPool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO ip_pools (name, description, start_ip, end_ip, gateway, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.description.clone().unwrap_or_default())
        .bind(&req.start_ip)
        .bind(&req.end_ip)
        .bind(req.gateway.clone().unwrap_or_default())
        .bind(req.status.as_deref().unwrap_or(ip_status::ACTIVE))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("IP pool not found after creation")
    }

    pub async fn update_status(pool: &Pool<Sqlite>, id: i64, status: &str) -> Result<()> {
        let result = sqlx::query("UPDATE ip_pools SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(crate::db::NotFoundError::new("IP pool", &id.to_string()).into());
        }
        Ok(())
    }
}
