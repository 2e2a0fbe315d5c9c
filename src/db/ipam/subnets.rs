use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::db::row_helpers::map_ip_subnet_row;
use crate::models::*;
use crate::utils;

const SELECT_SUBNET: &str = r#"
    SELECT id, pool_id, network, prefix_length, gateway, vlan_id, status, created_at, updated_at
    FROM ip_subnets
"#;

/// IP subnet database operations
pub struct IpSubnetRepo;

impl IpSubnetRepo {
    pub async fn list_by_pool(pool: &Pool<Sqlite>, pool_id: i64) -> Result<Vec<IpSubnet>> {
        let rows = sqlx::query(&format!("{} WHERE pool_id = ? ORDER BY id", SELECT_SUBNET))
            .bind(pool_id)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_ip_subnet_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<IpSubnet>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SUBNET))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_ip_subnet_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateIpSubnetRequest) -> Result<IpSubnet> {
        let net = utils::parse_cidr(&req.cidr).map_err(|e| anyhow::anyhow!(e))?;
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO ip_subnets (pool_id, network, prefix_length, gateway, vlan_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.pool_id)
        .bind(net.network().to_string())
        .bind(net.prefix() as i64)
        .bind(req.gateway.clone().unwrap_or_default())
        .bind(req.vlan_id)
        .bind(req.status.as_deref().unwrap_or(ip_status::ACTIVE))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("IP subnet not found after creation")
    }

    pub async fn update_status(pool: &Pool<Sqlite>, id: i64, status: &str) -> Result<()> {
        let result = sqlx::query("UPDATE ip_subnets SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(crate::db::NotFoundError::new("IP subnet", &id.to_string()).into());
        }
        Ok(())
    }
}
