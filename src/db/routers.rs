use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::{map_nas_row, map_router_row};

const SELECT_ROUTER: &str = r#"
    SELECT id, nas_id, name, ip_address, api_port, username, password, radius_secret,
           status, api_status, last_checked_at, last_error, response_time_ms,
           provisioned_at, created_at, updated_at
    FROM mikrotik_routers
"#;

/// MikroTik router database operations
pub struct RouterRepo;

impl RouterRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<MikrotikRouter>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_ROUTER))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_router_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<MikrotikRouter>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ROUTER))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_router_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateRouterRequest) -> Result<MikrotikRouter> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO mikrotik_routers (nas_id, name, ip_address, api_port, username, password,
                                          radius_secret, status, api_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'active', 'unknown', ?, ?)
            "#,
        )
        .bind(req.nas_id)
        .bind(&req.name)
        .bind(&req.ip_address)
        .bind(req.api_port.unwrap_or(80) as i64)
        .bind(&req.username)
        .bind(&req.password)
        .bind(req.radius_secret.clone().unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Router not found after creation")
    }

    /// Record the outcome of an API reachability check
    pub async fn update_api_status(
        pool: &Pool<Sqlite>,
        id: i64,
        api_status: &str,
        last_error: Option<&str>,
        response_time_ms: Option<i64>,
    ) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE mikrotik_routers
            SET api_status = ?, last_checked_at = ?, last_error = ?,
                response_time_ms = COALESCE(?, response_time_ms), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(api_status)
        .bind(now)
        .bind(last_error.unwrap_or_default())
        .bind(response_time_ms)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Router", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn set_nas(pool: &Pool<Sqlite>, id: i64, nas_id: i64) -> Result<()> {
        sqlx::query("UPDATE mikrotik_routers SET nas_id = ?, updated_at = ? WHERE id = ?")
            .bind(nas_id)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_provisioned(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE mikrotik_routers SET provisioned_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Router", &id.to_string()).into());
        }
        Ok(())
    }
}

const SELECT_NAS: &str = r#"
    SELECT id, nasname, shortname, secret, server, description, created_at, updated_at
    FROM nas
"#;

/// RADIUS NAS table operations
pub struct NasRepo;

impl NasRepo {
    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Nas>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_NAS))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_nas_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateNasRequest) -> Result<Nas> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO nas (nasname, shortname, secret, server, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.nasname)
        .bind(&req.shortname)
        .bind(&req.secret)
        .bind(&req.server)
        .bind(req.description.clone().unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("NAS not found after creation")
    }

    pub async fn update_nasname(pool: &Pool<Sqlite>, id: i64, nasname: &str) -> Result<()> {
        let result = sqlx::query("UPDATE nas SET nasname = ?, updated_at = ? WHERE id = ?")
            .bind(nasname)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("NAS", &id.to_string()).into());
        }
        Ok(())
    }
}
