use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_pppoe_user_row;

const SELECT_PPPOE_USER: &str = r#"
    SELECT id, router_id, username, password, service, profile, local_address, remote_address,
           status, created_at, updated_at
    FROM mikrotik_pppoe_users
"#;

/// Local mirror of router PPPoE secrets
pub struct PppoeUserRepo;

impl PppoeUserRepo {
    pub async fn list_by_router(pool: &Pool<Sqlite>, router_id: i64) -> Result<Vec<MikrotikPppoeUser>> {
        let rows = sqlx::query(&format!("{} WHERE router_id = ? ORDER BY username", SELECT_PPPOE_USER))
            .bind(router_id)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_pppoe_user_row).collect())
    }

    pub async fn get_by_router(
        pool: &Pool<Sqlite>,
        router_id: i64,
        username: &str,
    ) -> Result<Option<MikrotikPppoeUser>> {
        let row = sqlx::query(&format!("{} WHERE router_id = ? AND username = ?", SELECT_PPPOE_USER))
            .bind(router_id)
            .bind(username)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_pppoe_user_row))
    }

    /// Most recently touched mirror row for a username, across routers
    pub async fn find_latest(pool: &Pool<Sqlite>, username: &str) -> Result<Option<MikrotikPppoeUser>> {
        let row = sqlx::query(&format!(
            "{} WHERE username = ? ORDER BY updated_at DESC, id DESC LIMIT 1",
            SELECT_PPPOE_USER
        ))
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_pppoe_user_row))
    }

    /// Create or refresh the mirror row; status becomes synced
    pub async fn upsert(pool: &Pool<Sqlite>, req: &CreatePppoeUserRequest) -> Result<MikrotikPppoeUser> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO mikrotik_pppoe_users (router_id, username, password, service, profile,
                                              local_address, remote_address, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(router_id, username) DO UPDATE SET
                password = excluded.password,
                service = excluded.service,
                profile = excluded.profile,
                local_address = excluded.local_address,
                remote_address = excluded.remote_address,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(req.router_id)
        .bind(&req.username)
        .bind(&req.password)
        .bind(&req.service)
        .bind(&req.profile)
        .bind(req.local_address.clone().unwrap_or_default())
        .bind(req.remote_address.clone().unwrap_or_default())
        .bind(pppoe_status::SYNCED)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get_by_router(pool, req.router_id, &req.username)
            .await?
            .context("PPPoE user not found after upsert")
    }

    /// Apply a partial update; None fields keep their stored value.
    /// An inactive row stays inactive; only a new upsert brings it back.
    pub async fn apply_changes(pool: &Pool<Sqlite>, id: i64, changes: &UpdatePppoeUserRequest) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE mikrotik_pppoe_users
            SET password = COALESCE(?, password),
                service = COALESCE(?, service),
                profile = COALESCE(?, profile),
                local_address = COALESCE(?, local_address),
                remote_address = COALESCE(?, remote_address),
                status = CASE WHEN status = ? THEN status ELSE ? END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&changes.password)
        .bind(&changes.service)
        .bind(&changes.profile)
        .bind(&changes.local_address)
        .bind(&changes.remote_address)
        .bind(pppoe_status::INACTIVE)
        .bind(pppoe_status::SYNCED)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("PPPoE user", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn set_status(pool: &Pool<Sqlite>, id: i64, status: &str) -> Result<()> {
        sqlx::query("UPDATE mikrotik_pppoe_users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
