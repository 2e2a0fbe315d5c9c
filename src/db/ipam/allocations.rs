use std::collections::HashSet;
use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

use crate::db::row_helpers::{map_ip_allocation_row, map_ip_history_row};
use crate::models::*;
use crate::utils;

const SELECT_ALLOCATION: &str = r#"
    SELECT id, subnet_id, ip_address, mac_address, username, status, allocated_at, released_at
    FROM ip_allocations
"#;

/// IP allocation and allocation-history database operations
pub struct IpAllocationRepo;

impl IpAllocationRepo {
    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<IpAllocation>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ALLOCATION))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_ip_allocation_row))
    }

    pub async fn find_active_by_mac(
        pool: &Pool<Sqlite>,
        subnet_id: i64,
        mac: &str,
    ) -> Result<Option<IpAllocation>> {
        let row = sqlx::query(&format!(
            "{} WHERE subnet_id = ? AND mac_address = ? AND status = ? ORDER BY id DESC LIMIT 1",
            SELECT_ALLOCATION
        ))
        .bind(subnet_id)
        .bind(mac)
        .bind(allocation_status::ALLOCATED)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_ip_allocation_row))
    }

    /// Addresses with an active allocation in the subnet
    pub async fn list_active_addresses(pool: &Pool<Sqlite>, subnet_id: i64) -> Result<HashSet<Ipv4Addr>> {
        let rows = sqlx::query("SELECT ip_address FROM ip_allocations WHERE subnet_id = ? AND status = ?")
            .bind(subnet_id)
            .bind(allocation_status::ALLOCATED)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|r| r.get::<String, _>("ip_address").parse().ok())
            .collect())
    }

    pub async fn count_active_in_pool(pool: &Pool<Sqlite>, pool_id: i64) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM ip_allocations a
            JOIN ip_subnets s ON s.id = a.subnet_id
            WHERE s.pool_id = ? AND a.status = ?
            "#,
        )
        .bind(pool_id)
        .bind(allocation_status::ALLOCATED)
        .fetch_one(pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    /// Pick the lowest free usable address of the subnet and lease it.
    ///
    /// Scan, allocation insert and history insert share one transaction. The
    /// transaction opens with a write on the subnet row so SQLite takes the
    /// write lock before the scan, serializing allocators across connections.
    /// Returns None when the subnet has no free address.
    pub async fn allocate_first_free(
        pool: &Pool<Sqlite>,
        subnet: &IpSubnet,
        mac: &str,
        username: &str,
    ) -> Result<Option<IpAllocation>> {
        let net = utils::parse_cidr(&subnet.cidr()).map_err(|e| anyhow::anyhow!(e))?;
        let now = Utc::now();

        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE ip_subnets SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(subnet.id)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query("SELECT ip_address FROM ip_allocations WHERE subnet_id = ? AND status = ?")
            .bind(subnet.id)
            .bind(allocation_status::ALLOCATED)
            .fetch_all(&mut *tx)
            .await?;
        let taken: HashSet<Ipv4Addr> = rows
            .iter()
            .filter_map(|r| r.get::<String, _>("ip_address").parse().ok())
            .collect();

        let Some(address) = utils::usable_hosts(net).find(|ip| !taken.contains(ip)) else {
            tx.rollback().await?;
            return Ok(None);
        };
        let address = address.to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO ip_allocations (subnet_id, ip_address, mac_address, username, status, allocated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subnet.id)
        .bind(&address)
        .bind(mac)
        .bind(username)
        .bind(allocation_status::ALLOCATED)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let allocation_id = result.last_insert_rowid();

        insert_history(&mut tx, allocation_id, &address, mac, username, allocation_action::ALLOCATED, now).await?;
        tx.commit().await?;

        Self::get(pool, allocation_id)
            .await?
            .context("IP allocation not found after creation")
            .map(Some)
    }

    /// Mark an allocation released and append a history entry
    pub async fn release(pool: &Pool<Sqlite>, id: i64) -> Result<ReleaseOutcome> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ALLOCATION))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(allocation) = row.as_ref().map(map_ip_allocation_row) else {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::NotFound);
        };

        let result = sqlx::query(
            "UPDATE ip_allocations SET status = ?, released_at = ? WHERE id = ? AND status = ?",
        )
        .bind(allocation_status::RELEASED)
        .bind(now)
        .bind(id)
        .bind(allocation_status::ALLOCATED)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::AlreadyReleased);
        }

        insert_history(
            &mut tx,
            id,
            &allocation.ip_address,
            &allocation.mac_address,
            &allocation.username,
            allocation_action::RELEASED,
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(ReleaseOutcome::Released)
    }

    /// History of one allocation, oldest first
    pub async fn history(pool: &Pool<Sqlite>, allocation_id: i64) -> Result<Vec<IpAllocationHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, allocation_id, ip_address, mac_address, username, action, created_at
            FROM ip_allocation_history
            WHERE allocation_id = ?
            ORDER BY id
            "#,
        )
        .bind(allocation_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_ip_history_row).collect())
    }
}

async fn insert_history(
    conn: &mut SqliteConnection,
    allocation_id: i64,
    ip_address: &str,
    mac: &str,
    username: &str,
    action: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ip_allocation_history (allocation_id, ip_address, mac_address, username, action, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(allocation_id)
    .bind(ip_address)
    .bind(mac)
    .bind(username)
    .bind(action)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(())
}
