use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use crate::models::*;

use super::row_helpers::map_onu_row;

const SELECT_ONU: &str = r#"
    SELECT id, olt_id, pon_port, onu_id, serial_number, name, status, is_authorized,
           signal_rx, signal_tx, distance, last_seen_at, last_sync_at, created_at, updated_at
    FROM onus
"#;

/// ONU database operations
pub struct OnuRepo;

impl OnuRepo {
    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Onu>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ONU))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_onu_row))
    }

    pub async fn list_by_olt(pool: &Pool<Sqlite>, olt_id: i64) -> Result<Vec<Onu>> {
        let rows = sqlx::query(&format!("{} WHERE olt_id = ? ORDER BY pon_port, onu_id", SELECT_ONU))
            .bind(olt_id)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_onu_row).collect())
    }

    /// Insert or update by (olt_id, pon_port, onu_id). Signal values are only
    /// overwritten when the record carries them.
    pub async fn upsert(pool: &Pool<Sqlite>, olt_id: i64, record: &OnuRecord) -> Result<()> {
        let now = Utc::now();
        let seen = (record.status == onu_status::ONLINE).then_some(now);
        sqlx::query(
            r#"
            INSERT INTO onus (olt_id, pon_port, onu_id, serial_number, status, signal_rx, signal_tx,
                              distance, last_seen_at, last_sync_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(olt_id, pon_port, onu_id) DO UPDATE SET
                serial_number = excluded.serial_number,
                status = excluded.status,
                signal_rx = COALESCE(excluded.signal_rx, onus.signal_rx),
                signal_tx = COALESCE(excluded.signal_tx, onus.signal_tx),
                distance = COALESCE(excluded.distance, onus.distance),
                last_seen_at = COALESCE(excluded.last_seen_at, onus.last_seen_at),
                last_sync_at = excluded.last_sync_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(olt_id)
        .bind(&record.pon_port)
        .bind(record.onu_id)
        .bind(&record.serial_number)
        .bind(&record.status)
        .bind(record.signal_rx)
        .bind(record.signal_tx)
        .bind(record.distance)
        .bind(seen)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_live_status(pool: &Pool<Sqlite>, id: i64, status: &OnuStatus) -> Result<()> {
        let now = Utc::now();
        let state = status.status.as_deref().unwrap_or(onu_status::OFFLINE);
        let seen = (state == onu_status::ONLINE).then_some(now);
        sqlx::query(
            r#"
            UPDATE onus SET status = ?,
                            signal_rx = COALESCE(?, signal_rx),
                            signal_tx = COALESCE(?, signal_tx),
                            distance = COALESCE(?, distance),
                            last_seen_at = COALESCE(?, last_seen_at),
                            updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(state)
        .bind(status.signal_rx)
        .bind(status.signal_tx)
        .bind(status.distance)
        .bind(seen)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_authorized(pool: &Pool<Sqlite>, id: i64, authorized: bool) -> Result<()> {
        sqlx::query("UPDATE onus SET is_authorized = ?, updated_at = ? WHERE id = ?")
            .bind(authorized as i32)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// (total, online) counts for an OLT
    pub async fn count_by_olt(pool: &Pool<Sqlite>, olt_id: i64) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN status = 'online' THEN 1 ELSE 0 END), 0) AS online
            FROM onus WHERE olt_id = ?
            "#,
        )
        .bind(olt_id)
        .fetch_one(pool)
        .await?;

        Ok((row.get("total"), row.get("online")))
    }
}
