use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_monitor_row;

const SELECT_MONITOR: &str = r#"
    SELECT id, monitorable_type, monitorable_id, status, cpu_usage, memory_usage, uptime, last_check_at
    FROM device_monitors
"#;

/// Latest-snapshot health rows, one per device
pub struct DeviceMonitorRepo;

impl DeviceMonitorRepo {
    pub async fn get(pool: &Pool<Sqlite>, device: DeviceRef) -> Result<Option<DeviceMonitor>> {
        let row = sqlx::query(&format!(
            "{} WHERE monitorable_type = ? AND monitorable_id = ?",
            SELECT_MONITOR
        ))
        .bind(device.kind())
        .bind(device.id())
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_monitor_row))
    }

    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<DeviceMonitor>> {
        let rows = sqlx::query(&format!("{} ORDER BY monitorable_type, monitorable_id", SELECT_MONITOR))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_monitor_row).collect())
    }

    /// Overwrite the device's snapshot
    pub async fn upsert(pool: &Pool<Sqlite>, device: DeviceRef, metrics: &DeviceMetrics) -> Result<DeviceMonitor> {
        sqlx::query(
            r#"
            INSERT INTO device_monitors (monitorable_type, monitorable_id, status, cpu_usage,
                                         memory_usage, uptime, last_check_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(monitorable_type, monitorable_id) DO UPDATE SET
                status = excluded.status,
                cpu_usage = excluded.cpu_usage,
                memory_usage = excluded.memory_usage,
                uptime = excluded.uptime,
                last_check_at = excluded.last_check_at
            "#,
        )
        .bind(device.kind())
        .bind(device.id())
        .bind(&metrics.status)
        .bind(metrics.cpu_usage)
        .bind(metrics.memory_usage)
        .bind(metrics.uptime)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Self::get(pool, device)
            .await?
            .context("Device monitor not found after upsert")
    }
}
