use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, Transaction};

use crate::models::*;

use super::row_helpers::map_bandwidth_row;

const SELECT_BANDWIDTH: &str = r#"
    SELECT id, monitorable_type, monitorable_id, timestamp, upload_bytes, download_bytes,
           total_bytes, period_type, aggregated_at
    FROM bandwidth_usages
"#;

/// Bandwidth samples and rollup buckets
pub struct BandwidthRepo;

impl BandwidthRepo {
    pub async fn insert_raw(
        pool: &Pool<Sqlite>,
        device: DeviceRef,
        upload_bytes: i64,
        download_bytes: i64,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO bandwidth_usages (monitorable_type, monitorable_id, timestamp, upload_bytes,
                                          download_bytes, total_bytes, period_type)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(device.kind())
        .bind(device.id())
        .bind(at)
        .bind(upload_bytes)
        .bind(download_bytes)
        .bind(upload_bytes + download_bytes)
        .bind(period_type::RAW)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Rows of one period type within [from, to], oldest first
    pub async fn list_range(
        pool: &Pool<Sqlite>,
        device: DeviceRef,
        period: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BandwidthUsage>> {
        let rows = sqlx::query(&format!(
            r#"{} WHERE monitorable_type = ? AND monitorable_id = ? AND period_type = ?
                 AND timestamp >= ? AND timestamp <= ?
               ORDER BY timestamp, id"#,
            SELECT_BANDWIDTH
        ))
        .bind(device.kind())
        .bind(device.id())
        .bind(period)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_bandwidth_row).collect())
    }

    /// Roll unconsumed `source` rows older than `cutoff` into `target` buckets of
    /// `bucket_secs` seconds. Target rows are upserted additively and consumed
    /// source rows are stamped with `aggregated_at`, all in one transaction.
    ///
    /// `parents` lists the levels above `target`, nearest first. When a target
    /// row was already rolled into its parent, the late delta is added to the
    /// parent bucket too, and so on up the chain.
    /// Returns the number of target buckets written.
    pub async fn rollup(
        pool: &Pool<Sqlite>,
        source: &str,
        target: &str,
        cutoff: DateTime<Utc>,
        bucket_secs: i64,
        parents: &[(&str, i64)],
    ) -> Result<usize> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        // Take the write lock before reading so concurrent rollups serialize
        sqlx::query("UPDATE bandwidth_usages SET aggregated_at = aggregated_at WHERE 0")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(&format!(
            "{} WHERE period_type = ? AND aggregated_at IS NULL AND timestamp < ? ORDER BY id",
            SELECT_BANDWIDTH
        ))
        .bind(source)
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }

        let mut buckets: BTreeMap<(&'static str, i64, DateTime<Utc>), (i64, i64, i64)> = BTreeMap::new();
        let mut consumed = Vec::with_capacity(rows.len());
        for sample in rows.iter().map(map_bandwidth_row) {
            let key = (sample.device.kind(), sample.device.id(), bucket_start(sample.timestamp, bucket_secs));
            let entry = buckets.entry(key).or_insert((0, 0, 0));
            entry.0 += sample.upload_bytes;
            entry.1 += sample.download_bytes;
            entry.2 += sample.total_bytes;
            consumed.push(sample.id);
        }

        for ((kind, id, ts), totals) in &buckets {
            let mut consumed_at = upsert_bucket(&mut tx, kind, *id, *ts, target, *totals).await?;
            for (parent, parent_secs) in parents {
                if consumed_at.is_none() {
                    break;
                }
                let parent_ts = bucket_start(*ts, *parent_secs);
                tracing::debug!("Carrying late {} delta for {} {} into {} bucket {}", target, kind, id, parent, parent_ts);
                consumed_at = upsert_bucket(&mut tx, kind, *id, parent_ts, parent, *totals).await?;
            }
        }

        for chunk in consumed.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE bandwidth_usages SET aggregated_at = ? WHERE id IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql).bind(now);
            for id in chunk {
                query = query.bind(*id);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(buckets.len())
    }

    /// Delete consumed raw/hourly rows older than `before`
    pub async fn prune_consumed(pool: &Pool<Sqlite>, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM bandwidth_usages
            WHERE aggregated_at IS NOT NULL
              AND period_type IN ('raw', 'hourly')
              AND timestamp < ?
            "#,
        )
        .bind(before)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Add totals to one bucket row, creating it if needed. Returns the row's
/// `aggregated_at`, which is None for a new or not yet consumed row.
async fn upsert_bucket(
    tx: &mut Transaction<'_, Sqlite>,
    kind: &str,
    id: i64,
    ts: DateTime<Utc>,
    period: &str,
    (upload, download, total): (i64, i64, i64),
) -> Result<Option<DateTime<Utc>>> {
    let consumed_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        INSERT INTO bandwidth_usages (monitorable_type, monitorable_id, timestamp, upload_bytes,
                                      download_bytes, total_bytes, period_type)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(monitorable_type, monitorable_id, period_type, timestamp)
        WHERE period_type <> 'raw'
        DO UPDATE SET
            upload_bytes = upload_bytes + excluded.upload_bytes,
            download_bytes = download_bytes + excluded.download_bytes,
            total_bytes = total_bytes + excluded.total_bytes
        RETURNING aggregated_at
        "#,
    )
    .bind(kind)
    .bind(id)
    .bind(ts)
    .bind(upload)
    .bind(download)
    .bind(total)
    .bind(period)
    .fetch_one(&mut **tx)
    .await?;

    Ok(consumed_at)
}

/// Start of the UTC bucket containing `ts`
pub fn bucket_start(ts: DateTime<Utc>, bucket_secs: i64) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(bucket_secs), 0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_start() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 14, 37, 12).unwrap();
        assert_eq!(bucket_start(ts, 3600), Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap());
        assert_eq!(bucket_start(ts, 86_400), Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
    }
}
