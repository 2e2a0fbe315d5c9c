//! Device health polling, bandwidth samples and their rollups.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};

use crate::db::{bucket_start, Store};
use crate::mikrotik::{row_f64, row_str};
use crate::models::*;
use crate::services::mikrotik::MikrotikService;
use crate::services::olt::OltService;
use crate::utils;

const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 86_400;

/// Stored period and look-back window for a reporting period.
/// Weekly and monthly reports are built from daily rows.
pub fn period_window(period: &str) -> Option<(&'static str, Duration)> {
    match period {
        period_type::HOURLY => Some((period_type::HOURLY, Duration::days(1))),
        period_type::DAILY => Some((period_type::DAILY, Duration::days(30))),
        period_type::WEEKLY => Some((period_type::DAILY, Duration::days(90))),
        period_type::MONTHLY => Some((period_type::DAILY, Duration::days(365))),
        _ => None,
    }
}

/// Start of the reporting bucket containing `ts`
fn report_bucket(ts: DateTime<Utc>, period: &str) -> DateTime<Utc> {
    let date = ts.date_naive();
    let start = match period {
        period_type::WEEKLY => {
            Some(date - Duration::days(date.weekday().num_days_from_monday() as i64))
        }
        period_type::MONTHLY => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
        _ => return ts,
    };
    start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(ts)
}

/// Rows folded into the reporting buckets of `period`, oldest first
pub fn report_series(rows: &[BandwidthUsage], period: &str) -> Vec<BandwidthSample> {
    let mut buckets: BTreeMap<DateTime<Utc>, BandwidthSample> = BTreeMap::new();
    for row in rows {
        let key = report_bucket(row.timestamp, period);
        let entry = buckets.entry(key).or_insert_with(|| BandwidthSample {
            timestamp: key,
            upload_bytes: 0,
            download_bytes: 0,
            total_bytes: 0,
        });
        entry.upload_bytes += row.upload_bytes;
        entry.download_bytes += row.download_bytes;
        entry.total_bytes += row.total_bytes;
    }
    buckets.into_values().collect()
}

fn graph_label(ts: DateTime<Utc>, period: &str) -> String {
    match period {
        period_type::HOURLY => ts.format("%b %d, %H:%M").to_string(),
        period_type::WEEKLY => ts.format("%b %d (W%V)").to_string(),
        period_type::MONTHLY => ts.format("%b %Y").to_string(),
        _ => ts.format("%b %d").to_string(),
    }
}

fn summarize(samples: &[BandwidthSample]) -> BandwidthSummary {
    let total_upload: i64 = samples.iter().map(|s| s.upload_bytes).sum();
    let total_download: i64 = samples.iter().map(|s| s.download_bytes).sum();
    let n = samples.len();
    let average = |sum: i64| if n == 0 { 0.0 } else { utils::round_to(sum as f64 / n as f64, 2) };
    BandwidthSummary {
        total_upload,
        total_download,
        total_bytes: samples.iter().map(|s| s.total_bytes).sum(),
        average_upload: average(total_upload),
        average_download: average(total_download),
        samples: n,
    }
}

/// Router metrics from a `/system/resource` row
fn router_metrics(row: &crate::mikrotik::RouterRow) -> DeviceMetrics {
    let memory_usage = match (row_f64(row, "free-memory"), row_f64(row, "total-memory")) {
        (Some(free), Some(total)) if total > 0.0 => Some(utils::round_to((1.0 - free / total) * 100.0, 2)),
        _ => None,
    };
    DeviceMetrics {
        status: monitor_status::ONLINE.to_string(),
        cpu_usage: row_f64(row, "cpu-load"),
        memory_usage,
        uptime: row_str(row, "uptime").and_then(utils::parse_mikrotik_uptime),
    }
}

fn olt_metrics(stats: &OltStatistics) -> DeviceMetrics {
    if !stats.reachable {
        return DeviceMetrics::offline();
    }
    let status = if stats.total_onus > 0 && stats.online_onus == 0 {
        monitor_status::DEGRADED
    } else {
        monitor_status::ONLINE
    };
    DeviceMetrics {
        status: status.to_string(),
        cpu_usage: Some(stats.cpu_usage),
        memory_usage: Some(stats.memory_usage),
        uptime: stats.uptime_seconds,
    }
}

fn onu_metrics(status: &OnuStatus) -> DeviceMetrics {
    match status.status.as_deref() {
        Some(onu_status::ONLINE) => DeviceMetrics {
            status: monitor_status::ONLINE.to_string(),
            ..Default::default()
        },
        _ => DeviceMetrics::offline(),
    }
}

/// Outcome of one device check
struct CheckOutcome {
    metrics: DeviceMetrics,
    recorded: bool,
}

pub struct MonitoringService {
    store: Store,
    mikrotik: Arc<MikrotikService>,
    olt: Arc<OltService>,
    concurrency: usize,
}

impl MonitoringService {
    pub fn new(store: Store, mikrotik: Arc<MikrotikService>, olt: Arc<OltService>, concurrency: usize) -> Self {
        Self {
            store,
            mikrotik,
            olt,
            concurrency: concurrency.max(1),
        }
    }

    async fn device_exists(&self, device: DeviceRef) -> Result<bool> {
        Ok(match device {
            DeviceRef::Router(id) => self.store.get_router(id).await?.is_some(),
            DeviceRef::Olt(id) => self.store.get_olt(id).await?.is_some(),
            DeviceRef::Onu(id) => self.store.get_onu(id).await?.is_some(),
        })
    }

    // ========== Health ==========

    /// Poll a device and overwrite its monitor row. Device failures are
    /// recorded as offline; unknown devices are reported offline and not stored.
    pub async fn monitor_device(&self, device: DeviceRef) -> DeviceMetrics {
        self.check_device(device).await.metrics
    }

    async fn check_device(&self, device: DeviceRef) -> CheckOutcome {
        match self.device_exists(device).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Cannot monitor {}: no such device", device);
                return CheckOutcome {
                    metrics: DeviceMetrics::offline(),
                    recorded: false,
                };
            }
            Err(e) => {
                tracing::error!("Failed to load {}: {}", device, e);
                return CheckOutcome {
                    metrics: DeviceMetrics::offline(),
                    recorded: false,
                };
            }
        }

        let metrics = match device {
            DeviceRef::Router(id) => {
                let row = self.mikrotik.get_resources(id).await;
                if row.is_empty() {
                    DeviceMetrics::offline()
                } else {
                    router_metrics(&row)
                }
            }
            DeviceRef::Olt(id) => olt_metrics(&self.olt.get_olt_statistics(id).await),
            DeviceRef::Onu(id) => onu_metrics(&self.olt.get_onu_status(id).await),
        };

        let recorded = match self.store.upsert_device_monitor(device, &metrics).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to record monitor status for {}: {}", device, e);
                false
            }
        };
        tracing::debug!("{} is {}", device, metrics.status);
        CheckOutcome { metrics, recorded }
    }

    /// Check every router and OLT with bounded parallelism
    pub async fn monitor_all_devices(&self) -> Result<MonitorRunSummary> {
        let mut devices: Vec<DeviceRef> = self
            .store
            .list_routers()
            .await?
            .iter()
            .map(|r| DeviceRef::Router(r.id))
            .collect();
        devices.extend(self.store.list_olts().await?.iter().map(|o| DeviceRef::Olt(o.id)));

        let outcomes: Vec<CheckOutcome> = stream::iter(devices)
            .map(|device| self.check_device(device))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = MonitorRunSummary {
            checked: outcomes.len(),
            ..Default::default()
        };
        for outcome in &outcomes {
            if outcome.metrics.status == monitor_status::OFFLINE {
                summary.offline += 1;
            } else {
                summary.online += 1;
            }
            if !outcome.recorded {
                summary.failed += 1;
            }
        }
        tracing::info!(
            "Monitoring run: {} checked, {} online, {} offline",
            summary.checked,
            summary.online,
            summary.offline
        );
        Ok(summary)
    }

    /// Last recorded snapshot; None when the device was never checked
    pub async fn get_device_status(&self, device: DeviceRef) -> Result<Option<DeviceMonitor>> {
        self.store.get_device_monitor(device).await
    }

    pub async fn get_all_device_statuses(&self) -> Result<DashboardStatus> {
        let monitors: HashMap<DeviceRef, DeviceMonitor> = self
            .store
            .list_device_monitors()
            .await?
            .into_iter()
            .map(|m| (m.device, m))
            .collect();

        let entry = |device: DeviceRef, name: &str| match monitors.get(&device) {
            Some(m) => DeviceStatusEntry {
                id: device.id(),
                name: name.to_string(),
                status: m.status.clone(),
                cpu_usage: m.cpu_usage,
                memory_usage: m.memory_usage,
                uptime: m.uptime,
                last_check_at: Some(m.last_check_at),
            },
            None => DeviceStatusEntry {
                id: device.id(),
                name: name.to_string(),
                status: monitor_status::UNKNOWN.to_string(),
                cpu_usage: None,
                memory_usage: None,
                uptime: None,
                last_check_at: None,
            },
        };

        let routers: Vec<DeviceStatusEntry> = self
            .store
            .list_routers()
            .await?
            .iter()
            .map(|r| entry(DeviceRef::Router(r.id), &r.name))
            .collect();
        let olts: Vec<DeviceStatusEntry> = self
            .store
            .list_olts()
            .await?
            .iter()
            .map(|o| entry(DeviceRef::Olt(o.id), &o.name))
            .collect();

        let mut summary = StatusSummary::default();
        for e in routers.iter().chain(olts.iter()) {
            summary.total += 1;
            match e.status.as_str() {
                monitor_status::ONLINE => summary.online += 1,
                monitor_status::OFFLINE => summary.offline += 1,
                monitor_status::DEGRADED => summary.degraded += 1,
                _ => summary.unknown += 1,
            }
        }

        Ok(DashboardStatus { routers, olts, summary })
    }

    // ========== Bandwidth ==========

    /// Store one raw sample stamped now. False for unknown devices.
    pub async fn record_bandwidth_usage(&self, device: DeviceRef, upload_bytes: i64, download_bytes: i64) -> bool {
        match self.device_exists(device).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Bandwidth sample for unknown device {}", device);
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to load {}: {}", device, e);
                return false;
            }
        }
        match self
            .store
            .insert_bandwidth_sample(device, upload_bytes, download_bytes, Utc::now())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to store bandwidth sample for {}: {}", device, e);
                false
            }
        }
    }

    /// Rows of one period type within a range. Defaults to the last 7 days.
    pub async fn get_bandwidth_usage(
        &self,
        device: DeviceRef,
        period: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<BandwidthReport> {
        let to = to.unwrap_or_else(Utc::now);
        let from = from.unwrap_or(to - Duration::days(7));

        let rows = self.store.list_bandwidth(device, period, from, to).await?;
        let data: Vec<BandwidthSample> = rows.iter().map(BandwidthSample::from).collect();
        let summary = summarize(&data);

        Ok(BandwidthReport {
            device_type: device.kind().to_string(),
            device_id: device.id(),
            period_type: period.to_string(),
            data,
            summary,
        })
    }

    /// Upload, download and total series in MB over the period's window
    pub async fn get_bandwidth_graph(&self, device: DeviceRef, period: &str) -> Result<BandwidthGraph> {
        let Some((source, window)) = period_window(period) else {
            anyhow::bail!("Unknown period type: {}", period);
        };
        let now = Utc::now();
        let rows = self.store.list_bandwidth(device, source, now - window, now).await?;
        let series = report_series(&rows, period);

        let dataset = |label: &str, pick: fn(&BandwidthSample) -> i64| GraphDataset {
            label: label.to_string(),
            data: series.iter().map(|s| utils::bytes_to_mb(pick(s))).collect(),
        };

        Ok(BandwidthGraph {
            labels: series.iter().map(|s| graph_label(s.timestamp, period)).collect(),
            datasets: vec![
                dataset("Upload (MB)", |s| s.upload_bytes),
                dataset("Download (MB)", |s| s.download_bytes),
                dataset("Total (MB)", |s| s.total_bytes),
            ],
        })
    }

    // ========== Rollups ==========

    /// Roll completed hours of raw samples into hourly rows
    pub async fn aggregate_hourly_data(&self) -> Result<usize> {
        let cutoff = bucket_start(Utc::now(), HOUR_SECS);
        let written = self
            .store
            .rollup_bandwidth(
                period_type::RAW,
                period_type::HOURLY,
                cutoff,
                HOUR_SECS,
                &[(period_type::DAILY, DAY_SECS)],
            )
            .await?;
        tracing::info!("Hourly aggregation wrote {} buckets", written);
        Ok(written)
    }

    /// Roll completed UTC days of hourly rows into daily rows
    pub async fn aggregate_daily_data(&self) -> Result<usize> {
        let cutoff = bucket_start(Utc::now(), DAY_SECS);
        let written = self
            .store
            .rollup_bandwidth(period_type::HOURLY, period_type::DAILY, cutoff, DAY_SECS, &[])
            .await?;
        tracing::info!("Daily aggregation wrote {} buckets", written);
        Ok(written)
    }

    /// Delete raw and hourly rows already rolled up and older than the retention window
    pub async fn prune_bandwidth_samples(&self, retention_days: i64) -> Result<u64> {
        let before = Utc::now() - Duration::days(retention_days.max(0));
        let deleted = self.store.prune_bandwidth(before).await?;
        tracing::info!("Pruned {} consumed bandwidth rows older than {}", deleted, before);
        Ok(deleted)
    }
}
