//! OLT management over SSH and SNMP.
//!
//! Every public operation loads the OLT, talks to the device through the
//! [`DeviceTransport`] and folds device failures into its return value.
//! Storage failures are logged and treated the same way.

mod readings;
pub mod vendor;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::backup::BackupArchive;
use crate::db::Store;
use crate::models::*;
use crate::parser::{self, parse_onu_list_output};
use crate::services::monitoring;
use crate::transport::{DeviceEndpoint, DeviceTransport, SnmpValue, TransportError};
use crate::utils;

pub use readings::{parse_onu_detail, parse_system_status, parse_uptime_text, SystemReadings};
use vendor::{profile_for, CommandSet, OnuContext, SnmpProfile, VendorProfile};

/// ONUs one GPON port can serve
pub const PON_PORT_CAPACITY: i64 = 128;

const SYS_UPTIME_OID: &str = "1.3.6.1.2.1.1.3.0";

pub struct OltService {
    store: Store,
    transport: Arc<dyn DeviceTransport>,
    archive: BackupArchive,
    default_community: String,
}

impl OltService {
    pub fn new(
        store: Store,
        transport: Arc<dyn DeviceTransport>,
        archive: BackupArchive,
        default_community: &str,
    ) -> Self {
        Self {
            store,
            transport,
            archive,
            default_community: default_community.to_string(),
        }
    }

    async fn load_olt(&self, olt_id: i64) -> Option<Olt> {
        match self.store.get_olt(olt_id).await {
            Ok(olt) => olt,
            Err(e) => {
                tracing::error!("Failed to load OLT {}: {}", olt_id, e);
                None
            }
        }
    }

    /// ONU with its parent OLT
    async fn load_onu(&self, onu_id: i64) -> Option<(Onu, Olt)> {
        let onu = match self.store.get_onu(onu_id).await {
            Ok(Some(onu)) => onu,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Failed to load ONU {}: {}", onu_id, e);
                return None;
            }
        };
        let olt = self.load_olt(onu.olt_id).await?;
        Some((onu, olt))
    }

    fn endpoint(&self, olt: &Olt) -> DeviceEndpoint {
        DeviceEndpoint::from_olt(olt, &self.default_community)
    }

    async fn exec(&self, olt: &Olt, command: &str) -> Result<String, TransportError> {
        tracing::debug!("{} ({}): {}", olt.name, olt.ip_address, command);
        self.transport.exec(&self.endpoint(olt), command).await
    }

    // ========== Connectivity ==========

    /// Probe the OLT over its management protocol and record its health.
    /// Never fails; latency is measured even for failures.
    pub async fn test_connection(&self, olt_id: i64) -> ConnectionTestResult {
        let started = Instant::now();
        let Some(olt) = self.load_olt(olt_id).await else {
            return ConnectionTestResult {
                success: false,
                message: "OLT not found".to_string(),
                latency_ms: started.elapsed().as_millis() as u64,
            };
        };

        let (success, message) = if olt.uses_snmp() {
            match self.transport.snmp_get(&self.endpoint(&olt), vendor::SYS_DESCR_OID).await {
                Ok(Some(_)) => (true, "SNMP OK".to_string()),
                Ok(None) => (false, "SNMP request failed".to_string()),
                Err(e) => (false, format!("SNMP error: {}", e)),
            }
        } else {
            let profile = profile_for(&olt.brand);
            match self.exec(&olt, profile.commands.version).await {
                Ok(output) if !output.trim().is_empty() => (true, "SSH OK".to_string()),
                Ok(_) => (false, "Command execution failed".to_string()),
                Err(e) if e.is_auth() => (false, "Authentication failed".to_string()),
                Err(TransportError::Connect(reason)) => (false, format!("Connection failed: {}", reason)),
                Err(e) => (false, format!("Connection failed: {}", e)),
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let health = if success { health_status::HEALTHY } else { health_status::UNHEALTHY };
        if let Err(e) = self.store.update_olt_health(olt.id, health).await {
            tracing::error!("Failed to record health for OLT {}: {}", olt.id, e);
        }

        if success {
            tracing::info!("OLT {} reachable ({} ms)", olt.name, latency_ms);
        } else {
            tracing::warn!("OLT {} connection test failed: {}", olt.name, message);
        }

        ConnectionTestResult {
            success,
            message,
            latency_ms,
        }
    }

    /// Open a cached SSH session for a batch of operations
    pub async fn connect(&self, olt_id: i64) -> bool {
        let Some(olt) = self.load_olt(olt_id).await else {
            return false;
        };
        match self.transport.open_session(&self.endpoint(&olt)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to open session to OLT {}: {}", olt.name, e);
                false
            }
        }
    }

    pub async fn disconnect(&self, olt_id: i64) -> bool {
        let Some(olt) = self.load_olt(olt_id).await else {
            return false;
        };
        self.transport.close_session(&self.endpoint(&olt)).await
    }

    // ========== ONU Discovery ==========

    /// ONUs currently reported by the device. Empty when it is unreachable.
    pub async fn discover_onus(&self, olt_id: i64) -> Vec<OnuRecord> {
        let Some(olt) = self.load_olt(olt_id).await else {
            return Vec::new();
        };
        let profile = profile_for(&olt.brand);

        let result = if olt.uses_snmp() {
            self.discover_via_snmp(&olt, profile).await
        } else {
            self.exec(&olt, profile.commands.show_onus)
                .await
                .map(|raw| parse_onu_list_output(&raw, &olt.brand))
        };

        match result {
            Ok(records) => {
                tracing::info!("Discovered {} ONUs on OLT {}", records.len(), olt.name);
                records
            }
            Err(e) => {
                tracing::warn!("ONU discovery failed for OLT {}: {}", olt.name, e);
                Vec::new()
            }
        }
    }

    /// Walk the serial tables in order, falling back to the next tree when
    /// one yields nothing, then join the status and optics columns.
    async fn discover_via_snmp(&self, olt: &Olt, profile: &VendorProfile) -> Result<Vec<OnuRecord>, TransportError> {
        let ep = self.endpoint(olt);
        let snmp = &profile.snmp;

        let mut serials = BTreeMap::new();
        for root in snmp.onu_list {
            serials = self.walk_column(&ep, root).await?;
            if !serials.is_empty() {
                break;
            }
            tracing::debug!("No ONUs under {} on {}, trying next tree", root, olt.name);
        }
        if serials.is_empty() {
            return Ok(Vec::new());
        }

        let statuses = self.optional_column(&ep, Some(snmp.onu_status)).await;
        let rx = self.optional_column(&ep, snmp.rx_power).await;
        let tx = self.optional_column(&ep, snmp.tx_power).await;
        let distance = self.optional_column(&ep, snmp.distance).await;

        let records = serials
            .iter()
            .filter_map(|(index, value)| {
                let (pon_port, onu_id) = parser::parse_snmp_index(index)?;
                let status = snmp_status(snmp, statuses.get(index));
                let mut record = OnuRecord::new(&pon_port, onu_id, &value.as_text(), status);
                record.signal_rx = rx.get(index).and_then(SnmpValue::as_i64).map(parser::scale_signal);
                record.signal_tx = tx.get(index).and_then(SnmpValue::as_i64).map(parser::scale_signal);
                record.distance = distance.get(index).and_then(SnmpValue::as_i64);
                Some(record)
            })
            .collect();
        Ok(records)
    }

    /// Walk one column, keyed by the index suffix below the root
    async fn walk_column(
        &self,
        ep: &DeviceEndpoint,
        root: &str,
    ) -> Result<BTreeMap<String, SnmpValue>, TransportError> {
        let prefix = format!("{}.", root.trim_start_matches('.'));
        let entries = self.transport.snmp_walk(ep, root).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(oid, value)| {
                let suffix = oid.trim_start_matches('.').strip_prefix(&prefix)?.to_string();
                Some((suffix, value))
            })
            .collect())
    }

    async fn optional_column(&self, ep: &DeviceEndpoint, root: Option<&str>) -> BTreeMap<String, SnmpValue> {
        let Some(root) = root.filter(|r| !r.is_empty()) else {
            return BTreeMap::new();
        };
        match self.walk_column(ep, root).await {
            Ok(column) => column,
            Err(e) => {
                tracing::warn!("SNMP walk of {} on {} failed: {}", root, ep.host, e);
                BTreeMap::new()
            }
        }
    }

    /// Discover and upsert by (pon_port, onu_id). Returns records processed.
    pub async fn sync_onus(&self, olt_id: i64) -> usize {
        let records = self.discover_onus(olt_id).await;
        let mut synced = 0;
        for record in &records {
            match self.store.upsert_onu(olt_id, record).await {
                Ok(()) => synced += 1,
                Err(e) => tracing::error!(
                    "Failed to store ONU {}:{} for OLT {}: {}",
                    record.pon_port,
                    record.onu_id,
                    olt_id,
                    e
                ),
            }
        }
        if synced > 0 {
            tracing::info!("Synced {} ONUs for OLT {}", synced, olt_id);
        }
        synced
    }

    /// Sync every active OLT; one failing OLT does not stop the others
    pub async fn sync_all_onus(&self) -> usize {
        let olts = match self.store.list_olts().await {
            Ok(olts) => olts,
            Err(e) => {
                tracing::error!("Failed to list OLTs: {}", e);
                return 0;
            }
        };
        let mut total = 0;
        for olt in olts.iter().filter(|o| o.status == "active") {
            total += self.sync_onus(olt.id).await;
        }
        total
    }

    // ========== ONU Operations ==========

    /// Live ONU status. When the device cannot be polled, the stored optics
    /// are returned with an unknown status.
    pub async fn get_onu_status(&self, onu_id: i64) -> OnuStatus {
        let Some((onu, olt)) = self.load_onu(onu_id).await else {
            return OnuStatus::default();
        };
        match self.poll_onu(&olt, &onu).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to poll ONU {} on {}: {}", onu.serial_number, olt.name, e);
                OnuStatus {
                    status: None,
                    signal_rx: onu.signal_rx,
                    signal_tx: onu.signal_tx,
                    distance: onu.distance,
                    uptime: None,
                    last_update: onu.last_seen_at,
                }
            }
        }
    }

    async fn poll_onu(&self, olt: &Olt, onu: &Onu) -> Result<OnuStatus, TransportError> {
        let profile = profile_for(&olt.brand);
        let mut status = if olt.uses_snmp() {
            self.poll_onu_snmp(olt, onu, &profile.snmp).await?
        } else {
            let command = render_onu_command(profile.commands.onu_detail, onu)?;
            let output = self.exec(olt, &command).await?;
            parse_onu_detail(&output)
        };
        status.last_update = Some(Utc::now());
        Ok(status)
    }

    async fn poll_onu_snmp(&self, olt: &Olt, onu: &Onu, snmp: &SnmpProfile) -> Result<OnuStatus, TransportError> {
        if snmp.onu_status.is_empty() {
            return Err(TransportError::Snmp(format!("no ONU status OID for brand {}", olt.brand)));
        }
        let ep = self.endpoint(olt);
        let index = vendor::onu_index(&onu.pon_port, onu.onu_id);
        let get = |root: &str| format!("{}.{}", root, index);

        let state = self.transport.snmp_get(&ep, &get(snmp.onu_status)).await?;
        let mut status = OnuStatus {
            status: Some(snmp_status(snmp, state.as_ref()).to_string()),
            ..Default::default()
        };
        if let Some(root) = snmp.rx_power {
            status.signal_rx = self.snmp_i64(&ep, &get(root)).await.map(parser::scale_signal);
        }
        if let Some(root) = snmp.tx_power {
            status.signal_tx = self.snmp_i64(&ep, &get(root)).await.map(parser::scale_signal);
        }
        if let Some(root) = snmp.distance {
            status.distance = self.snmp_i64(&ep, &get(root)).await;
        }
        Ok(status)
    }

    async fn snmp_i64(&self, ep: &DeviceEndpoint, oid: &str) -> Option<i64> {
        match self.transport.snmp_get(ep, oid).await {
            Ok(value) => value.as_ref().and_then(SnmpValue::as_i64),
            Err(e) => {
                tracing::debug!("SNMP GET {} on {} failed: {}", oid, ep.host, e);
                None
            }
        }
    }

    /// Poll the ONU and store its status, signal and distance
    pub async fn refresh_onu_status(&self, onu_id: i64) -> bool {
        let Some((onu, olt)) = self.load_onu(onu_id).await else {
            return false;
        };
        let status = match self.poll_onu(&olt, &onu).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to refresh ONU {}: {}", onu.serial_number, e);
                return false;
            }
        };
        match self.store.update_onu_live_status(onu.id, &status).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to store status for ONU {}: {}", onu.id, e);
                false
            }
        }
    }

    pub async fn authorize_onu(&self, onu_id: i64) -> bool {
        let Some(onu) = self.run_onu_command(onu_id, "authorize", |c| c.authorize).await else {
            return false;
        };
        self.mark_authorized(&onu, true).await
    }

    pub async fn unauthorize_onu(&self, onu_id: i64) -> bool {
        let Some(onu) = self.run_onu_command(onu_id, "unauthorize", |c| c.unauthorize).await else {
            return false;
        };
        self.mark_authorized(&onu, false).await
    }

    pub async fn reboot_onu(&self, onu_id: i64) -> bool {
        self.run_onu_command(onu_id, "reboot", |c| c.reboot).await.is_some()
    }

    async fn mark_authorized(&self, onu: &Onu, authorized: bool) -> bool {
        match self.store.set_onu_authorized(onu.id, authorized).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to update authorization of ONU {}: {}", onu.id, e);
                false
            }
        }
    }

    /// Render and run one ONU-scoped vendor command. Some(onu) on success.
    async fn run_onu_command(
        &self,
        onu_id: i64,
        action: &str,
        pick: fn(&CommandSet) -> &'static str,
    ) -> Option<Onu> {
        let (onu, olt) = self.load_onu(onu_id).await?;
        let template = pick(&profile_for(&olt.brand).commands);

        let result = match render_onu_command(template, &onu) {
            Ok(command) => self.exec(&olt, &command).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) if looks_rejected(&output) => {
                tracing::warn!("OLT {} rejected {} for ONU {}: {}", olt.name, action, onu.serial_number, output.trim());
                None
            }
            Ok(_) => {
                tracing::info!("{} ONU {} on {}", action, onu.serial_number, olt.name);
                Some(onu)
            }
            Err(e) => {
                tracing::warn!("Failed to {} ONU {} on {}: {}", action, onu.serial_number, olt.name, e);
                None
            }
        }
    }

    // ========== Configuration ==========

    pub async fn create_backup(&self, olt_id: i64) -> bool {
        self.create_backup_with_type(olt_id, backup_type::MANUAL).await
    }

    /// Snapshot the running configuration to the archive and record it
    pub async fn create_backup_with_type(&self, olt_id: i64, kind: &str) -> bool {
        let Some(olt) = self.load_olt(olt_id).await else {
            return false;
        };
        let profile = profile_for(&olt.brand);

        let config = match self.exec(&olt, profile.commands.running_config).await {
            Ok(config) if !config.trim().is_empty() => config,
            Ok(_) => {
                tracing::warn!("OLT {} returned an empty configuration", olt.name);
                return false;
            }
            Err(e) => {
                tracing::warn!("Backup of OLT {} failed: {}", olt.name, e);
                return false;
            }
        };

        let saved = match self.archive.save(&olt.name, &config).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("Failed to write backup for OLT {}: {:#}", olt.name, e);
                return false;
            }
        };

        let recorded = async {
            self.store
                .create_olt_backup(olt.id, &saved.file_path, saved.file_size, kind)
                .await?;
            self.store.update_olt_backup_time(olt.id).await
        };
        match recorded.await {
            Ok(()) => {
                tracing::info!("Backup completed for {} ({} bytes)", olt.name, saved.file_size);
                true
            }
            Err(e) => {
                tracing::error!("Failed to record backup for OLT {}: {}", olt.name, e);
                false
            }
        }
    }

    /// Scheduled backup of every active OLT. Returns the number that succeeded.
    pub async fn backup_all_olts(&self) -> usize {
        let olts = match self.store.list_olts().await {
            Ok(olts) => olts,
            Err(e) => {
                tracing::error!("Failed to list OLTs: {}", e);
                return 0;
            }
        };
        let mut done = 0;
        for olt in olts.iter().filter(|o| o.status == "active") {
            if self.create_backup_with_type(olt.id, backup_type::SCHEDULED).await {
                done += 1;
            }
        }
        done
    }

    /// Newest first, with a file existence check per entry
    pub async fn get_backup_list(&self, olt_id: i64) -> Vec<OltBackupEntry> {
        let backups = match self.store.list_olt_backups(olt_id).await {
            Ok(backups) => backups,
            Err(e) => {
                tracing::error!("Failed to list backups for OLT {}: {}", olt_id, e);
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(backups.len());
        for backup in backups {
            let exists = self.archive.exists(&backup.file_path).await;
            entries.push(OltBackupEntry {
                size_human: utils::format_bytes(backup.file_size),
                exists,
                backup,
            });
        }
        entries
    }

    /// Backup file contents. None when the row does not belong to this OLT
    /// or the file is gone.
    pub async fn export_backup(&self, olt_id: i64, backup_id: i64) -> Option<Vec<u8>> {
        let backup = match self.store.get_olt_backup(olt_id, backup_id).await {
            Ok(Some(backup)) => backup,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Failed to load backup {} of OLT {}: {}", backup_id, olt_id, e);
                return None;
            }
        };
        match self.archive.read(&backup.file_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read backup {}: {:#}", backup.file_path, e);
                None
            }
        }
    }

    /// Push CLI lines in order, stopping at the first failure.
    ///
    /// Every line runs on its own exec channel, so CLI mode does not carry
    /// over between lines. Each line must be a complete command; a batch with
    /// mode changes such as `configure terminal` or `interface gpon 0/1` is
    /// refused before anything is sent.
    pub async fn apply_configuration(&self, olt_id: i64, lines: &[String]) -> bool {
        let Some(olt) = self.load_olt(olt_id).await else {
            return false;
        };
        if let Some(line) = lines.iter().map(|l| l.trim()).find(|l| changes_cli_mode(l)) {
            tracing::warn!(
                "Refusing configuration for OLT {}: '{}' changes CLI mode and would not persist to the next line",
                olt.name,
                line
            );
            return false;
        }

        for (n, line) in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).enumerate() {
            match self.exec(&olt, line).await {
                Ok(output) if looks_rejected(&output) => {
                    tracing::warn!("OLT {} rejected line {} '{}': {}", olt.name, n + 1, line, output.trim());
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to apply line {} to OLT {}: {}", n + 1, olt.name, e);
                    return false;
                }
            }
        }
        tracing::info!("Applied {} configuration lines to {}", lines.len(), olt.name);
        true
    }

    // ========== Statistics ==========

    /// ONU counts from stored rows, system readings from a live poll
    pub async fn get_olt_statistics(&self, olt_id: i64) -> OltStatistics {
        let Some(olt) = self.load_olt(olt_id).await else {
            return OltStatistics::default();
        };

        let (total, online) = match self.store.count_onus(olt.id).await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::error!("Failed to count ONUs for OLT {}: {}", olt.id, e);
                (0, 0)
            }
        };
        let mut stats = OltStatistics {
            total_onus: total,
            online_onus: online,
            offline_onus: total - online,
            ..Default::default()
        };

        if olt.uses_snmp() {
            match self.transport.snmp_get(&self.endpoint(&olt), SYS_UPTIME_OID).await {
                Ok(value) => {
                    stats.reachable = true;
                    if let Some(SnmpValue::Timeticks(ticks)) = value {
                        stats.uptime = Some(readings::format_ticks(ticks));
                        stats.uptime_seconds = Some(ticks as i64 / 100);
                    }
                }
                Err(e) => tracing::warn!("Failed to poll OLT {}: {}", olt.name, e),
            }
        } else {
            let profile = profile_for(&olt.brand);
            match self.exec(&olt, profile.commands.system_status).await {
                Ok(output) => {
                    let readings = parse_system_status(&output);
                    stats.reachable = true;
                    stats.cpu_usage = readings.cpu_usage.unwrap_or(0.0);
                    stats.memory_usage = readings.memory_usage.unwrap_or(0.0);
                    stats.temperature = readings.temperature.unwrap_or(0.0);
                    stats.uptime_seconds = readings.uptime.as_deref().and_then(parse_uptime_text);
                    stats.uptime = readings.uptime;
                }
                Err(e) => tracing::warn!("Failed to poll OLT {}: {}", olt.name, e),
            }
        }
        stats
    }

    /// Per-port ONU occupancy from stored rows
    pub async fn get_port_utilization(&self, olt_id: i64) -> Vec<PortUsage> {
        let onus = match self.store.list_onus(olt_id).await {
            Ok(onus) => onus,
            Err(e) => {
                tracing::error!("Failed to list ONUs for OLT {}: {}", olt_id, e);
                return Vec::new();
            }
        };

        let mut ports: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
        for onu in &onus {
            let entry = ports.entry(onu.pon_port.as_str()).or_default();
            entry.0 += 1;
            if onu.status == onu_status::ONLINE {
                entry.1 += 1;
            }
        }

        ports
            .into_iter()
            .map(|(port, (total, online))| PortUsage {
                pon_port: port.to_string(),
                total_onus: total,
                online_onus: online,
                offline_onus: total - online,
                utilization_percent: utils::round_to(online as f64 / PON_PORT_CAPACITY as f64 * 100.0, 2),
            })
            .collect()
    }

    /// OLT traffic for a reporting period. Unknown periods give an empty list.
    pub async fn get_bandwidth_usage(&self, olt_id: i64, period: &str) -> Vec<BandwidthSample> {
        let Some((source, window)) = monitoring::period_window(period) else {
            return Vec::new();
        };
        let now = Utc::now();
        match self
            .store
            .list_bandwidth(DeviceRef::Olt(olt_id), source, now - window, now)
            .await
        {
            Ok(rows) => monitoring::report_series(&rows, period),
            Err(e) => {
                tracing::error!("Failed to read bandwidth for OLT {}: {}", olt_id, e);
                Vec::new()
            }
        }
    }
}

fn render_onu_command(template: &str, onu: &Onu) -> Result<String, TransportError> {
    let ctx = OnuContext {
        pon_port: &onu.pon_port,
        onu_id: onu.onu_id,
        serial_number: &onu.serial_number,
    };
    vendor::render(template, &ctx).map_err(|e| TransportError::Command(format!("template error: {}", e)))
}

fn snmp_status(profile: &SnmpProfile, value: Option<&SnmpValue>) -> &'static str {
    match value.and_then(SnmpValue::as_i64) {
        Some(v) if v == profile.online_value => onu_status::ONLINE,
        _ => onu_status::OFFLINE,
    }
}

/// Vendor CLIs report most errors in-band with exit status 0
/// Lines that only switch CLI context and have no effect on their own
fn changes_cli_mode(line: &str) -> bool {
    let first = line.split_whitespace().next().map(|w| w.to_ascii_lowercase());
    matches!(
        first.as_deref(),
        Some("configure" | "config" | "conf" | "interface" | "exit" | "end" | "quit")
    )
}

fn looks_rejected(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    ["% invalid", "% unknown command", "error:", "failure:", "% incomplete command"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::services::testing::FakeTransport;

    struct Harness {
        service: OltService,
        transport: Arc<FakeTransport>,
        store: Store,
        _db: tempfile::TempDir,
        _backups: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let (store, db) = temp_store().await;
        let backups = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let service = OltService::new(
            store.clone(),
            transport.clone(),
            BackupArchive::new(backups.path().to_str().unwrap()),
            "public",
        );
        Harness {
            service,
            transport,
            store,
            _db: db,
            _backups: backups,
        }
    }

    async fn add_olt(store: &Store, name: &str, brand: &str, protocol: &str) -> Olt {
        store
            .create_olt(&CreateOltRequest {
                name: name.to_string(),
                ip_address: "10.0.0.2".to_string(),
                port: None,
                management_protocol: Some(protocol.to_string()),
                username: Some("admin".to_string()),
                password: Some("admin".to_string()),
                snmp_community: None,
                snmp_version: None,
                snmp_port: None,
                brand: brand.to_string(),
                model: None,
            })
            .await
            .unwrap()
    }

    async fn add_onu(store: &Store, olt_id: i64, port: &str, id: i64, status: &str) -> Onu {
        let mut record = OnuRecord::new(port, id, &format!("SN{:08}", id), status);
        record.signal_rx = Some(-20.5);
        store.upsert_onu(olt_id, &record).await.unwrap();
        store
            .list_onus(olt_id)
            .await
            .unwrap()
            .into_iter()
            .find(|o| o.pon_port == port && o.onu_id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_connection_ssh_ok() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        h.transport.reply("show version", "V1600G1 Version 2.1\n");

        let result = h.service.test_connection(olt.id).await;
        assert!(result.success);
        assert_eq!(result.message, "SSH OK");

        let stored = h.store.get_olt(olt.id).await.unwrap().unwrap();
        assert_eq!(stored.health_status, health_status::HEALTHY);
        assert!(stored.last_health_check_at.is_some());
    }

    #[tokio::test]
    async fn test_connection_ssh_failures() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;

        let result = h.service.test_connection(olt.id).await;
        assert!(!result.success);
        assert_eq!(result.message, "Command execution failed");

        h.transport.reject_auth("show version");
        let result = h.service.test_connection(olt.id).await;
        assert_eq!(result.message, "Authentication failed");

        h.transport.refuse("show version");
        let result = h.service.test_connection(olt.id).await;
        assert!(result.message.starts_with("Connection failed: "));

        let stored = h.store.get_olt(olt.id).await.unwrap().unwrap();
        assert_eq!(stored.health_status, health_status::UNHEALTHY);
    }

    #[tokio::test]
    async fn test_connection_unknown_olt() {
        let h = harness().await;
        let result = h.service.test_connection(404).await;
        assert!(!result.success);
        assert_eq!(result.message, "OLT not found");
    }

    #[tokio::test]
    async fn test_connection_snmp() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-s", "Huawei", "snmp").await;

        let result = h.service.test_connection(olt.id).await;
        assert_eq!(result.message, "SNMP request failed");

        h.transport
            .set_get(vendor::SYS_DESCR_OID, SnmpValue::Bytes(b"Huawei MA5608T".to_vec()));
        let result = h.service.test_connection(olt.id).await;
        assert!(result.success);
        assert_eq!(result.message, "SNMP OK");

        h.transport.go_offline();
        let result = h.service.test_connection(olt.id).await;
        assert!(result.message.starts_with("SNMP error: "));
    }

    #[tokio::test]
    async fn test_sync_onus_over_ssh_is_idempotent() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        h.transport.reply(
            "show onu info",
            "OnuIndex       Sn              State\n\
             gpon-onu_1/1:1  VSOL00000001   online\n\
             gpon-onu_1/1:2  VSOL00000002   offline\n",
        );

        assert_eq!(h.service.sync_onus(olt.id).await, 2);
        assert_eq!(h.service.sync_onus(olt.id).await, 2);

        let onus = h.store.list_onus(olt.id).await.unwrap();
        assert_eq!(onus.len(), 2);
        assert_eq!(onus[0].serial_number, "VSOL00000001");
        assert_eq!(onus[0].status, onu_status::ONLINE);
        assert!(onus[0].last_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_discover_unreachable_is_empty() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        h.transport.go_offline();
        assert!(h.service.discover_onus(olt.id).await.is_empty());
        assert!(h.service.discover_onus(999).await.is_empty());
    }

    #[tokio::test]
    async fn test_discover_over_snmp_falls_back_to_vendor_tree() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-s", "VSOL", "snmp").await;
        let base = "1.3.6.1.4.1.37950.1.1.5.12.1.25.1";
        h.transport.set_walk(
            &format!("{}.3", base),
            vec![
                (format!("{}.3.1.5", base), SnmpValue::Bytes(b"VSOL0000AA05".to_vec())),
                (format!("{}.3.2.1", base), SnmpValue::Bytes(b"VSOL0000BB01".to_vec())),
            ],
        );
        h.transport.set_walk(
            &format!("{}.4", base),
            vec![
                (format!("{}.4.1.5", base), SnmpValue::Integer(1)),
                (format!("{}.4.2.1", base), SnmpValue::Integer(2)),
            ],
        );
        h.transport.set_walk(
            &format!("{}.5", base),
            vec![(format!("{}.5.1.5", base), SnmpValue::Integer(-2150))],
        );

        let records = h.service.discover_onus(olt.id).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pon_port, "1");
        assert_eq!(records[0].onu_id, 5);
        assert_eq!(records[0].serial_number, "VSOL0000AA05");
        assert_eq!(records[0].status, onu_status::ONLINE);
        assert_eq!(records[0].signal_rx, Some(-21.5));
        assert_eq!(records[1].status, onu_status::OFFLINE);
        assert_eq!(records[1].signal_rx, None);
    }

    #[tokio::test]
    async fn test_get_onu_status_over_ssh() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-h", "Huawei", "ssh").await;
        let onu = add_onu(&h.store, olt.id, "0/1/0", 3, onu_status::OFFLINE).await;
        h.transport.reply(
            "display ont info 0/1/0 3",
            "Run state : online\nRx optical power(dBm) : -19.80\nONT distance(m) : 950\n",
        );

        let status = h.service.get_onu_status(onu.id).await;
        assert_eq!(status.status.as_deref(), Some("online"));
        assert_eq!(status.signal_rx, Some(-19.8));
        assert_eq!(status.distance, Some(950));
        assert!(status.last_update.is_some());

        assert!(h.service.refresh_onu_status(onu.id).await);
        let stored = h.store.get_onu(onu.id).await.unwrap().unwrap();
        assert_eq!(stored.status, onu_status::ONLINE);
        assert_eq!(stored.distance, Some(950));
    }

    #[tokio::test]
    async fn test_get_onu_status_falls_back_to_stored_values() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-h", "Huawei", "ssh").await;
        let onu = add_onu(&h.store, olt.id, "0/1/0", 3, onu_status::ONLINE).await;
        h.transport.go_offline();

        let status = h.service.get_onu_status(onu.id).await;
        assert_eq!(status.status, None);
        assert_eq!(status.signal_rx, Some(-20.5));
        assert!(!h.service.refresh_onu_status(onu.id).await);

        assert_eq!(h.service.get_onu_status(12345).await, OnuStatus::default());
    }

    #[tokio::test]
    async fn test_get_onu_status_over_snmp() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-z", "ZTE", "snmp").await;
        let onu = add_onu(&h.store, olt.id, "268501248", 4, onu_status::OFFLINE).await;
        h.transport
            .set_get("1.3.6.1.4.1.3902.1012.3.28.2.1.5.268501248.4", SnmpValue::Integer(3));
        h.transport
            .set_get("1.3.6.1.4.1.3902.1012.3.50.12.1.1.10.268501248.4", SnmpValue::Integer(-1875));

        let status = h.service.get_onu_status(onu.id).await;
        assert_eq!(status.status.as_deref(), Some("online"));
        assert_eq!(status.signal_rx, Some(-18.75));
        assert_eq!(status.signal_tx, None);
    }

    #[tokio::test]
    async fn test_authorize_and_reboot() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-z", "ZTE", "ssh").await;
        let onu = add_onu(&h.store, olt.id, "1/2", 7, onu_status::ONLINE).await;

        assert!(h.service.authorize_onu(onu.id).await);
        assert!(h.store.get_onu(onu.id).await.unwrap().unwrap().is_authorized);

        assert!(h.service.reboot_onu(onu.id).await);
        assert!(h.service.unauthorize_onu(onu.id).await);
        assert!(!h.store.get_onu(onu.id).await.unwrap().unwrap().is_authorized);

        assert_eq!(
            h.transport.sent(),
            vec![
                "onu 7 type default sn SN00000007 interface gpon-olt_1/2".to_string(),
                "pon-onu-mng gpon-onu_1/2:7 reboot".to_string(),
                "no onu 7 interface gpon-olt_1/2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_command_fails() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-z", "ZTE", "ssh").await;
        let onu = add_onu(&h.store, olt.id, "1/2", 7, onu_status::ONLINE).await;
        h.transport
            .reply("pon-onu-mng gpon-onu_1/2:7 reboot", "%Error 20200: Invalid parameter\n% Invalid input");

        assert!(!h.service.reboot_onu(onu.id).await);
        assert!(!h.service.authorize_onu(999).await);
    }

    #[tokio::test]
    async fn test_backup_list_and_export() {
        let h = harness().await;
        let olt = add_olt(&h.store, "OLT Main", "VSOL", "ssh").await;
        let config = "hostname olt-main\ninterface gpon 1/1\n";
        h.transport.reply("show running-config", config);

        assert!(h.service.create_backup(olt.id).await);

        let list = h.service.get_backup_list(olt.id).await;
        assert_eq!(list.len(), 1);
        assert!(list[0].exists);
        assert_eq!(list[0].backup.backup_type, backup_type::MANUAL);
        assert_eq!(list[0].backup.file_size, config.len() as i64);
        assert!(list[0].backup.file_path.contains("OLT_Main_"));

        let exported = h.service.export_backup(olt.id, list[0].backup.id).await;
        assert_eq!(exported.as_deref(), Some(config.as_bytes()));
        assert!(h.service.export_backup(olt.id + 1, list[0].backup.id).await.is_none());

        let stored = h.store.get_olt(olt.id).await.unwrap().unwrap();
        assert!(stored.last_backup_at.is_some());

        std::fs::remove_file(&list[0].backup.file_path).unwrap();
        assert!(!h.service.get_backup_list(olt.id).await[0].exists);
        assert!(h.service.export_backup(olt.id, list[0].backup.id).await.is_none());
    }

    #[tokio::test]
    async fn test_backup_with_empty_config_fails() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        assert!(!h.service.create_backup(olt.id).await);
        assert!(h.service.get_backup_list(olt.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_backup_all_olts() {
        let h = harness().await;
        add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        add_olt(&h.store, "olt-b", "VSOL", "ssh").await;
        h.transport.reply("show running-config", "hostname x\n");

        assert_eq!(h.service.backup_all_olts().await, 2);
    }

    #[tokio::test]
    async fn test_apply_configuration_stops_on_failure() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        h.transport.refuse("vlan 200");

        let lines: Vec<String> = ["vlan 100", "  ", "vlan 200", "vlan 300"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(!h.service.apply_configuration(olt.id, &lines).await);
        assert_eq!(h.transport.sent(), vec!["vlan 100".to_string(), "vlan 200".to_string()]);

        let ok = vec!["vlan 100".to_string(), "".to_string()];
        assert!(h.service.apply_configuration(olt.id, &ok).await);
    }

    #[tokio::test]
    async fn test_apply_configuration_refuses_mode_changes() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "Huawei", "ssh").await;

        let lines: Vec<String> = ["configure terminal", "interface gpon 0/1", "ont add 1 sn-auth HWTC12345678"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(!h.service.apply_configuration(olt.id, &lines).await);
        assert!(h.transport.sent().is_empty());

        // self-contained lines each go out as their own command
        let lines = vec!["vlan 100".to_string(), "vlan 200".to_string()];
        assert!(h.service.apply_configuration(olt.id, &lines).await);
        assert_eq!(h.transport.sent(), lines);
    }

    #[test]
    fn test_changes_cli_mode() {
        assert!(changes_cli_mode("configure terminal"));
        assert!(changes_cli_mode("Interface gpon 0/1"));
        assert!(changes_cli_mode("exit"));
        assert!(!changes_cli_mode("vlan 100"));
        assert!(!changes_cli_mode("onu reboot gpon-onu_1/1:1"));
        assert!(!changes_cli_mode(""));
    }

    #[tokio::test]
    async fn test_statistics_over_ssh() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        add_onu(&h.store, olt.id, "1/1", 1, onu_status::ONLINE).await;
        add_onu(&h.store, olt.id, "1/1", 2, onu_status::OFFLINE).await;
        h.transport.reply(
            "show system",
            "Uptime: 2 days, 01:00:30\nCPU usage: 12%\nMemory usage: 48.2%\nTemperature: 51 C\n",
        );

        let stats = h.service.get_olt_statistics(olt.id).await;
        assert!(stats.reachable);
        assert_eq!(stats.total_onus, 2);
        assert_eq!(stats.online_onus, 1);
        assert_eq!(stats.offline_onus, 1);
        assert_eq!(stats.cpu_usage, 12.0);
        assert_eq!(stats.memory_usage, 48.2);
        assert_eq!(stats.temperature, 51.0);
        assert_eq!(stats.uptime_seconds, Some(2 * 86_400 + 3_630));
    }

    #[tokio::test]
    async fn test_statistics_unreachable_keeps_counts() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-s", "Huawei", "snmp").await;
        add_onu(&h.store, olt.id, "0/1/0", 1, onu_status::ONLINE).await;

        h.transport.set_get(SYS_UPTIME_OID, SnmpValue::Timeticks(8_640_000));
        let stats = h.service.get_olt_statistics(olt.id).await;
        assert!(stats.reachable);
        assert_eq!(stats.uptime.as_deref(), Some("1 days, 00:00:00"));
        assert_eq!(stats.uptime_seconds, Some(86_400));

        h.transport.go_offline();
        let stats = h.service.get_olt_statistics(olt.id).await;
        assert!(!stats.reachable);
        assert_eq!(stats.total_onus, 1);
        assert_eq!(stats.online_onus, 1);
    }

    #[tokio::test]
    async fn test_port_utilization() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        add_onu(&h.store, olt.id, "1/1", 1, onu_status::ONLINE).await;
        add_onu(&h.store, olt.id, "1/1", 2, onu_status::ONLINE).await;
        add_onu(&h.store, olt.id, "1/1", 3, onu_status::OFFLINE).await;
        add_onu(&h.store, olt.id, "1/2", 1, onu_status::ONLINE).await;

        let ports = h.service.get_port_utilization(olt.id).await;
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].pon_port, "1/1");
        assert_eq!(ports[0].total_onus, 3);
        assert_eq!(ports[0].online_onus, 2);
        assert_eq!(ports[0].offline_onus, 1);
        assert_eq!(ports[0].utilization_percent, 1.56);
        assert_eq!(ports[1].utilization_percent, 0.78);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;

        assert!(h.service.connect(olt.id).await);
        assert!(h.service.disconnect(olt.id).await);
        assert!(!h.service.disconnect(olt.id).await);
        assert!(!h.service.connect(999).await);
    }

    #[tokio::test]
    async fn test_bandwidth_usage_period() {
        let h = harness().await;
        let olt = add_olt(&h.store, "olt-a", "VSOL", "ssh").await;
        assert!(h.service.get_bandwidth_usage(olt.id, "yearly").await.is_empty());
        assert!(h.service.get_bandwidth_usage(olt.id, "hourly").await.is_empty());
    }
}
