use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Filter empty strings to None; the DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

fn device_ref(row: &SqliteRow) -> DeviceRef {
    let kind: String = row.get("monitorable_type");
    let id: i64 = row.get("monitorable_id");
    // Unknown kinds cannot be written through DeviceRef; fall back to router for legacy rows
    DeviceRef::from_parts(&kind, id).unwrap_or(DeviceRef::Router(id))
}

/// Map a SQLite row to an IpPool struct
pub fn map_ip_pool_row(row: &SqliteRow) -> IpPool {
    IpPool {
        id: row.get("id"),
        name: row.get("name"),
        description: none_if_empty(row.get("description")),
        start_ip: row.get("start_ip"),
        end_ip: row.get("end_ip"),
        gateway: none_if_empty(row.get("gateway")),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an IpSubnet struct
pub fn map_ip_subnet_row(row: &SqliteRow) -> IpSubnet {
    let prefix: i64 = row.get("prefix_length");
    IpSubnet {
        id: row.get("id"),
        pool_id: row.get("pool_id"),
        network: row.get("network"),
        prefix_length: prefix.clamp(0, 32) as u8,
        gateway: none_if_empty(row.get("gateway")),
        vlan_id: row.try_get::<Option<i64>, _>("vlan_id").ok().flatten(),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_ip_allocation_row(row: &SqliteRow) -> IpAllocation {
    IpAllocation {
        id: row.get("id"),
        subnet_id: row.get("subnet_id"),
        ip_address: row.get("ip_address"),
        mac_address: row.get("mac_address"),
        username: row.get("username"),
        status: row.get("status"),
        allocated_at: row.get("allocated_at"),
        released_at: row.get("released_at"),
    }
}

pub fn map_ip_history_row(row: &SqliteRow) -> IpAllocationHistory {
    IpAllocationHistory {
        id: row.get("id"),
        allocation_id: row.get("allocation_id"),
        ip_address: row.get("ip_address"),
        mac_address: row.get("mac_address"),
        username: row.get("username"),
        action: row.get("action"),
        created_at: row.get("created_at"),
    }
}

/// Map a SQLite row to an Olt struct
pub fn map_olt_row(row: &SqliteRow) -> Olt {
    let port: i64 = row.get("port");
    let snmp_port: i64 = row.get("snmp_port");
    Olt {
        id: row.get("id"),
        name: row.get("name"),
        ip_address: row.get("ip_address"),
        port: u16::try_from(port).unwrap_or(22),
        management_protocol: row.get("management_protocol"),
        username: row.get("username"),
        password: row.get("password"),
        snmp_community: none_if_empty(row.get("snmp_community")),
        snmp_version: row.get("snmp_version"),
        snmp_port: u16::try_from(snmp_port).unwrap_or(161),
        brand: row.get("brand"),
        model: none_if_empty(row.get("model")),
        status: row.get("status"),
        health_status: row.get("health_status"),
        last_backup_at: row.get("last_backup_at"),
        last_health_check_at: row.get("last_health_check_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an Onu struct
pub fn map_onu_row(row: &SqliteRow) -> Onu {
    let authorized: i32 = row.get("is_authorized");
    Onu {
        id: row.get("id"),
        olt_id: row.get("olt_id"),
        pon_port: row.get("pon_port"),
        onu_id: row.get("onu_id"),
        serial_number: row.get("serial_number"),
        name: none_if_empty(row.get("name")),
        status: row.get("status"),
        is_authorized: authorized == 1,
        signal_rx: row.try_get::<Option<f64>, _>("signal_rx").ok().flatten(),
        signal_tx: row.try_get::<Option<f64>, _>("signal_tx").ok().flatten(),
        distance: row.try_get::<Option<i64>, _>("distance").ok().flatten(),
        last_seen_at: row.get("last_seen_at"),
        last_sync_at: row.get("last_sync_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_olt_backup_row(row: &SqliteRow) -> OltBackup {
    OltBackup {
        id: row.get("id"),
        olt_id: row.get("olt_id"),
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        backup_type: row.get("backup_type"),
        created_at: row.get("created_at"),
    }
}

/// Map a SQLite row to a MikrotikRouter struct
pub fn map_router_row(row: &SqliteRow) -> MikrotikRouter {
    let api_port: i64 = row.get("api_port");
    MikrotikRouter {
        id: row.get("id"),
        nas_id: row.try_get::<Option<i64>, _>("nas_id").ok().flatten(),
        name: row.get("name"),
        ip_address: row.get("ip_address"),
        api_port: u16::try_from(api_port).unwrap_or(80),
        username: row.get("username"),
        password: row.get("password"),
        radius_secret: none_if_empty(row.get("radius_secret")),
        status: row.get("status"),
        api_status: row.get("api_status"),
        last_checked_at: row.get("last_checked_at"),
        last_error: none_if_empty(row.get("last_error")),
        response_time_ms: row.try_get::<Option<i64>, _>("response_time_ms").ok().flatten(),
        provisioned_at: row.get("provisioned_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_nas_row(row: &SqliteRow) -> Nas {
    Nas {
        id: row.get("id"),
        nasname: row.get("nasname"),
        shortname: row.get("shortname"),
        secret: row.get("secret"),
        server: row.get("server"),
        description: none_if_empty(row.get("description")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_pppoe_user_row(row: &SqliteRow) -> MikrotikPppoeUser {
    MikrotikPppoeUser {
        id: row.get("id"),
        router_id: row.get("router_id"),
        username: row.get("username"),
        password: row.get("password"),
        service: row.get("service"),
        profile: row.get("profile"),
        local_address: none_if_empty(row.get("local_address")),
        remote_address: none_if_empty(row.get("remote_address")),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a DeviceMonitor struct
pub fn map_monitor_row(row: &SqliteRow) -> DeviceMonitor {
    DeviceMonitor {
        id: row.get("id"),
        device: device_ref(row),
        status: row.get("status"),
        cpu_usage: row.try_get::<Option<f64>, _>("cpu_usage").ok().flatten(),
        memory_usage: row.try_get::<Option<f64>, _>("memory_usage").ok().flatten(),
        uptime: row.try_get::<Option<i64>, _>("uptime").ok().flatten(),
        last_check_at: row.get("last_check_at"),
    }
}

/// Map a SQLite row to a BandwidthUsage struct
pub fn map_bandwidth_row(row: &SqliteRow) -> BandwidthUsage {
    BandwidthUsage {
        id: row.get("id"),
        device: device_ref(row),
        timestamp: row.get("timestamp"),
        upload_bytes: row.get("upload_bytes"),
        download_bytes: row.get("download_bytes"),
        total_bytes: row.get("total_bytes"),
        period_type: row.get("period_type"),
        aggregated_at: row.get("aggregated_at"),
    }
}
