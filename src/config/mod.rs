use std::env;
use std::time::Duration;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub backup_dir: String,
    /// Deadline for every SSH exec and router API call
    pub device_timeout_secs: u64,
    pub snmp_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub snmp_default_community: String,
    pub radius_auth_port: u16,
    pub radius_acct_port: u16,
    pub radius_interim_update: String,
    pub bandwidth_retention_days: i64,
    pub monitor_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            db_path: get("DB_PATH", "/data/isp-netcore.db"),
            db_max_connections: get("DB_MAX_CONNECTIONS", "5").parse().unwrap_or(5),
            backup_dir: get("BACKUP_DIR", "/backups"),
            device_timeout_secs: get("DEVICE_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            snmp_timeout_secs: get("SNMP_TIMEOUT_SECS", "5").parse().unwrap_or(5),
            http_timeout_secs: get("HTTP_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            snmp_default_community: get("SNMP_DEFAULT_COMMUNITY", "public"),
            radius_auth_port: get("RADIUS_AUTH_PORT", "1812").parse().unwrap_or(1812),
            radius_acct_port: get("RADIUS_ACCT_PORT", "1813").parse().unwrap_or(1813),
            radius_interim_update: get("RADIUS_INTERIM_UPDATE", "5m"),
            bandwidth_retention_days: get("BANDWIDTH_RETENTION_DAYS", "30").parse().unwrap_or(30),
            monitor_concurrency: get("MONITOR_CONCURRENCY", "8").parse().unwrap_or(8),
        }
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }

    pub fn snmp_timeout(&self) -> Duration {
        Duration::from_secs(self.snmp_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
