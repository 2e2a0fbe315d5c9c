//! Network device integration core for an ISP operations portal.
//!
//! Router management API and RADIUS provisioning, OLT management over SSH
//! and SNMP, IP address management and device monitoring with bandwidth
//! rollups. Periodic work is driven by an external scheduler through the
//! `isp-netcore` binary.

pub mod backup;
pub mod config;
pub mod db;
pub mod mikrotik;
pub mod models;
pub mod parser;
pub mod services;
pub mod transport;
pub mod utils;
