pub mod ipam;
pub mod mikrotik;
pub mod monitoring;
pub mod olt;
pub mod radius;

#[cfg(test)]
pub(crate) mod testing;

pub use ipam::IpamService;
pub use mikrotik::MikrotikService;
pub use monitoring::MonitoringService;
pub use olt::OltService;
pub use radius::{RadiusService, RadiusSettings};
