mod ipam;
mod mikrotik;
mod monitoring;
mod olt;

pub use ipam::*;
pub use mikrotik::*;
pub use monitoring::*;
pub use olt::*;
