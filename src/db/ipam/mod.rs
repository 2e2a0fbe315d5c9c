mod allocations;
mod pools;
mod subnets;

pub use allocations::*;
pub use pools::*;
pub use subnets::*;
