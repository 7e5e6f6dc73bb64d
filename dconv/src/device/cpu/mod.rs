mod device;
pub mod math;

pub use device::*;
pub use math::DTypeOps;
