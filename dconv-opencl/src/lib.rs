pub mod device;
pub mod error;
mod kernels;
pub mod util;

pub use device::{OpenCLDevice, OpenCLPlan};
