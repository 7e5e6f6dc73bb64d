pub mod base;
mod debug;
mod extras;
pub mod owned;
pub mod view;
#[cfg(feature = "approx")]
mod approx;
