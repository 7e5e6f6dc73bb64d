pub mod activation;
pub mod device;
pub mod dtype;
pub mod error;
pub mod geometry;
pub mod net;
pub mod norm;
pub mod optimizer;
pub mod quant;
pub mod tensor;
pub mod unfold;
#[doc(hidden)]
pub mod util;

pub use error::{Error, Result};

extern crate log;
extern crate matrixmultiply;
extern crate num_traits;
extern crate rand;
extern crate rand_distr;
