use num_traits::{Float, Num, NumAssignOps};
use std::fmt::{Debug, Display};

/// Element type of tensors and layer buffers.
pub trait DType: 'static + Copy + Debug + Display + PartialOrd + Send + Sync + Num + NumAssignOps {
    const ZERO: Self;
    const ONE: Self;
    /// Type name used in log lines.
    const NAME: &'static str;
    fn from_f64(val: f64) -> Self;
    fn from_usize(val: usize) -> Self;
    fn to_f64(self) -> f64;
}

/// The floating point element types every layer computation runs on.
pub trait DTypeFloat: DType + Float {
    /// `1` for positive values and `-1` for everything else, zero included.
    #[inline]
    fn binary_sign(self) -> Self {
        if self > Self::ZERO { Self::ONE } else { -Self::ONE }
    }
}

macro_rules! impl_dtype_float {
    ($($ty:ident),+ $(,)?) => {
        $(
        impl DType for $ty {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const NAME: &'static str = stringify!($ty);
            #[inline]
            fn from_f64(val: f64) -> Self {
                val as $ty
            }
            #[inline]
            fn from_usize(val: usize) -> Self {
                val as $ty
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }

        impl DTypeFloat for $ty {}
        )+
    };
}

impl_dtype_float!(f32, f64);
