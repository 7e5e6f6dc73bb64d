use crate::dtype::DTypeFloat;
use std::iter::zip;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActivationFn {
    Linear,
    Sigmoid,
    /// Leaky rectifier; a leak of zero is the plain ReLU.
    ReLU {
        leak: f64,
    },
    Tanh,
    Elu,
}

impl Default for ActivationFn {
    fn default() -> Self {
        ActivationFn::ReLU { leak: 0.1 }
    }
}

impl ActivationFn {
    /// Applies the function to every element in place.
    pub fn activate<F: DTypeFloat>(&self, values: &mut [F]) {
        match *self {
            ActivationFn::Linear => {}
            ActivationFn::Sigmoid => values.iter_mut().for_each(|x| *x = F::ONE / (F::ONE + (-*x).exp())),
            ActivationFn::ReLU { leak } => {
                let leak = F::from_f64(leak);
                values.iter_mut().filter(|x| **x <= F::ZERO).for_each(|x| *x *= leak);
            }
            ActivationFn::Tanh => values.iter_mut().for_each(|x| *x = x.tanh()),
            ActivationFn::Elu => values
                .iter_mut()
                .filter(|x| **x < F::ZERO)
                .for_each(|x| *x = x.exp() - F::ONE),
        }
    }

    /// Multiplies `delta` by the derivative of the function, expressed in terms of the
    /// already activated `output`.
    pub fn gradient<F: DTypeFloat>(&self, output: &[F], delta: &mut [F]) {
        assert_eq!(output.len(), delta.len());
        let pairs = zip(output, delta);
        match *self {
            ActivationFn::Linear => {}
            ActivationFn::Sigmoid => pairs.for_each(|(&y, d)| *d *= (F::ONE - y) * y),
            ActivationFn::ReLU { leak } => {
                let leak = F::from_f64(leak);
                pairs.filter(|&(&y, _)| y <= F::ZERO).for_each(|(_, d)| *d *= leak);
            }
            ActivationFn::Tanh => pairs.for_each(|(&y, d)| *d *= F::ONE - y * y),
            ActivationFn::Elu => pairs.filter(|&(&y, _)| y < F::ZERO).for_each(|(&y, d)| *d *= y + F::ONE),
        }
    }
}

impl std::fmt::Display for ActivationFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationFn::Linear => f.write_str("linear"),
            ActivationFn::Sigmoid => f.write_str("logistic"),
            ActivationFn::ReLU { leak } if *leak == 0.0 => f.write_str("relu"),
            ActivationFn::ReLU { leak } => write!(f, "leaky({leak})"),
            ActivationFn::Tanh => f.write_str("tanh"),
            ActivationFn::Elu => f.write_str("elu"),
        }
    }
}
