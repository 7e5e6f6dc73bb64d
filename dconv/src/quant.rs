use crate::dtype::DTypeFloat;
use crate::error::Result;
use crate::tensor::{Dim4, Tensor4};
use std::iter::zip;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the forward pass quantizes its operands.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QuantizationMode {
    #[default]
    FullPrecision,
    /// Sign-quantized weights scaled by the mean magnitude of each filter.
    Binary,
    /// Binary weights and a sign-quantized input.
    XnorNet,
}

/// The forward quantization strategy together with the buffers it owns.
///
/// The full-precision weights are never modified. Gradients are always taken with respect to
/// them, so quantization is invisible to the backward pass.
#[derive(Debug, Clone)]
pub enum Quantization<F> {
    FullPrecision,
    Binary { weights: Tensor4<F> },
    XnorNet { weights: Tensor4<F>, input: Tensor4<F> },
}

impl<F: DTypeFloat> Quantization<F> {
    pub fn new(mode: QuantizationMode, weight_dims: Dim4, input_dims: Dim4) -> Result<Self> {
        Ok(match mode {
            QuantizationMode::FullPrecision => Quantization::FullPrecision,
            QuantizationMode::Binary => Quantization::Binary {
                weights: Tensor4::try_zeroed("binary weights", weight_dims)?,
            },
            QuantizationMode::XnorNet => Quantization::XnorNet {
                weights: Tensor4::try_zeroed("binary weights", weight_dims)?,
                input: Tensor4::try_zeroed("binary input", input_dims)?,
            },
        })
    }

    pub fn mode(&self) -> QuantizationMode {
        match self {
            Quantization::FullPrecision => QuantizationMode::FullPrecision,
            Quantization::Binary { .. } => QuantizationMode::Binary,
            Quantization::XnorNet { .. } => QuantizationMode::XnorNet,
        }
    }

    pub fn resize(&mut self, input_dims: Dim4) -> Result<()> {
        if let Quantization::XnorNet { input, .. } = self {
            input.try_resize("binary input", F::ZERO, input_dims)?;
        }
        Ok(())
    }

    /// Quantizes the operands of one forward pass and returns the weights and input the
    /// convolution should run on.
    pub fn prepare<'a>(&'a mut self, weights: &'a [F], filters: usize, input: &'a [F]) -> (&'a [F], &'a [F]) {
        match self {
            Quantization::FullPrecision => (weights, input),
            Quantization::Binary { weights: binary } => {
                binarize_weights(weights, filters, binary.as_mut_slice());
                (binary.as_slice(), input)
            }
            Quantization::XnorNet {
                weights: binary,
                input: binary_input,
            } => {
                binarize_weights(weights, filters, binary.as_mut_slice());
                binarize_input(input, binary_input.as_mut_slice());
                (binary.as_slice(), binary_input.as_slice())
            }
        }
    }
}

/// Replaces every filter by its sign scaled by the mean absolute value of the filter.
pub fn binarize_weights<F: DTypeFloat>(weights: &[F], filters: usize, binary: &mut [F]) {
    assert_eq!(weights.len(), binary.len());
    assert!(filters > 0 && weights.len() % filters == 0);
    let filter_len = weights.len() / filters;
    for (src, dst) in zip(weights.chunks_exact(filter_len), binary.chunks_exact_mut(filter_len)) {
        let mean = src.iter().fold(F::ZERO, |acc, w| acc + w.abs()) / F::from_usize(filter_len);
        for (&w, b) in zip(src, dst) {
            *b = w.binary_sign() * mean;
        }
    }
}

/// Maps positive values to `1` and everything else to `-1`.
pub fn binarize_input<F: DTypeFloat>(input: &[F], binary: &mut [F]) {
    assert_eq!(input.len(), binary.len());
    for (&x, b) in zip(input, binary) {
        *b = x.binary_sign();
    }
}

#[cfg(test)]
mod test {
    use super::{binarize_input, binarize_weights, Quantization, QuantizationMode};
    use crate::tensor::Dim4;

    #[test]
    fn test_binarize_weights() {
        let weights = [1.0f32, -3.0, 2.0, 0.5, -0.5, 0.0];
        let mut binary = [0.0; 6];
        binarize_weights(&weights, 2, &mut binary);
        assert_eq!(binary, [2.0, -2.0, 2.0, 1.0 / 3.0, -1.0 / 3.0, -1.0 / 3.0]);
    }

    #[test]
    fn test_binarize_input() {
        let mut binary = [0.0; 4];
        binarize_input(&[0.3f64, -2.0, 0.0, 7.0], &mut binary);
        assert_eq!(binary, [1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_prepare_leaves_operands_untouched() {
        let weights = vec![0.5f32, -1.5, 1.0, -1.0];
        let input = vec![0.2f32, -0.1];

        let mut full = Quantization::<f32>::new(QuantizationMode::FullPrecision, Dim4(2, 1, 1, 2), Dim4(1, 1, 1, 2)).unwrap();
        let (w, x) = full.prepare(&weights, 2, &input);
        assert_eq!((w, x), (weights.as_slice(), input.as_slice()));

        let mut binary = Quantization::<f32>::new(QuantizationMode::Binary, Dim4(2, 1, 1, 2), Dim4(1, 1, 1, 2)).unwrap();
        let (w, x) = binary.prepare(&weights, 2, &input);
        assert_eq!(w, &[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(x, input.as_slice());

        let mut xnor = Quantization::<f32>::new(QuantizationMode::XnorNet, Dim4(2, 1, 1, 2), Dim4(1, 1, 1, 2)).unwrap();
        assert_eq!(xnor.mode(), QuantizationMode::XnorNet);
        let (w, x) = xnor.prepare(&weights, 2, &input);
        assert_eq!(w, &[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(x, &[1.0, -1.0]);
        assert_eq!(weights, [0.5, -1.5, 1.0, -1.0]);
    }
}
