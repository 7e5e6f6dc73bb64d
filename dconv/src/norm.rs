use crate::device::cpu::math::{axpy, scal, sum};
use crate::dtype::DTypeFloat;
use crate::error::{check_len, Error, Result};
use crate::tensor::{Dim1, Dim4, ITensor, Tensor1, Tensor4};
use std::iter::zip;

const EPSILON: f64 = 1e-5;
const ROLLING_MOMENTUM: f64 = 0.99;

/// Batch normalization state for the output channels of a convolution.
///
/// Statistics are gathered per channel over every image of the batch and every spatial
/// position. Training uses the statistics of the current batch and folds them into the
/// rolling averages, inference uses the rolling averages.
#[derive(Debug, Clone)]
pub struct BatchNorm<F> {
    scales: Tensor1<F>,
    scale_updates: Tensor1<F>,
    mean: Tensor1<F>,
    variance: Tensor1<F>,
    mean_delta: Tensor1<F>,
    variance_delta: Tensor1<F>,
    rolling_mean: Tensor1<F>,
    rolling_variance: Tensor1<F>,
    /// Pre-normalization output of the last forward pass.
    x: Tensor4<F>,
    /// Normalized output of the last forward pass, before scaling.
    x_norm: Tensor4<F>,
}

fn per_channel<I: Iterator>(chunks: I, n: usize, mut f: impl FnMut(usize, I::Item)) {
    for (i, chunk) in chunks.enumerate() {
        f(i % n, chunk);
    }
}

impl<F: DTypeFloat> BatchNorm<F> {
    pub fn new(output_dims: Dim4) -> Result<Self> {
        let n = Dim1(output_dims.channels());
        Ok(BatchNorm {
            scales: Tensor1::try_filled("batchnorm scales", F::ONE, n)?,
            scale_updates: Tensor1::try_zeroed("batchnorm scale updates", n)?,
            mean: Tensor1::try_zeroed("batchnorm mean", n)?,
            variance: Tensor1::try_filled("batchnorm variance", F::ONE, n)?,
            mean_delta: Tensor1::try_zeroed("batchnorm mean delta", n)?,
            variance_delta: Tensor1::try_zeroed("batchnorm variance delta", n)?,
            rolling_mean: Tensor1::try_zeroed("batchnorm rolling mean", n)?,
            rolling_variance: Tensor1::try_filled("batchnorm rolling variance", F::ONE, n)?,
            x: Tensor4::try_zeroed("batchnorm x", output_dims)?,
            x_norm: Tensor4::try_zeroed("batchnorm x_norm", output_dims)?,
        })
    }

    /// Reallocates the per-position buffers for a new output geometry.
    pub fn resize(&mut self, output_dims: Dim4) -> Result<()> {
        self.x.try_resize("batchnorm x", F::ZERO, output_dims)?;
        self.x_norm.try_resize("batchnorm x_norm", F::ZERO, output_dims)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.scales.len()
    }

    #[inline]
    pub fn scales(&self) -> &Tensor1<F> {
        &self.scales
    }

    #[inline]
    pub fn scales_mut(&mut self) -> &mut Tensor1<F> {
        &mut self.scales
    }

    #[inline]
    pub fn scale_updates(&self) -> &Tensor1<F> {
        &self.scale_updates
    }

    #[inline]
    pub fn scale_updates_mut(&mut self) -> &mut Tensor1<F> {
        &mut self.scale_updates
    }

    /// Scales and their accumulated gradient, borrowed together for the optimizer.
    #[inline]
    pub fn scale_params_mut(&mut self) -> (&mut [F], &mut [F]) {
        (self.scales.as_mut(), self.scale_updates.as_mut())
    }

    #[inline]
    pub fn mean(&self) -> &Tensor1<F> {
        &self.mean
    }

    #[inline]
    pub fn variance(&self) -> &Tensor1<F> {
        &self.variance
    }

    #[inline]
    pub fn rolling_mean(&self) -> &Tensor1<F> {
        &self.rolling_mean
    }

    #[inline]
    pub fn rolling_mean_mut(&mut self) -> &mut Tensor1<F> {
        &mut self.rolling_mean
    }

    #[inline]
    pub fn rolling_variance(&self) -> &Tensor1<F> {
        &self.rolling_variance
    }

    #[inline]
    pub fn rolling_variance_mut(&mut self) -> &mut Tensor1<F> {
        &mut self.rolling_variance
    }

    #[inline]
    pub fn x_norm(&self) -> &Tensor4<F> {
        &self.x_norm
    }

    /// Batch statistics while training, rolling statistics otherwise.
    fn statistics(&self, train: bool) -> (&[F], &[F]) {
        if train {
            (self.mean.as_ref(), self.variance.as_ref())
        } else {
            (self.rolling_mean.as_ref(), self.rolling_variance.as_ref())
        }
    }

    fn check(&self, values: &[F], dims: Dim4) -> Result<()> {
        check_len("batchnorm channels", self.channels(), dims.channels())?;
        check_len("batchnorm output", self.x.len(), values.len())
    }

    /// Normalizes `output` in place, then applies the per-channel scales and biases.
    pub fn forward(&mut self, output: &mut [F], biases: &[F], dims: Dim4, train: bool) -> Result<()> {
        self.check(output, dims)?;
        check_len("biases", self.channels(), biases.len())?;
        let n = dims.channels();
        let spatial = dims.channel_stride();
        let eps = F::from_f64(EPSILON);

        if train {
            let count = F::from_usize(dims.batch() * spatial);
            self.mean.fill_zero();
            self.variance.fill_zero();
            let mean = self.mean.as_mut();
            per_channel(output.chunks_exact(spatial), n, |c, chunk| {
                mean[c] += sum(chunk);
            });
            mean.iter_mut().for_each(|m| *m /= count);
            let mean = self.mean.as_ref();
            let variance = self.variance.as_mut();
            per_channel(output.chunks_exact(spatial), n, |c, chunk| {
                variance[c] += chunk.iter().fold(F::ZERO, |acc, &v| acc + (v - mean[c]) * (v - mean[c]));
            });
            variance.iter_mut().for_each(|v| *v /= count);

            let momentum = F::from_f64(ROLLING_MOMENTUM);
            scal(momentum, self.rolling_mean.as_mut());
            axpy(F::ONE - momentum, self.mean.as_ref(), self.rolling_mean.as_mut());
            scal(momentum, self.rolling_variance.as_mut());
            axpy(F::ONE - momentum, self.variance.as_ref(), self.rolling_variance.as_mut());
        }

        self.x.as_mut().copy_from_slice(output);
        let (mean, variance) = self.statistics(train);
        normalize(output, mean, variance, spatial, eps);
        self.x_norm.as_mut().copy_from_slice(output);

        let scales = self.scales.as_ref();
        per_channel(output.chunks_exact_mut(spatial), n, |c, chunk| {
            chunk.iter_mut().for_each(|v| *v = *v * scales[c] + biases[c]);
        });
        Ok(())
    }

    /// Accumulates bias and scale gradients and rewrites `delta` into the gradient with
    /// respect to the pre-normalization output of the last forward pass.
    ///
    /// `train` must match that forward pass. Without training the rolling statistics are
    /// constants, so the normalization is a per-channel affine map.
    pub fn backward(&mut self, delta: &mut [F], bias_updates: &mut [F], dims: Dim4, train: bool) -> Result<()> {
        self.check(delta, dims)?;
        check_len("bias updates", self.channels(), bias_updates.len())?;
        let n = dims.channels();
        let spatial = dims.channel_stride();
        let count = F::from_usize(dims.batch() * spatial);
        let eps = F::from_f64(EPSILON);

        let scale_updates = self.scale_updates.as_mut();
        per_channel(zip(delta.chunks_exact(spatial), self.x_norm.as_ref().chunks_exact(spatial)), n, |c, (d, xn)| {
            bias_updates[c] += sum(d);
            scale_updates[c] += zip(d, xn).fold(F::ZERO, |acc, (&d, &xn)| acc + d * xn);
        });

        let scales = self.scales.as_ref();
        per_channel(delta.chunks_exact_mut(spatial), n, |c, chunk| {
            chunk.iter_mut().for_each(|v| *v *= scales[c]);
        });

        self.mean_delta.fill_zero();
        self.variance_delta.fill_zero();
        if !train {
            let variance = self.rolling_variance.as_ref();
            per_channel(delta.chunks_exact_mut(spatial), n, |c, chunk| {
                scal(F::ONE / (variance[c] + eps).sqrt(), chunk);
            });
            return Ok(());
        }

        let mean = self.mean.as_ref();
        let variance = self.variance.as_ref();
        let mean_delta = self.mean_delta.as_mut();
        let variance_delta = self.variance_delta.as_mut();
        per_channel(zip(delta.chunks_exact(spatial), self.x.as_ref().chunks_exact(spatial)), n, |c, (d, x)| {
            let inv_std = F::ONE / (variance[c] + eps).sqrt();
            let inv_var_3_2 = (variance[c] + eps).powf(F::from_f64(-1.5));
            mean_delta[c] -= sum(d) * inv_std;
            variance_delta[c] += zip(d, x).fold(F::ZERO, |acc, (&d, &x)| {
                acc + d * (x - mean[c]) * F::from_f64(-0.5) * inv_var_3_2
            });
        });

        let two = F::from_f64(2.0);
        per_channel(zip(delta.chunks_exact_mut(spatial), self.x.as_ref().chunks_exact(spatial)), n, |c, (d, x)| {
            let inv_std = F::ONE / (variance[c] + eps).sqrt();
            for (d, &x) in zip(d, x) {
                *d = *d * inv_std + variance_delta[c] * two * (x - mean[c]) / count + mean_delta[c] / count;
            }
        });
        Ok(())
    }

    /// Folds the rolling statistics and scales into `weights` and `biases` so the layer
    /// produces the same inference output without normalization.
    pub fn denormalize(&mut self, weights: &mut [F], biases: &mut [F]) -> Result<()> {
        let n = self.channels();
        check_len("biases", n, biases.len())?;
        if n == 0 || weights.len() % n != 0 {
            return Err(Error::LengthMismatch {
                what: "weights",
                expected: n,
                actual: weights.len(),
            });
        }
        let filter_len = weights.len() / n;
        let eps = F::from_f64(EPSILON);
        for (i, filter) in weights.chunks_exact_mut(filter_len).enumerate() {
            let scale = self.scales[i] / (self.rolling_variance[i] + eps).sqrt();
            filter.iter_mut().for_each(|w| *w *= scale);
            biases[i] -= self.rolling_mean[i] * scale;
        }
        self.scales.fill(F::ONE);
        self.rolling_mean.fill_zero();
        self.rolling_variance.fill(F::ONE);
        Ok(())
    }
}

fn normalize<F: DTypeFloat>(values: &mut [F], mean: &[F], variance: &[F], spatial: usize, eps: F) {
    per_channel(values.chunks_exact_mut(spatial), mean.len(), |c, chunk| {
        let inv_std = F::ONE / (variance[c] + eps).sqrt();
        chunk.iter_mut().for_each(|v| *v = (*v - mean[c]) * inv_std);
    });
}
