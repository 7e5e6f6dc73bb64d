use crate::device::cpu::math::{axpy, scal};
use crate::dtype::DTypeFloat;
use crate::error::{check_len, Result};
use crate::tensor::{Dim1, Dim4, Tensor1, Tensor4};
use std::iter::zip;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Hyperparameters of one optimizer step.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UpdateArgs {
    pub learning_rate: f64,
    pub momentum: f64,
    pub decay: f64,
    /// Number of images whose gradients were accumulated since the last step.
    pub batch: usize,
    pub b1: f64,
    pub b2: f64,
    pub eps: f64,
    /// Adam step counter, starting at 1.
    pub t: usize,
}

impl Default for UpdateArgs {
    fn default() -> Self {
        UpdateArgs {
            learning_rate: 0.001,
            momentum: 0.9,
            decay: 0.0005,
            batch: 1,
            b1: 0.9,
            b2: 0.999,
            eps: 1e-7,
            t: 1,
        }
    }
}

impl UpdateArgs {
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    pub fn step(mut self, t: usize) -> Self {
        self.t = t;
        self
    }
}

/// Mutable parameters of a layer, each paired with its accumulated gradient.
pub struct ParamsMut<'a, F> {
    pub weights: &'a mut [F],
    pub weight_updates: &'a mut [F],
    pub biases: &'a mut [F],
    pub bias_updates: &'a mut [F],
    pub scales: Option<(&'a mut [F], &'a mut [F])>,
}

/// First and second moment estimates for every trainable tensor of a layer.
#[derive(Debug, Clone)]
pub struct AdamMoments<F> {
    m: Tensor4<F>,
    v: Tensor4<F>,
    bias_m: Tensor1<F>,
    bias_v: Tensor1<F>,
    scale_m: Tensor1<F>,
    scale_v: Tensor1<F>,
}

impl<F: DTypeFloat> AdamMoments<F> {
    pub fn new(weight_dims: Dim4) -> Result<Self> {
        let n = Dim1(weight_dims.batch());
        Ok(AdamMoments {
            m: Tensor4::try_zeroed("adam weight m", weight_dims)?,
            v: Tensor4::try_zeroed("adam weight v", weight_dims)?,
            bias_m: Tensor1::try_zeroed("adam bias m", n)?,
            bias_v: Tensor1::try_zeroed("adam bias v", n)?,
            scale_m: Tensor1::try_zeroed("adam scale m", n)?,
            scale_v: Tensor1::try_zeroed("adam scale v", n)?,
        })
    }
}

#[derive(Debug, Clone)]
pub enum OptimizerState<F> {
    /// Gradient descent with momentum and weight decay.
    Momentum,
    Adam(AdamMoments<F>),
}

impl<F: DTypeFloat> OptimizerState<F> {
    pub fn new(adam: bool, weight_dims: Dim4) -> Result<Self> {
        if adam {
            Ok(OptimizerState::Adam(AdamMoments::new(weight_dims)?))
        } else {
            Ok(OptimizerState::Momentum)
        }
    }

    #[inline]
    pub fn is_adam(&self) -> bool {
        matches!(self, OptimizerState::Adam(_))
    }

    /// Applies one step to every parameter, scaling the learning rate by `rate_scale`.
    pub fn update(&mut self, args: &UpdateArgs, rate_scale: f64, params: ParamsMut<'_, F>) -> Result<()> {
        let ParamsMut {
            weights,
            weight_updates,
            biases,
            bias_updates,
            scales,
        } = params;
        check_len("weight updates", weights.len(), weight_updates.len())?;
        check_len("bias updates", biases.len(), bias_updates.len())?;
        let learning_rate = args.learning_rate * rate_scale;
        match self {
            OptimizerState::Momentum => {
                let rate = F::from_f64(learning_rate / args.batch as f64);
                let momentum = F::from_f64(args.momentum);
                momentum_step(rate, momentum, biases, bias_updates);
                if let Some((scales, scale_updates)) = scales {
                    check_len("scale updates", scales.len(), scale_updates.len())?;
                    momentum_step(rate, momentum, scales, scale_updates);
                }
                axpy(F::from_f64(-args.decay * args.batch as f64), weights, weight_updates);
                momentum_step(rate, momentum, weights, weight_updates);
            }
            OptimizerState::Adam(moments) => {
                let step = AdamStep::new(args, learning_rate);
                step.apply(biases, bias_updates, moments.bias_m.as_mut(), moments.bias_v.as_mut(), F::ZERO);
                if let Some((scales, scale_updates)) = scales {
                    check_len("scale updates", scales.len(), scale_updates.len())?;
                    step.apply(scales, scale_updates, moments.scale_m.as_mut(), moments.scale_v.as_mut(), F::ZERO);
                }
                let decay = F::from_f64(args.decay * args.batch as f64);
                step.apply(weights, weight_updates, moments.m.as_mut(), moments.v.as_mut(), decay);
            }
        }
        Ok(())
    }
}

/// `param += rate * updates; updates *= momentum`
fn momentum_step<F: DTypeFloat>(rate: F, momentum: F, params: &mut [F], updates: &mut [F]) {
    axpy(rate, updates, params);
    scal(momentum, updates);
}

struct AdamStep<F> {
    b1: F,
    b2: F,
    eps: F,
    rate: F,
    /// Bias corrections `1 - b1^t` and `1 - b2^t`.
    correction1: F,
    correction2: F,
}

impl<F: DTypeFloat> AdamStep<F> {
    fn new(args: &UpdateArgs, learning_rate: f64) -> Self {
        let t = args.t.max(1) as i32;
        AdamStep {
            b1: F::from_f64(args.b1),
            b2: F::from_f64(args.b2),
            eps: F::from_f64(args.eps),
            rate: F::from_f64(learning_rate),
            correction1: F::from_f64(1.0 - args.b1.powi(t)),
            correction2: F::from_f64(1.0 - args.b2.powi(t)),
        }
    }

    /// Updates the moments from `updates`, steps `params` and clears `updates`.
    fn apply(&self, params: &mut [F], updates: &mut [F], m: &mut [F], v: &mut [F], decay: F) {
        scal(self.b1, m);
        scal(self.b2, v);
        axpy(-decay, params, updates);
        for ((d, m), v) in zip(zip(updates.iter(), m.iter_mut()), v.iter_mut()) {
            *m += (F::ONE - self.b1) * *d;
            *v += (F::ONE - self.b2) * *d * *d;
        }
        for ((p, &m), &v) in zip(zip(params.iter_mut(), m.iter()), v.iter()) {
            let m_hat = m / self.correction1;
            let v_hat = v / self.correction2;
            *p += self.rate * m_hat / (v_hat.sqrt() + self.eps);
        }
        updates.fill(F::ZERO);
    }
}
