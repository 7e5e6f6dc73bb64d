use crate::activation::ActivationFn;
use crate::device::cpu::math::{scal, sum};
use crate::device::ConvDevice;
use crate::dtype::DType;
use crate::error::{check_len, Error, Result};
use crate::geometry::ConvGeometry;
use crate::net::initializer::Initializer;
use crate::net::layer::{Layer, LayerParams};
use crate::net::NetState;
use crate::norm::BatchNorm;
use crate::optimizer::{OptimizerState, ParamsMut, UpdateArgs};
use crate::quant::{Quantization, QuantizationMode};
use crate::tensor::{Dim3, Dim4, ITensor, Tensor1, Tensor4, TensorView};
use derive_builder::Builder;
use log::{debug, info, trace};
use std::mem;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of a dilated, grouped convolution layer.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DilatedConvParams {
    pub filters: usize,
    pub size: usize,
    pub stride: usize,
    pub pad: usize,
    pub dilate_rate: usize,
    pub groups: usize,
    pub activation: ActivationFn,
    pub batch_normalize: bool,
    pub quantization: QuantizationMode,
    pub adam: bool,
    pub learning_rate_scale: f64,
}

impl Default for DilatedConvParams {
    fn default() -> Self {
        DilatedConvParams {
            filters: 1,
            size: 1,
            stride: 1,
            pad: 0,
            dilate_rate: 1,
            groups: 1,
            activation: ActivationFn::default(),
            batch_normalize: false,
            quantization: QuantizationMode::FullPrecision,
            adam: false,
            learning_rate_scale: 1.0,
        }
    }
}

impl DilatedConvParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        let positive = [
            ("filters", self.filters),
            ("size", self.size),
            ("stride", self.stride),
            ("dilate_rate", self.dilate_rate),
            ("groups", self.groups),
        ];
        match positive.iter().find(|(_, v)| *v == Some(0)) {
            Some((name, _)) => Err(format!("{name} must be positive")),
            None => Ok(()),
        }
    }
}

impl From<DilatedConvParamsBuilderError> for Error {
    fn from(e: DilatedConvParamsBuilderError) -> Self {
        Error::InvalidGeometry(e.to_string())
    }
}

impl<D: ConvDevice> LayerParams<D> for DilatedConvParams {
    type Layer = DilatedConvLayer<D>;

    fn create_layer(
        &self,
        device: &D,
        input: Dim4,
        initializer: &mut dyn Initializer<D::Float>,
    ) -> Result<DilatedConvLayer<D>> {
        let geometry = ConvGeometry::new(
            input.batch(),
            input.height(),
            input.width(),
            input.channels(),
            self.filters,
            self.groups,
            self.size,
            self.stride,
            self.pad,
            self.dilate_rate,
        )?;
        let weights = initializer.weights(geometry.weight_dims(), geometry.kernel_len())?;
        check_len("initial weights", geometry.nweights(), weights.len())?;
        let weights = Tensor4::from_vec(weights.into_vec(), geometry.weight_dims());
        let biases = initializer.biases(geometry.nbiases())?;
        check_len("initial biases", geometry.nbiases(), biases.len())?;

        let output_dims = geometry.output_dims();
        let norm = if self.batch_normalize {
            Some(BatchNorm::new(output_dims)?)
        } else {
            None
        };
        let plan = device.plan(&geometry)?;
        let layer = DilatedConvLayer {
            geometry,
            activation: self.activation,
            learning_rate_scale: self.learning_rate_scale,
            weight_updates: Tensor4::try_zeroed("weight updates", geometry.weight_dims())?,
            weights,
            bias_updates: Tensor1::try_zeroed("bias updates", *biases.dims())?,
            biases,
            output: Tensor4::try_zeroed("output", output_dims)?,
            delta: Tensor4::try_zeroed("delta", output_dims)?,
            norm,
            quantization: Quantization::new(self.quantization, geometry.weight_dims(), geometry.input_dims())?,
            optimizer: OptimizerState::new(self.adam, geometry.weight_dims())?,
            plan,
        };
        info!(
            "conv {:5} {:2} x{:2} /{:2} dil {:2} groups {:2}  {:4} x{:4} x{:4}   ->  {:4} x{:4} x{:4}  {:5.3} BFLOPs",
            geometry.n,
            geometry.size,
            geometry.size,
            geometry.stride,
            geometry.dilate_rate,
            geometry.groups,
            geometry.w,
            geometry.h,
            geometry.c,
            geometry.out_w,
            geometry.out_h,
            geometry.n,
            layer.bflops()
        );
        Ok(layer)
    }
}

/// A 2-D convolution layer with dilation, channel groups, optional batch normalization and
/// optional binary quantization, computed on the device `D`.
#[derive(Debug)]
pub struct DilatedConvLayer<D: ConvDevice> {
    geometry: ConvGeometry,
    activation: ActivationFn,
    learning_rate_scale: f64,
    /// `(n, c / groups, size, size)`
    weights: Tensor4<D::Float>,
    weight_updates: Tensor4<D::Float>,
    biases: Tensor1<D::Float>,
    bias_updates: Tensor1<D::Float>,
    output: Tensor4<D::Float>,
    delta: Tensor4<D::Float>,
    norm: Option<BatchNorm<D::Float>>,
    quantization: Quantization<D::Float>,
    optimizer: OptimizerState<D::Float>,
    plan: D::Plan,
}

fn add_bias<F: DType>(output: &mut [F], biases: &[F], spatial: usize) {
    let n = biases.len();
    for (i, chunk) in output.chunks_exact_mut(spatial).enumerate() {
        let bias = biases[i % n];
        chunk.iter_mut().for_each(|v| *v += bias);
    }
}

fn backward_bias<F: DType>(bias_updates: &mut [F], delta: &[F], spatial: usize) {
    let n = bias_updates.len();
    for (i, chunk) in delta.chunks_exact(spatial).enumerate() {
        bias_updates[i % n] += sum(chunk);
    }
}

impl<D: ConvDevice> DilatedConvLayer<D> {
    #[inline]
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    #[inline]
    pub fn activation(&self) -> ActivationFn {
        self.activation
    }

    #[inline]
    pub fn learning_rate_scale(&self) -> f64 {
        self.learning_rate_scale
    }

    pub fn set_learning_rate_scale(&mut self, scale: f64) {
        self.learning_rate_scale = scale;
    }

    #[inline]
    pub fn weights(&self) -> &Tensor4<D::Float> {
        &self.weights
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut Tensor4<D::Float> {
        &mut self.weights
    }

    pub fn set_weights(&mut self, weights: &[D::Float]) -> Result<()> {
        check_len("weights", self.weights.len(), weights.len())?;
        self.weights.as_mut_slice().copy_from_slice(weights);
        Ok(())
    }

    #[inline]
    pub fn weight_updates(&self) -> &Tensor4<D::Float> {
        &self.weight_updates
    }

    #[inline]
    pub fn biases(&self) -> &Tensor1<D::Float> {
        &self.biases
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut Tensor1<D::Float> {
        &mut self.biases
    }

    pub fn set_biases(&mut self, biases: &[D::Float]) -> Result<()> {
        check_len("biases", self.biases.len(), biases.len())?;
        self.biases.as_mut_slice().copy_from_slice(biases);
        Ok(())
    }

    #[inline]
    pub fn bias_updates(&self) -> &Tensor1<D::Float> {
        &self.bias_updates
    }

    #[inline]
    pub fn output(&self) -> &Tensor4<D::Float> {
        &self.output
    }

    #[inline]
    pub fn delta(&self) -> &Tensor4<D::Float> {
        &self.delta
    }

    /// The gradient buffer the next layer accumulates into.
    #[inline]
    pub fn delta_mut(&mut self) -> &mut Tensor4<D::Float> {
        &mut self.delta
    }

    #[inline]
    pub fn norm(&self) -> Option<&BatchNorm<D::Float>> {
        self.norm.as_ref()
    }

    #[inline]
    pub fn norm_mut(&mut self) -> Option<&mut BatchNorm<D::Float>> {
        self.norm.as_mut()
    }

    #[inline]
    pub fn quantization(&self) -> &Quantization<D::Float> {
        &self.quantization
    }

    #[inline]
    pub fn optimizer(&self) -> &OptimizerState<D::Float> {
        &self.optimizer
    }

    #[inline]
    pub fn plan(&self) -> &D::Plan {
        &self.plan
    }

    /// Scratch elements needed from the shared workspace.
    pub fn workspace_len(&self, device: &D) -> usize {
        device.workspace_size(&self.plan).div_ceil(mem::size_of::<D::Float>())
    }

    #[inline]
    pub fn flops(&self) -> usize {
        self.geometry.flops()
    }

    #[inline]
    pub fn bflops(&self) -> f64 {
        self.flops() as f64 / 1e9
    }

    /// The weights of filter `i`, shaped `(c / groups, size, size)`.
    pub fn filter(&self, i: usize) -> TensorView<'_, D::Float, Dim3> {
        let len = self.geometry.kernel_len();
        let dims = Dim3(self.geometry.group_channels(), self.geometry.size, self.geometry.size);
        TensorView::from_slice(&self.weights.as_slice()[i * len..(i + 1) * len], dims)
    }

    /// Output of image `b` of the batch, shaped `(n, out_h, out_w)`.
    pub fn output_image(&self, b: usize) -> TensorView<'_, D::Float, Dim3> {
        image_view(&self.output, b)
    }

    pub fn delta_image(&self, b: usize) -> TensorView<'_, D::Float, Dim3> {
        image_view(&self.delta, b)
    }

    /// Folds the batch normalization statistics into the weights and biases and removes the
    /// normalization step, leaving inference output unchanged.
    pub fn denormalize(&mut self) -> Result<()> {
        if let Some(mut norm) = self.norm.take() {
            norm.denormalize(self.weights.as_mut_slice(), self.biases.as_mut_slice())?;
            debug!("folded batch normalization into {} filters", self.geometry.n);
        }
        Ok(())
    }

    /// Scales every three-channel filter by `scale` and shifts its bias by `trans` times the
    /// sum of the scaled filter.
    pub fn rescale_weights(&mut self, scale: D::Float, trans: D::Float) {
        if self.geometry.group_channels() != 3 {
            return;
        }
        let len = self.geometry.kernel_len();
        for (filter, bias) in self.weights.as_mut_slice().chunks_exact_mut(len).zip(self.biases.iter_mut()) {
            scal(scale, filter);
            *bias += sum(filter) * trans;
        }
    }

    /// Swaps the first and third input channel of every three-channel filter.
    pub fn rgbgr_weights(&mut self) {
        if self.geometry.group_channels() != 3 {
            return;
        }
        let len = self.geometry.kernel_len();
        let plane = self.geometry.size * self.geometry.size;
        for filter in self.weights.as_mut_slice().chunks_exact_mut(len) {
            let (red, rest) = filter.split_at_mut(plane);
            red.swap_with_slice(&mut rest[plane..2 * plane]);
        }
    }

    fn net_input_len(&self) -> usize {
        self.geometry.batch * self.geometry.inputs()
    }
}

fn image_view<F>(tensor: &Tensor4<F>, b: usize) -> TensorView<'_, F, Dim3> {
    let dims = tensor.dims();
    let len = dims.batch_stride();
    TensorView::from_slice(&tensor.as_slice()[b * len..(b + 1) * len], dims.image())
}

impl<D: ConvDevice> Layer<D> for DilatedConvLayer<D> {
    fn forward(&mut self, device: &D, net: &mut NetState<'_, D::Float>) -> Result<()> {
        check_len("input", self.net_input_len(), net.input.len())?;
        trace!("conv forward {} -> {}", self.geometry.input_dims(), self.geometry.output_dims());
        let DilatedConvLayer {
            geometry,
            activation,
            weights,
            biases,
            output,
            norm,
            quantization,
            plan,
            ..
        } = self;
        let (w, x) = quantization.prepare(weights.as_slice(), geometry.n, net.input);
        device.forward(plan, geometry, w, x, net.workspace, output.as_mut_slice())?;
        match norm {
            Some(norm) => norm.forward(output.as_mut_slice(), biases.as_slice(), geometry.output_dims(), net.train)?,
            None => add_bias(output.as_mut_slice(), biases.as_slice(), geometry.spatial_out()),
        }
        activation.activate(output.as_mut_slice());
        Ok(())
    }

    fn backward(&mut self, device: &D, net: &mut NetState<'_, D::Float>) -> Result<()> {
        check_len("input", self.net_input_len(), net.input.len())?;
        trace!("conv backward {} -> {}", self.geometry.output_dims(), self.geometry.input_dims());
        let DilatedConvLayer {
            geometry,
            activation,
            weights,
            weight_updates,
            bias_updates,
            output,
            delta,
            norm,
            plan,
            ..
        } = self;
        activation.gradient(output.as_slice(), delta.as_mut_slice());
        match norm {
            Some(norm) => norm.backward(delta.as_mut_slice(), bias_updates.as_mut_slice(), geometry.output_dims(), net.train)?,
            None => backward_bias(bias_updates.as_mut_slice(), delta.as_slice(), geometry.spatial_out()),
        }
        device.backward(
            plan,
            geometry,
            weights.as_slice(),
            net.input,
            delta.as_slice(),
            net.workspace,
            weight_updates.as_mut_slice(),
            net.delta.as_deref_mut(),
        )
    }

    fn update(&mut self, args: &UpdateArgs) -> Result<()> {
        let scales = self.norm.as_mut().map(|norm| norm.scale_params_mut());
        self.optimizer.update(
            args,
            self.learning_rate_scale,
            ParamsMut {
                weights: self.weights.as_mut_slice(),
                weight_updates: self.weight_updates.as_mut_slice(),
                biases: self.biases.as_mut_slice(),
                bias_updates: self.bias_updates.as_mut_slice(),
                scales,
            },
        )
    }

    fn resize(&mut self, device: &D, w: usize, h: usize) -> Result<()> {
        let geometry = self.geometry.with_spatial(w, h)?;
        let plan = device.plan(&geometry)?;
        let output_dims = geometry.output_dims();
        self.output.try_resize("output", D::Float::ZERO, output_dims)?;
        self.delta.try_resize("delta", D::Float::ZERO, output_dims)?;
        if let Some(norm) = self.norm.as_mut() {
            norm.resize(output_dims)?;
        }
        self.quantization.resize(geometry.input_dims())?;
        debug!(
            "resized conv layer {} -> {}, workspace {} bytes",
            geometry.input_dims(),
            output_dims,
            device.workspace_size(&plan)
        );
        self.geometry = geometry;
        self.plan = plan;
        Ok(())
    }

    fn workspace_size(&self, device: &D) -> usize {
        device.workspace_size(&self.plan)
    }

    fn input_dims(&self) -> Dim4 {
        self.geometry.input_dims()
    }

    fn output_dims(&self) -> Dim4 {
        self.geometry.output_dims()
    }
}
