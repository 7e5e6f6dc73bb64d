mod dilated_conv;

use crate::device::ConvDevice;
use crate::error::Result;
use crate::net::initializer::Initializer;
use crate::net::NetState;
use crate::optimizer::UpdateArgs;
use crate::tensor::Dim4;
use std::fmt::Debug;

pub use dilated_conv::{DilatedConvLayer, DilatedConvParams, DilatedConvParamsBuilder, DilatedConvParamsBuilderError};

pub trait LayerParams<D: ConvDevice>: Clone + Debug {
    type Layer: Layer<D>;

    fn create_layer(
        &self,
        device: &D,
        input: Dim4,
        initializer: &mut dyn Initializer<D::Float>,
    ) -> Result<Self::Layer>;
}

pub trait Layer<D: ConvDevice>: Debug {
    /// Computes the layer output from `net.input`.
    fn forward(&mut self, device: &D, net: &mut NetState<'_, D::Float>) -> Result<()>;

    /// Turns the gradient accumulated in the layer's delta into parameter gradients and, when
    /// `net.delta` is present, adds the gradient with respect to the input to it.
    fn backward(&mut self, device: &D, net: &mut NetState<'_, D::Float>) -> Result<()>;

    fn update(&mut self, args: &UpdateArgs) -> Result<()>;

    /// Adapts the layer to input images of a new spatial size, keeping its parameters.
    fn resize(&mut self, device: &D, w: usize, h: usize) -> Result<()>;

    /// Bytes of shared workspace the layer needs.
    fn workspace_size(&self, device: &D) -> usize;

    fn input_dims(&self) -> Dim4;
    fn output_dims(&self) -> Dim4;
}
