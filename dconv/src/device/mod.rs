use crate::error::Result;
use crate::geometry::ConvGeometry;
use std::fmt::Debug;

pub mod cpu;

pub use cpu::*;

/// A strategy for running the grouped convolution core on some compute device.
///
/// A device is stateless apart from its context. Everything that depends on the layer geometry
/// (algorithm choice, device side buffers) lives in the [`ConvDevice::Plan`], which the layer
/// creates at construction and re-creates whenever its input geometry changes.
pub trait ConvDevice: Debug {
    type Float: DTypeOps;
    type Plan: Debug;

    fn plan(&self, geometry: &ConvGeometry) -> Result<Self::Plan>;

    /// Bytes of host scratch the plan needs from the network's shared workspace.
    fn workspace_size(&self, plan: &Self::Plan) -> usize;

    /// Writes the raw convolution of `input` with `weights` into `output`, overwriting it.
    #[allow(clippy::too_many_arguments)]
    fn forward(
        &self,
        plan: &mut Self::Plan,
        geometry: &ConvGeometry,
        weights: &[Self::Float],
        input: &[Self::Float],
        workspace: &mut [Self::Float],
        output: &mut [Self::Float],
    ) -> Result<()>;

    /// Accumulates the weight gradient of `delta` into `weight_updates` and, when
    /// `input_delta` is given, accumulates the gradient with respect to the input into it.
    #[allow(clippy::too_many_arguments)]
    fn backward(
        &self,
        plan: &mut Self::Plan,
        geometry: &ConvGeometry,
        weights: &[Self::Float],
        input: &[Self::Float],
        delta: &[Self::Float],
        workspace: &mut [Self::Float],
        weight_updates: &mut [Self::Float],
        input_delta: Option<&mut [Self::Float]>,
    ) -> Result<()>;
}
