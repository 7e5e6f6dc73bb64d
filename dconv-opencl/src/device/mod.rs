
use crate::kernels::{ConvKernels, Matrix};
use crate::util::{self, wrap_cl_error, Result};
use dconv::device::ConvDevice;
use dconv::error::check_len;
use dconv::geometry::ConvGeometry;
use log::{debug, info};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::Device;
use opencl3::memory::{Buffer, CL_MEM_READ_WRITE};
use opencl3::types::{cl_float, CL_BLOCKING};
use std::{mem, ptr};

/// Runs the convolution core on an OpenCL device in single precision.
///
/// Every call uploads its operands, runs unfold and gemm kernels per image and group on an
/// in-order queue and reads the results back, so the host side contract is the same as for
/// [`dconv::device::CpuDevice`]. The column matrix lives on the device and the host
/// workspace goes unused.
#[derive(Debug)]
pub struct OpenCLDevice {
    device: Device,
    context: Context,
    queue: CommandQueue,
    kernels: ConvKernels,
}

/// Device buffers sized for one layer geometry.
#[derive(Debug)]
pub struct OpenCLPlan {
    geometry: ConvGeometry,
    weights: Buffer<cl_float>,
    input: Buffer<cl_float>,
    /// Holds the output in forward passes and the output gradient in backward passes.
    output: Buffer<cl_float>,
    columns: Buffer<cl_float>,
    weight_updates: Buffer<cl_float>,
    input_delta: Buffer<cl_float>,
}

impl OpenCLPlan {
    #[inline]
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Bytes held on the device.
    pub fn device_size(&self) -> usize {
        let g = &self.geometry;
        let elements = 2 * g.nweights() + 2 * g.batch * g.inputs() + g.batch * g.outputs() + g.workspace_len();
        elements * mem::size_of::<cl_float>()
    }

    fn check(&self, geometry: &ConvGeometry) -> dconv::Result<()> {
        if self.geometry == *geometry {
            Ok(())
        } else {
            Err(dconv::Error::InvalidGeometry(format!(
                "plan was built for input {} -> {} but used with {} -> {}",
                self.geometry.input_dims(),
                self.geometry.output_dims(),
                geometry.input_dims(),
                geometry.output_dims()
            )))
        }
    }
}

fn create_buffer(context: &Context, len: usize, what: &str) -> Result<Buffer<cl_float>> {
    let buffer = unsafe { Buffer::<cl_float>::create(context, CL_MEM_READ_WRITE, len.max(1), ptr::null_mut()) };
    wrap_cl_error!(buffer, "Failed to create {what} buffer of {len} elements")
}

impl OpenCLDevice {
    pub fn from_default_device() -> Result<Self> {
        Self::from_device(util::get_default_device()?)
    }

    pub fn from_device(device: Device) -> Result<Self> {
        let context = util::get_context(&device)?;
        let queue = util::create_queue(&context)?;
        let kernels = ConvKernels::create(&context)?;
        match device.name() {
            Ok(name) => info!("using OpenCL device {name}"),
            Err(err) => debug!("using unnamed OpenCL device ({err})"),
        }
        Ok(OpenCLDevice {
            device,
            context,
            queue,
            kernels,
        })
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[inline]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    fn write(&self, buffer: &mut Buffer<cl_float>, src: &[cl_float]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        wrap_cl_error!(
            unsafe { self.queue.enqueue_write_buffer(buffer, CL_BLOCKING, 0, src, &[]) },
            "Failed to enqueue buffer write"
        )?;
        Ok(())
    }

    fn read(&self, buffer: &Buffer<cl_float>, dst: &mut [cl_float]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        wrap_cl_error!(
            unsafe { self.queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, dst, &[]) },
            "Failed to enqueue buffer read"
        )?;
        Ok(())
    }
}

impl ConvDevice for OpenCLDevice {
    type Float = cl_float;
    type Plan = OpenCLPlan;

    fn plan(&self, geometry: &ConvGeometry) -> dconv::Result<OpenCLPlan> {
        geometry.validate()?;
        let input_len = geometry.batch * geometry.inputs();
        let plan = OpenCLPlan {
            geometry: *geometry,
            weights: create_buffer(&self.context, geometry.nweights(), "weights")?,
            input: create_buffer(&self.context, input_len, "input")?,
            output: create_buffer(&self.context, geometry.batch * geometry.outputs(), "output")?,
            columns: create_buffer(&self.context, geometry.workspace_len(), "columns")?,
            weight_updates: create_buffer(&self.context, geometry.nweights(), "weight updates")?,
            input_delta: create_buffer(&self.context, input_len, "input delta")?,
        };
        debug!(
            "opencl plan for {} -> {}: {} device bytes",
            geometry.input_dims(),
            geometry.output_dims(),
            plan.device_size()
        );
        Ok(plan)
    }

    fn workspace_size(&self, _plan: &OpenCLPlan) -> usize {
        0
    }

    fn forward(
        &self,
        plan: &mut OpenCLPlan,
        geometry: &ConvGeometry,
        weights: &[cl_float],
        input: &[cl_float],
        _workspace: &mut [cl_float],
        output: &mut [cl_float],
    ) -> dconv::Result<()> {
        plan.check(geometry)?;
        check_len("weights", geometry.nweights(), weights.len())?;
        check_len("input", geometry.batch * geometry.inputs(), input.len())?;
        check_len("output", geometry.batch * geometry.outputs(), output.len())?;
        self.write(&mut plan.weights, weights)?;
        self.write(&mut plan.input, input)?;

        let patch = geometry.patch();
        let (m, k, cols) = (geometry.group_filters(), geometry.kernel_len(), patch.cols());
        for b in 0..geometry.batch {
            for g in 0..geometry.groups {
                self.kernels
                    .unfold(&self.queue, &patch, &plan.input, geometry.input_group_offset(b, g), &plan.columns)?;
                self.kernels.gemm(
                    &self.queue,
                    m,
                    cols,
                    k,
                    1.0,
                    Matrix::new(&plan.weights, geometry.weight_group_offset(g), k),
                    Matrix::new(&plan.columns, 0, cols),
                    0.0,
                    Matrix::new(&plan.output, geometry.output_group_offset(b, g), cols),
                )?;
            }
        }
        self.read(&plan.output, output)?;
        Ok(())
    }

    fn backward(
        &self,
        plan: &mut OpenCLPlan,
        geometry: &ConvGeometry,
        weights: &[cl_float],
        input: &[cl_float],
        delta: &[cl_float],
        _workspace: &mut [cl_float],
        weight_updates: &mut [cl_float],
        input_delta: Option<&mut [cl_float]>,
    ) -> dconv::Result<()> {
        plan.check(geometry)?;
        let input_len = geometry.batch * geometry.inputs();
        check_len("weights", geometry.nweights(), weights.len())?;
        check_len("input", input_len, input.len())?;
        check_len("delta", geometry.batch * geometry.outputs(), delta.len())?;
        check_len("weight updates", geometry.nweights(), weight_updates.len())?;
        if let Some(input_delta) = input_delta.as_deref() {
            check_len("input delta", input_len, input_delta.len())?;
            self.write(&mut plan.input_delta, input_delta)?;
        }
        self.write(&mut plan.weights, weights)?;
        self.write(&mut plan.input, input)?;
        self.write(&mut plan.output, delta)?;
        self.write(&mut plan.weight_updates, weight_updates)?;

        let patch = geometry.patch();
        let (m, k, cols) = (geometry.group_filters(), geometry.kernel_len(), patch.cols());
        for b in 0..geometry.batch {
            for g in 0..geometry.groups {
                let delta_offset = geometry.output_group_offset(b, g);
                let weight_offset = geometry.weight_group_offset(g);
                self.kernels
                    .unfold(&self.queue, &patch, &plan.input, geometry.input_group_offset(b, g), &plan.columns)?;
                self.kernels.gemm(
                    &self.queue,
                    m,
                    k,
                    cols,
                    1.0,
                    Matrix::new(&plan.output, delta_offset, cols),
                    Matrix::new(&plan.columns, 0, cols).transposed(),
                    1.0,
                    Matrix::new(&plan.weight_updates, weight_offset, k),
                )?;
                if input_delta.is_some() {
                    self.kernels.gemm(
                        &self.queue,
                        k,
                        cols,
                        m,
                        1.0,
                        Matrix::new(&plan.weights, weight_offset, k).transposed(),
                        Matrix::new(&plan.output, delta_offset, cols),
                        0.0,
                        Matrix::new(&plan.columns, 0, cols),
                    )?;
                    self.kernels
                        .fold(&self.queue, &patch, &plan.columns, &plan.input_delta, geometry.input_group_offset(b, g))?;
                }
            }
        }
        self.read(&plan.weight_updates, weight_updates)?;
        if let Some(input_delta) = input_delta {
            self.read(&plan.input_delta, input_delta)?;
        }
        Ok(())
    }
}
