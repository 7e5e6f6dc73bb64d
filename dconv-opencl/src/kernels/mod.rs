#[cfg(test)]
mod test;

use crate::util::{create_kernel, create_program, next_multiple, to_uint, validate, wrap_cl_error, Result};
use const_format::formatcp;
use dconv::unfold::PatchGeometry;
use once_cell::sync::Lazy;
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::Buffer;
use opencl3::program::Program;
use opencl3::types::{cl_float, cl_uint};

pub(crate) const FLOAT_BITS: usize = 32;
pub(crate) const GEMM_TILE_SIZE: usize = 8;

const DEFINES: &str = formatcp!("#define FLOAT_BITS {}\n", FLOAT_BITS);

pub(crate) static SOURCE: Lazy<String> = Lazy::new(|| {
    [
        DEFINES,
        include_str!("types.cl"),
        include_str!("unfold.cl"),
        include_str!("gemm.cl"),
    ]
    .join("\n")
});

/// A row-major matrix stored at `offset` inside a device buffer.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Matrix<'a> {
    pub buffer: &'a Buffer<cl_float>,
    pub offset: usize,
    /// Elements between the starts of consecutive rows.
    pub ld: usize,
    pub trans: bool,
}

impl<'a> Matrix<'a> {
    pub fn new(buffer: &'a Buffer<cl_float>, offset: usize, ld: usize) -> Self {
        Matrix {
            buffer,
            offset,
            ld,
            trans: false,
        }
    }

    pub fn transposed(mut self) -> Self {
        self.trans = true;
        self
    }
}

#[derive(Debug)]
pub(crate) struct ConvKernels {
    #[allow(unused)]
    program: Program,
    unfold: Kernel,
    fold: Kernel,
    gemm: Kernel,
}

impl ConvKernels {
    pub fn create(context: &Context) -> Result<Self> {
        let program = create_program(context, SOURCE.as_str(), "")?;
        let unfold = create_kernel(&program, "unfold")?;
        let fold = create_kernel(&program, "fold")?;
        let gemm = create_kernel(&program, "gemm")?;
        Ok(ConvKernels {
            program,
            unfold,
            fold,
            gemm,
        })
    }

    /// Writes the column matrix of the image group starting at `image_offset` into `columns`.
    pub fn unfold(
        &self,
        queue: &CommandQueue,
        patch: &PatchGeometry,
        image: &Buffer<cl_float>,
        image_offset: usize,
        columns: &Buffer<cl_float>,
    ) -> Result<()> {
        let n = patch.len();
        validate!(n > 0, "empty column matrix");
        let mut exec = ExecuteKernel::new(&self.unfold);
        unsafe {
            exec.set_arg(&to_uint(n)?)
                .set_arg(image)
                .set_arg(&to_uint(image_offset)?)
                .set_arg(&to_uint(patch.h)?)
                .set_arg(&to_uint(patch.w)?)
                .set_arg(&to_uint(patch.size)?)
                .set_arg(&to_uint(patch.stride)?)
                .set_arg(&to_uint(patch.pad)?)
                .set_arg(&to_uint(patch.dilate_rate)?)
                .set_arg(&to_uint(patch.out_h)?)
                .set_arg(&to_uint(patch.out_w)?)
                .set_arg(columns);
        }
        exec.set_global_work_size(n);
        wrap_cl_error!(unsafe { exec.enqueue_nd_range(queue) }, "Failed to enqueue unfold kernel")?;
        Ok(())
    }

    /// Adds the column matrix back onto the image group starting at `image_offset`.
    pub fn fold(
        &self,
        queue: &CommandQueue,
        patch: &PatchGeometry,
        columns: &Buffer<cl_float>,
        image: &Buffer<cl_float>,
        image_offset: usize,
    ) -> Result<()> {
        let n = patch.channels * patch.h * patch.w;
        validate!(n > 0, "empty image");
        let mut exec = ExecuteKernel::new(&self.fold);
        unsafe {
            exec.set_arg(&to_uint(n)?)
                .set_arg(columns)
                .set_arg(&to_uint(patch.h)?)
                .set_arg(&to_uint(patch.w)?)
                .set_arg(&to_uint(patch.size)?)
                .set_arg(&to_uint(patch.stride)?)
                .set_arg(&to_uint(patch.pad)?)
                .set_arg(&to_uint(patch.dilate_rate)?)
                .set_arg(&to_uint(patch.out_h)?)
                .set_arg(&to_uint(patch.out_w)?)
                .set_arg(image)
                .set_arg(&to_uint(image_offset)?);
        }
        exec.set_global_work_size(n);
        wrap_cl_error!(unsafe { exec.enqueue_nd_range(queue) }, "Failed to enqueue fold kernel")?;
        Ok(())
    }

    /// `c = alpha * op(a) * op(b) + beta * c` where `op(a)` is `m x k` and `op(b)` is `k x n`.
    #[allow(clippy::too_many_arguments)]
    pub fn gemm(
        &self,
        queue: &CommandQueue,
        m: usize,
        n: usize,
        k: usize,
        alpha: cl_float,
        a: Matrix<'_>,
        b: Matrix<'_>,
        beta: cl_float,
        c: Matrix<'_>,
    ) -> Result<()> {
        validate!(m > 0 && n > 0 && k > 0, "empty matrix product");
        validate!(!c.trans, "the output matrix cannot be transposed");
        let mut exec = ExecuteKernel::new(&self.gemm);
        unsafe {
            exec.set_arg(&(a.trans as cl_uint))
                .set_arg(&(b.trans as cl_uint))
                .set_arg(&to_uint(m)?)
                .set_arg(&to_uint(n)?)
                .set_arg(&to_uint(k)?)
                .set_arg(&alpha)
                .set_arg(a.buffer)
                .set_arg(&to_uint(a.offset)?)
                .set_arg(&to_uint(a.ld)?)
                .set_arg(b.buffer)
                .set_arg(&to_uint(b.offset)?)
                .set_arg(&to_uint(b.ld)?)
                .set_arg(&beta)
                .set_arg(c.buffer)
                .set_arg(&to_uint(c.offset)?)
                .set_arg(&to_uint(c.ld)?);
        }
        exec.set_global_work_sizes(&[next_multiple(m, GEMM_TILE_SIZE), next_multiple(n, GEMM_TILE_SIZE)])
            .set_local_work_sizes(&[GEMM_TILE_SIZE, GEMM_TILE_SIZE]);
        wrap_cl_error!(unsafe { exec.enqueue_nd_range(queue) }, "Failed to enqueue gemm kernel")?;
        Ok(())
    }
}
