use super::{ConvKernels, Matrix, SOURCE};
use crate::util::{create_test_context, TestContext};
use approx::assert_abs_diff_eq;
use dconv::unfold::{unfold, PatchGeometry};
use opencl3::memory::{Buffer, CL_MEM_READ_WRITE};
use opencl3::types::{cl_float, CL_BLOCKING};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::ptr;

fn buffer_from(ctx: &TestContext, data: &[cl_float]) -> Buffer<cl_float> {
    let mut buffer =
        unsafe { Buffer::<cl_float>::create(&ctx.context, CL_MEM_READ_WRITE, data.len(), ptr::null_mut()).unwrap() };
    unsafe { ctx.queue.enqueue_write_buffer(&mut buffer, CL_BLOCKING, 0, data, &[]).unwrap() };
    buffer
}

fn read_back(ctx: &TestContext, buffer: &Buffer<cl_float>, len: usize) -> Vec<cl_float> {
    let mut out = vec![0.0; len];
    unsafe { ctx.queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, &mut out, &[]).unwrap() };
    out
}

fn random_vec(rng: &mut StdRng, len: usize) -> Vec<cl_float> {
    StandardNormal.sample_iter(rng).take(len).collect()
}

#[test]
fn test_source_is_complete() {
    assert!(SOURCE.starts_with("#define FLOAT_BITS 32\n"));
    for name in ["__kernel void unfold(", "__kernel void fold(", "__kernel void gemm("] {
        assert!(SOURCE.contains(name), "missing {name}");
    }
}

#[test]
#[ignore = "requires an OpenCL device"]
fn test_gemm_transposes() {
    let ctx = create_test_context().unwrap();
    let kernels = ConvKernels::create(&ctx.context).unwrap();
    let mut rng = StdRng::seed_from_u64(0x9e33);
    let (m, n, k) = (13, 21, 9);
    for (ta, tb) in [(false, false), (true, false), (false, true), (true, true)] {
        let a = random_vec(&mut rng, m * k);
        let b = random_vec(&mut rng, k * n);
        let c = random_vec(&mut rng, m * n);
        let (lda, ldb) = (if ta { m } else { k }, if tb { k } else { n });
        let mut expected = c.iter().map(|v| 0.5 * v).collect::<Vec<_>>();
        for i in 0..m {
            for j in 0..n {
                for p in 0..k {
                    let av = if ta { a[p * lda + i] } else { a[i * lda + p] };
                    let bv = if tb { b[j * ldb + p] } else { b[p * ldb + j] };
                    expected[i * n + j] += 2.0 * av * bv;
                }
            }
        }
        let (a_buf, b_buf, c_buf) = (buffer_from(&ctx, &a), buffer_from(&ctx, &b), buffer_from(&ctx, &c));
        let mut a_mat = Matrix::new(&a_buf, 0, lda);
        let mut b_mat = Matrix::new(&b_buf, 0, ldb);
        a_mat.trans = ta;
        b_mat.trans = tb;
        kernels
            .gemm(&ctx.queue, m, n, k, 2.0, a_mat, b_mat, 0.5, Matrix::new(&c_buf, 0, n))
            .unwrap();
        let actual = read_back(&ctx, &c_buf, m * n);
        for (a, e) in actual.iter().zip(&expected) {
            assert_abs_diff_eq!(a, e, epsilon = 1e-4);
        }
    }
}

#[test]
#[ignore = "requires an OpenCL device"]
fn test_unfold_matches_host() {
    let ctx = create_test_context().unwrap();
    let kernels = ConvKernels::create(&ctx.context).unwrap();
    let mut rng = StdRng::seed_from_u64(0x0f01);
    let patch = PatchGeometry {
        channels: 3,
        h: 9,
        w: 7,
        size: 3,
        stride: 2,
        pad: 2,
        dilate_rate: 2,
        out_h: 5,
        out_w: 4,
    };
    // two images so the kernel has to honour the offset
    let image = random_vec(&mut rng, 2 * 3 * 9 * 7);
    let offset = 3 * 9 * 7;
    let mut expected = vec![0.0; patch.len()];
    unfold(&image[offset..], &patch, &mut expected);

    let image_buf = buffer_from(&ctx, &image);
    let columns = buffer_from(&ctx, &vec![f32::NAN; patch.len()]);
    kernels.unfold(&ctx.queue, &patch, &image_buf, offset, &columns).unwrap();
    assert_eq!(read_back(&ctx, &columns, patch.len()), expected);
}
