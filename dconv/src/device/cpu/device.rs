use super::math::DTypeOps;
use crate::device::ConvDevice;
use crate::error::{check_capacity, check_len, Result};
use crate::geometry::ConvGeometry;
use crate::tensor::{Dim2, TensorView, TensorViewMut};
use crate::unfold::{fold, unfold, PatchGeometry};
use log::debug;
use std::marker::PhantomData;
use std::mem;

/// The reference device: unfold followed by a GEMM per image and group, on the host.
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuDevice<F: DTypeOps> {
    _float: PhantomData<F>,
}

impl<F: DTypeOps> CpuDevice<F> {
    pub fn new() -> Self {
        CpuDevice { _float: PhantomData }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CpuPlan {
    patch: PatchGeometry,
    /// Whether the column matrix is the input itself and unfolding can be skipped.
    identity: bool,
}

impl CpuPlan {
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    #[inline]
    pub fn workspace_len(&self) -> usize {
        if self.identity { 0 } else { self.patch.len() }
    }
}

fn check_buffers<F>(geometry: &ConvGeometry, weights: &[F], input: &[F], output_len: usize) -> Result<()> {
    check_len("weights", geometry.nweights(), weights.len())?;
    check_len("input", geometry.batch * geometry.inputs(), input.len())?;
    check_len("output", geometry.batch * geometry.outputs(), output_len)
}

impl<F: DTypeOps> ConvDevice for CpuDevice<F> {
    type Float = F;
    type Plan = CpuPlan;

    fn plan(&self, geometry: &ConvGeometry) -> Result<CpuPlan> {
        let patch = geometry.patch();
        let plan = CpuPlan {
            patch,
            identity: patch.is_identity(),
        };
        debug!(
            "cpu<{}> plan: {}x{} columns per group, identity={}",
            F::NAME,
            patch.rows(),
            patch.cols(),
            plan.identity
        );
        Ok(plan)
    }

    fn workspace_size(&self, plan: &CpuPlan) -> usize {
        plan.workspace_len() * mem::size_of::<F>()
    }

    fn forward(
        &self,
        plan: &mut CpuPlan,
        geometry: &ConvGeometry,
        weights: &[F],
        input: &[F],
        workspace: &mut [F],
        output: &mut [F],
    ) -> Result<()> {
        check_buffers(geometry, weights, input, output.len())?;
        check_capacity("workspace", plan.workspace_len(), workspace.len())?;
        let m = geometry.group_filters();
        let k = geometry.kernel_len();
        let cols = geometry.spatial_out();
        let in_len = geometry.input_group_len();
        let out_len = geometry.output_group_len();
        let w_len = geometry.group_weight_len();

        for b in 0..geometry.batch {
            for g in 0..geometry.groups {
                let w_off = geometry.weight_group_offset(g);
                let in_off = geometry.input_group_offset(b, g);
                let out_off = geometry.output_group_offset(b, g);
                let a = TensorView::from_slice(&weights[w_off..w_off + w_len], Dim2(m, k));
                let image = &input[in_off..in_off + in_len];
                let columns = if plan.identity {
                    TensorView::from_slice(image, Dim2(k, cols))
                } else {
                    unfold(image, &plan.patch, workspace);
                    TensorView::from_slice(&workspace[..k * cols], Dim2(k, cols))
                };
                let mut c = TensorViewMut::from_slice(&mut output[out_off..out_off + out_len], Dim2(m, cols));
                F::matrix_multiply(F::ONE, &a, false, &columns, false, F::ZERO, &mut c);
            }
        }
        Ok(())
    }

    fn backward(
        &self,
        plan: &mut CpuPlan,
        geometry: &ConvGeometry,
        weights: &[F],
        input: &[F],
        delta: &[F],
        workspace: &mut [F],
        weight_updates: &mut [F],
        mut input_delta: Option<&mut [F]>,
    ) -> Result<()> {
        check_buffers(geometry, weights, input, delta.len())?;
        check_len("weight updates", geometry.nweights(), weight_updates.len())?;
        if let Some(input_delta) = input_delta.as_deref() {
            check_len("input delta", input.len(), input_delta.len())?;
        }
        check_capacity("workspace", plan.workspace_len(), workspace.len())?;
        let m = geometry.group_filters();
        let k = geometry.kernel_len();
        let cols = geometry.spatial_out();
        let in_len = geometry.input_group_len();
        let out_len = geometry.output_group_len();
        let w_len = geometry.group_weight_len();

        for b in 0..geometry.batch {
            for g in 0..geometry.groups {
                let w_off = geometry.weight_group_offset(g);
                let in_off = geometry.input_group_offset(b, g);
                let out_off = geometry.output_group_offset(b, g);
                let d = TensorView::from_slice(&delta[out_off..out_off + out_len], Dim2(m, cols));

                {
                    let image = &input[in_off..in_off + in_len];
                    let columns = if plan.identity {
                        TensorView::from_slice(image, Dim2(k, cols))
                    } else {
                        unfold(image, &plan.patch, workspace);
                        TensorView::from_slice(&workspace[..k * cols], Dim2(k, cols))
                    };
                    let mut wu = TensorViewMut::from_slice(&mut weight_updates[w_off..w_off + w_len], Dim2(m, k));
                    F::matrix_multiply(F::ONE, &d, false, &columns, true, F::ONE, &mut wu);
                }

                if let Some(input_delta) = input_delta.as_deref_mut() {
                    let a = TensorView::from_slice(&weights[w_off..w_off + w_len], Dim2(m, k));
                    let image_delta = &mut input_delta[in_off..in_off + in_len];
                    if plan.identity {
                        let mut dst = TensorViewMut::from_slice(image_delta, Dim2(k, cols));
                        F::matrix_multiply(F::ONE, &a, true, &d, false, F::ONE, &mut dst);
                    } else {
                        {
                            let mut dst = TensorViewMut::from_slice(&mut workspace[..k * cols], Dim2(k, cols));
                            F::matrix_multiply(F::ONE, &a, true, &d, false, F::ZERO, &mut dst);
                        }
                        fold(workspace, &plan.patch, image_delta);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::CpuDevice;
    use crate::device::ConvDevice;
    use crate::geometry::ConvGeometry;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f64> {
        StandardNormal.sample_iter(rng).take(len).collect()
    }

    /// Direct nested-loop grouped convolution, using the signed tap formula.
    fn brute_force(g: &ConvGeometry, weights: &[f64], input: &[f64]) -> Vec<f64> {
        let cg = g.group_channels();
        let mut out = vec![0.0; g.batch * g.outputs()];
        for b in 0..g.batch {
            for f in 0..g.n {
                let group = f / g.group_filters();
                for oy in 0..g.out_h {
                    for ox in 0..g.out_w {
                        let mut acc = 0.0;
                        for ci in 0..cg {
                            let c = group * cg + ci;
                            for ki in 0..g.size {
                                for kj in 0..g.size {
                                    let y = (oy * g.stride + ki * g.dilate_rate) as isize - g.pad as isize;
                                    let x = (ox * g.stride + kj * g.dilate_rate) as isize - g.pad as isize;
                                    if y < 0 || x < 0 || y as usize >= g.h || x as usize >= g.w {
                                        continue;
                                    }
                                    let w = weights[((f * cg + ci) * g.size + ki) * g.size + kj];
                                    acc += w * input[((b * g.c + c) * g.h + y as usize) * g.w + x as usize];
                                }
                            }
                        }
                        out[((b * g.n + f) * g.out_h + oy) * g.out_w + ox] = acc;
                    }
                }
            }
        }
        out
    }

    fn forward(g: &ConvGeometry, weights: &[f64], input: &[f64]) -> Vec<f64> {
        let device = CpuDevice::<f64>::new();
        let mut plan = device.plan(g).unwrap();
        let mut workspace = vec![0.0; g.workspace_len()];
        let mut output = vec![f64::NAN; g.batch * g.outputs()];
        device
            .forward(&mut plan, g, weights, input, &mut workspace, &mut output)
            .unwrap();
        output
    }

    #[test]
    fn test_forward_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x1234_5678);
        for g in [
            ConvGeometry::new(2, 9, 9, 1, 2, 1, 3, 2, 0, 2).unwrap(),
            ConvGeometry::new(2, 7, 6, 4, 6, 2, 3, 1, 1, 1).unwrap(),
            ConvGeometry::new(1, 12, 10, 6, 3, 3, 3, 1, 2, 2).unwrap(),
            ConvGeometry::new(3, 5, 5, 2, 4, 1, 1, 1, 0, 1).unwrap(),
            ConvGeometry::new(1, 8, 8, 2, 2, 2, 2, 2, 1, 3).unwrap(),
        ] {
            let weights = random_vec(&mut rng, g.nweights());
            let input = random_vec(&mut rng, g.batch * g.inputs());
            let actual = forward(&g, &weights, &input);
            let expected = brute_force(&g, &weights, &input);
            assert_abs_diff_eq!(actual.as_slice(), expected.as_slice(), epsilon = 1e-10);
        }
    }

    #[test]
    fn test_dilated_scenario() {
        let g = ConvGeometry::new(1, 9, 9, 1, 1, 1, 3, 2, 0, 2).unwrap();
        let weights = vec![1.0; 9];
        let mut input = vec![0.0; 81];
        for j in 0..9 {
            for i in 0..9 {
                input[i + 9 * j] = (i + 9 * j + 1) as f64;
            }
        }
        let actual = forward(&g, &weights, &input);
        let mut expected = vec![0.0; 4];
        for oy in 0..2 {
            for ox in 0..2 {
                for ki in 0..3 {
                    for kj in 0..3 {
                        expected[oy * 2 + ox] += input[(oy * 2 + ki * 2) * 9 + ox * 2 + kj * 2];
                    }
                }
            }
        }
        assert_eq!(actual, expected);
        // the top-left output sums rows 0, 2, 4 and columns 0, 2, 4 of the 1..=81 grid
        assert_eq!(actual[0], 9.0 * 21.0);
    }

    #[test]
    fn test_groups_match_block_diagonal_weights() {
        let mut rng = StdRng::seed_from_u64(0xfeed);
        let grouped = ConvGeometry::new(2, 6, 6, 4, 4, 2, 3, 1, 1, 1).unwrap();
        let single = ConvGeometry::new(2, 6, 6, 4, 4, 1, 3, 1, 1, 1).unwrap();
        let weights = random_vec(&mut rng, grouped.nweights());
        let input = random_vec(&mut rng, grouped.batch * grouped.inputs());

        // expand the grouped filters into full-depth filters with zeros outside their group
        let taps = 9;
        let mut dense = vec![0.0; single.nweights()];
        for f in 0..4 {
            let group = f / 2;
            for ci in 0..2 {
                let src = (f * 2 + ci) * taps;
                let dst = (f * 4 + group * 2 + ci) * taps;
                dense[dst..dst + taps].copy_from_slice(&weights[src..src + taps]);
            }
        }

        let actual = forward(&grouped, &weights, &input);
        let expected = forward(&single, &dense, &input);
        assert_abs_diff_eq!(actual.as_slice(), expected.as_slice(), epsilon = 1e-10);
    }

    fn loss_gradients(g: &ConvGeometry, weights: &[f64], input: &[f64], upstream: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let device = CpuDevice::<f64>::new();
        let mut plan = device.plan(g).unwrap();
        let mut workspace = vec![0.0; g.workspace_len()];
        let mut weight_updates = vec![0.0; g.nweights()];
        let mut input_delta = vec![0.0; input.len()];
        device
            .backward(
                &mut plan,
                g,
                weights,
                input,
                upstream,
                &mut workspace,
                &mut weight_updates,
                Some(&mut input_delta),
            )
            .unwrap();
        (weight_updates, input_delta)
    }

    fn loss(g: &ConvGeometry, weights: &[f64], input: &[f64], upstream: &[f64]) -> f64 {
        forward(g, weights, input).iter().zip(upstream).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(0xd1a7);
        for g in [
            ConvGeometry::new(2, 7, 7, 2, 4, 2, 3, 1, 1, 2).unwrap(),
            ConvGeometry::new(1, 6, 5, 3, 2, 1, 2, 2, 1, 1).unwrap(),
            ConvGeometry::new(2, 4, 4, 2, 3, 1, 1, 1, 0, 1).unwrap(),
        ] {
            let weights = random_vec(&mut rng, g.nweights());
            let input = random_vec(&mut rng, g.batch * g.inputs());
            let upstream = random_vec(&mut rng, g.batch * g.outputs());
            let (dw, dx) = loss_gradients(&g, &weights, &input, &upstream);
            let eps = 1e-6;

            for i in 0..weights.len() {
                let mut plus = weights.clone();
                plus[i] += eps;
                let mut minus = weights.clone();
                minus[i] -= eps;
                let numeric = (loss(&g, &plus, &input, &upstream) - loss(&g, &minus, &input, &upstream)) / (2.0 * eps);
                assert_abs_diff_eq!(dw[i], numeric, epsilon = 1e-6);
            }
            for i in 0..input.len() {
                let mut plus = input.clone();
                plus[i] += eps;
                let mut minus = input.clone();
                minus[i] -= eps;
                let numeric = (loss(&g, &weights, &plus, &upstream) - loss(&g, &weights, &minus, &upstream)) / (2.0 * eps);
                assert_abs_diff_eq!(dx[i], numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_backward_accumulates() {
        let mut rng = StdRng::seed_from_u64(0xacc);
        let g = ConvGeometry::new(1, 5, 5, 2, 2, 1, 3, 1, 1, 1).unwrap();
        let weights = random_vec(&mut rng, g.nweights());
        let input = random_vec(&mut rng, g.inputs());
        let upstream = random_vec(&mut rng, g.outputs());
        let (once_w, once_x) = loss_gradients(&g, &weights, &input, &upstream);

        let device = CpuDevice::<f64>::new();
        let mut plan = device.plan(&g).unwrap();
        let mut workspace = vec![0.0; g.workspace_len()];
        let mut weight_updates = once_w.clone();
        let mut input_delta = once_x.clone();
        device
            .backward(
                &mut plan,
                &g,
                &weights,
                &input,
                &upstream,
                &mut workspace,
                &mut weight_updates,
                Some(&mut input_delta),
            )
            .unwrap();
        for (twice, once) in weight_updates.iter().zip(&once_w) {
            assert_abs_diff_eq!(*twice, 2.0 * once, epsilon = 1e-12);
        }
        for (twice, once) in input_delta.iter().zip(&once_x) {
            assert_abs_diff_eq!(*twice, 2.0 * once, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_undersized_workspace_is_rejected() {
        let g = ConvGeometry::new(1, 5, 5, 1, 1, 1, 3, 1, 1, 1).unwrap();
        let device = CpuDevice::<f32>::new();
        let mut plan = device.plan(&g).unwrap();
        assert_eq!(device.workspace_size(&plan), g.workspace_size::<f32>());
        let mut workspace = vec![0f32; g.workspace_len() - 1];
        let mut output = vec![0f32; g.outputs()];
        let result = device.forward(&mut plan, &g, &[0.0; 9], &[0.0; 25], &mut workspace, &mut output);
        assert!(result.is_err());
    }
}
