#[macro_use]
extern crate bencher;

use bencher::Bencher;
use dconv::device::{ConvDevice, CpuDevice};
use dconv::util::bench::*;

macro_rules! impl_bench {
    ($name:ident, $ty:ty, $geometry:expr) => {
        fn $name(bench: &mut Bencher) {
            let device = CpuDevice::<$ty>::new();
            let geometry = get_geometry($geometry).unwrap();
            let mut plan = device.plan(&geometry).unwrap();
            let [weights, input, mut workspace, mut output] = get_conv_buffers::<$ty>(&geometry);
            bench.iter(|| {
                device
                    .forward(
                        &mut plan,
                        &geometry,
                        weights.as_slice(),
                        input.as_slice(),
                        workspace.as_mut_slice(),
                        output.as_mut_slice(),
                    )
                    .unwrap()
            })
        }
    };
}

impl_bench!(cpu_f32_lg, f32, GEOMETRY_LG);
impl_bench!(cpu_f32_md, f32, GEOMETRY_MD);
impl_bench!(cpu_f32_sm, f32, GEOMETRY_SM);
impl_bench!(cpu_f32_grouped, f32, GEOMETRY_GROUPED);
benchmark_group!(cpu_f32, cpu_f32_lg, cpu_f32_md, cpu_f32_sm, cpu_f32_grouped);

impl_bench!(cpu_f64_md, f64, GEOMETRY_MD);
impl_bench!(cpu_f64_sm, f64, GEOMETRY_SM);
benchmark_group!(cpu_f64, cpu_f64_md, cpu_f64_sm);

benchmark_main!(cpu_f32, cpu_f64);
