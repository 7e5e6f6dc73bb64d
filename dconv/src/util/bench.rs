use crate::error::Result;
use crate::geometry::ConvGeometry;
use crate::tensor::{Dim1, Tensor1};
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::StandardNormal;

const SEED: u64 = 0x8371943;

/// `(batch, h, w, c, n, groups, size, stride, pad, dilate_rate)`
pub type GeometryArgs = (usize, usize, usize, usize, usize, usize, usize, usize, usize, usize);

pub const GEOMETRY_LG: GeometryArgs = (1, 104, 104, 128, 128, 1, 3, 1, 2, 2);
pub const GEOMETRY_MD: GeometryArgs = (4, 52, 52, 64, 64, 1, 3, 1, 2, 2);
pub const GEOMETRY_SM: GeometryArgs = (8, 26, 26, 32, 32, 1, 3, 1, 4, 4);
pub const GEOMETRY_GROUPED: GeometryArgs = (4, 52, 52, 64, 64, 8, 3, 1, 2, 2);

pub fn get_geometry(args: GeometryArgs) -> Result<ConvGeometry> {
    let (batch, h, w, c, n, groups, size, stride, pad, dilate_rate) = args;
    ConvGeometry::new(batch, h, w, c, n, groups, size, stride, pad, dilate_rate)
}

/// Random weights and input for `geometry` plus a zeroed workspace and output.
pub fn get_conv_buffers<T>(geometry: &ConvGeometry) -> [Tensor1<T>; 4]
where
    T: Clone + num_traits::Zero,
    StandardNormal: Distribution<T>,
{
    let mut rng = StdRng::seed_from_u64(SEED);
    [
        Tensor1::from_distribution(&mut rng, StandardNormal, Dim1(geometry.nweights())),
        Tensor1::from_distribution(&mut rng, StandardNormal, Dim1(geometry.batch * geometry.inputs())),
        Tensor1::zeroed(Dim1(geometry.workspace_len())),
        Tensor1::zeroed(Dim1(geometry.batch_len())),
    ]
}
