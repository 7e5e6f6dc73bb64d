use crate::error::{Error, Result};
use crate::tensor::{Dim4, Dims};
use crate::unfold::PatchGeometry;
use std::mem;

/// Shape of a grouped, dilated 2-D convolution over a batch of images.
///
/// Inputs are laid out as `(batch, c, h, w)`, outputs as `(batch, n, out_h, out_w)` and
/// weights as `(n, c / groups, size, size)`, all row-major.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConvGeometry {
    pub batch: usize,
    pub h: usize,
    pub w: usize,
    pub c: usize,
    pub n: usize,
    pub groups: usize,
    pub size: usize,
    pub stride: usize,
    pub pad: usize,
    pub dilate_rate: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl ConvGeometry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batch: usize,
        h: usize,
        w: usize,
        c: usize,
        n: usize,
        groups: usize,
        size: usize,
        stride: usize,
        pad: usize,
        dilate_rate: usize,
    ) -> Result<Self> {
        let mut geometry = ConvGeometry {
            batch,
            h,
            w,
            c,
            n,
            groups,
            size,
            stride,
            pad,
            dilate_rate,
            out_h: 0,
            out_w: 0,
        };
        geometry.validate()?;
        geometry.out_h = geometry.out_dim(h)?;
        geometry.out_w = geometry.out_dim(w)?;
        Ok(geometry)
    }

    /// The same convolution applied to input images of a different spatial size.
    pub fn with_spatial(&self, w: usize, h: usize) -> Result<Self> {
        Self::new(
            self.batch,
            h,
            w,
            self.c,
            self.n,
            self.groups,
            self.size,
            self.stride,
            self.pad,
            self.dilate_rate,
        )
    }

    /// Rejects configurations whose groups or dimensions cannot describe a convolution.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("batch", self.batch),
            ("h", self.h),
            ("w", self.w),
            ("c", self.c),
            ("n", self.n),
            ("groups", self.groups),
            ("size", self.size),
            ("stride", self.stride),
            ("dilate_rate", self.dilate_rate),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidGeometry(format!("{name} must be positive")));
        }
        if self.c % self.groups != 0 {
            return Err(Error::InvalidGeometry(format!(
                "groups ({}) must divide input channels ({})",
                self.groups, self.c
            )));
        }
        if self.n % self.groups != 0 {
            return Err(Error::InvalidGeometry(format!(
                "groups ({}) must divide filters ({})",
                self.groups, self.n
            )));
        }
        Ok(())
    }

    /// Effective kernel span used for the output geometry.
    #[inline]
    pub fn dsize(&self) -> usize {
        (self.dilate_rate - 1) * (self.size + 1) + self.size
    }

    /// `(in_dim + 2 * pad - dsize) / stride + 1`, rejecting spans that do not fit the padded input.
    pub fn out_dim(&self, in_dim: usize) -> Result<usize> {
        let padded = in_dim + 2 * self.pad;
        let dsize = self.dsize();
        if padded < dsize {
            return Err(Error::InvalidGeometry(format!(
                "effective kernel span {dsize} exceeds padded input {padded}"
            )));
        }
        Ok((padded - dsize) / self.stride + 1)
    }

    #[inline]
    pub fn group_channels(&self) -> usize {
        self.c / self.groups
    }

    #[inline]
    pub fn group_filters(&self) -> usize {
        self.n / self.groups
    }

    /// Length of one filter, which is also the contraction length of the group GEMM.
    #[inline]
    pub fn kernel_len(&self) -> usize {
        self.size * self.size * self.group_channels()
    }

    #[inline]
    pub fn nweights(&self) -> usize {
        self.kernel_len() * self.n
    }

    #[inline]
    pub fn nbiases(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn group_weight_len(&self) -> usize {
        self.nweights() / self.groups
    }

    #[inline]
    pub fn spatial_in(&self) -> usize {
        self.h * self.w
    }

    #[inline]
    pub fn spatial_out(&self) -> usize {
        self.out_h * self.out_w
    }

    /// Input elements per image.
    #[inline]
    pub fn inputs(&self) -> usize {
        self.c * self.spatial_in()
    }

    /// Output elements per image.
    #[inline]
    pub fn outputs(&self) -> usize {
        self.n * self.spatial_out()
    }

    #[inline]
    pub fn input_dims(&self) -> Dim4 {
        Dim4(self.batch, self.c, self.h, self.w)
    }

    #[inline]
    pub fn output_dims(&self) -> Dim4 {
        Dim4(self.batch, self.n, self.out_h, self.out_w)
    }

    #[inline]
    pub fn weight_dims(&self) -> Dim4 {
        Dim4(self.n, self.group_channels(), self.size, self.size)
    }

    #[inline]
    pub fn input_group_offset(&self, b: usize, g: usize) -> usize {
        self.input_dims().offset(b, g * self.group_channels(), 0, 0)
    }

    #[inline]
    pub fn input_group_len(&self) -> usize {
        self.group_channels() * self.spatial_in()
    }

    #[inline]
    pub fn output_group_offset(&self, b: usize, g: usize) -> usize {
        self.output_dims().offset(b, g * self.group_filters(), 0, 0)
    }

    #[inline]
    pub fn output_group_len(&self) -> usize {
        self.group_filters() * self.spatial_out()
    }

    #[inline]
    pub fn weight_group_offset(&self, g: usize) -> usize {
        g * self.group_weight_len()
    }

    /// The unfold geometry of a single group of a single image.
    #[inline]
    pub fn patch(&self) -> PatchGeometry {
        PatchGeometry {
            channels: self.group_channels(),
            h: self.h,
            w: self.w,
            size: self.size,
            stride: self.stride,
            pad: self.pad,
            dilate_rate: self.dilate_rate,
            out_h: self.out_h,
            out_w: self.out_w,
        }
    }

    /// Scratch elements needed to hold the unfolded columns of one group of one image.
    #[inline]
    pub fn workspace_len(&self) -> usize {
        self.patch().len()
    }

    #[inline]
    pub fn workspace_size<F>(&self) -> usize {
        self.workspace_len() * mem::size_of::<F>()
    }

    /// Floating point operations of one forward pass over a single image.
    pub fn flops(&self) -> usize {
        2 * self.n * self.kernel_len() * self.spatial_out()
    }

    #[inline]
    pub fn batch_len(&self) -> usize {
        self.output_dims().tensor_len()
    }
}

#[cfg(test)]
mod test {
    use super::ConvGeometry;
    use crate::error::Error;

    fn reference_out_dim(in_dim: usize, size: usize, stride: usize, pad: usize, dilate_rate: usize) -> usize {
        let dsize = (dilate_rate - 1) * (size + 1) + size;
        (in_dim + 2 * pad - dsize) / stride + 1
    }

    #[test]
    fn test_output_geometry_matches_formula() {
        for size in 1..=5 {
            for stride in 1..=3 {
                for pad in 0..=3 {
                    for dilate_rate in 1..=3 {
                        let h = 17;
                        let w = 23;
                        let g = ConvGeometry::new(2, h, w, 4, 6, 2, size, stride, pad, dilate_rate).unwrap();
                        assert_eq!(g.out_h, reference_out_dim(h, size, stride, pad, dilate_rate));
                        assert_eq!(g.out_w, reference_out_dim(w, size, stride, pad, dilate_rate));
                    }
                }
            }
        }
    }

    #[test]
    fn test_dilated_scenario() {
        let g = ConvGeometry::new(1, 9, 9, 1, 1, 1, 3, 2, 0, 2).unwrap();
        assert_eq!(g.dsize(), 7);
        assert_eq!((g.out_h, g.out_w), (2, 2));
        assert_eq!(g.nweights(), 9);
        assert_eq!(g.workspace_len(), 2 * 2 * 3 * 3);
        assert_eq!(g.workspace_size::<f32>(), 2 * 2 * 3 * 3 * 4);
    }

    #[test]
    fn test_group_offsets() {
        let g = ConvGeometry::new(2, 4, 4, 6, 4, 2, 3, 1, 1, 1).unwrap();
        assert_eq!(g.group_channels(), 3);
        assert_eq!(g.group_filters(), 2);
        assert_eq!(g.nweights(), 3 * 4 * 9);
        assert_eq!(g.input_group_offset(1, 1), 6 * 16 + 3 * 16);
        assert_eq!(g.output_group_offset(1, 1), 4 * 16 + 2 * 16);
        assert_eq!(g.weight_group_offset(1), 2 * 27);
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(matches!(
            ConvGeometry::new(1, 8, 8, 3, 4, 2, 3, 1, 0, 1),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            ConvGeometry::new(1, 8, 8, 4, 3, 2, 3, 1, 0, 1),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            ConvGeometry::new(1, 3, 3, 1, 1, 1, 3, 1, 0, 2),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            ConvGeometry::new(1, 8, 8, 1, 1, 1, 3, 0, 0, 1),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_with_spatial() {
        let g = ConvGeometry::new(3, 9, 9, 2, 4, 1, 3, 1, 1, 2).unwrap();
        let r = g.with_spatial(13, 11).unwrap();
        assert_eq!((r.w, r.h), (13, 11));
        assert_eq!(r.out_w, r.out_dim(13).unwrap());
        assert_eq!(r.out_h, r.out_dim(11).unwrap());
        assert_eq!(r.nweights(), g.nweights());
    }
}
