
use crate::dtype::DType;
use crate::tensor::{Dim2, Dim3};

/// Geometry of the receptive field extraction for a single group of a single image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PatchGeometry {
    pub channels: usize,
    pub h: usize,
    pub w: usize,
    pub size: usize,
    pub stride: usize,
    pub pad: usize,
    pub dilate_rate: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl PatchGeometry {
    /// One row per `(channel, kernel row, kernel col)` tap.
    #[inline]
    pub fn rows(&self) -> usize {
        self.channels * self.size * self.size
    }

    /// One column per output position.
    #[inline]
    pub fn cols(&self) -> usize {
        self.out_h * self.out_w
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn column_dims(&self) -> Dim2 {
        Dim2(self.rows(), self.cols())
    }

    #[inline]
    pub fn image_dims(&self) -> Dim3 {
        Dim3(self.channels, self.h, self.w)
    }

    /// True when the column matrix is laid out exactly like the image, so unfolding is a copy.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.size == 1 && self.stride == 1 && self.pad == 0 && self.out_h == self.h && self.out_w == self.w
    }

    /// Maps a tap row and output position to a source pixel, or `None` when it lands in padding.
    #[inline]
    fn source(&self, row: usize, oy: usize, ox: usize) -> Option<usize> {
        let kx = row % self.size;
        let ky = (row / self.size) % self.size;
        let channel = row / self.size / self.size;
        let y = (ky * self.dilate_rate + oy * self.stride).checked_sub(self.pad)?;
        let x = (kx * self.dilate_rate + ox * self.stride).checked_sub(self.pad)?;
        if y < self.h && x < self.w {
            Some((channel * self.h + y) * self.w + x)
        } else {
            None
        }
    }
}

/// Extracts every dilated receptive field of `image` into the columns of `columns`.
///
/// `image` is `(channels, h, w)` and `columns` is `(channels * size * size, out_h * out_w)`.
/// Taps that fall into the padding are written as zero.
pub fn unfold<T: DType>(image: &[T], geometry: &PatchGeometry, columns: &mut [T]) {
    assert_eq!(image.len(), geometry.channels * geometry.h * geometry.w);
    assert!(columns.len() >= geometry.len());
    let cols = geometry.cols();
    for (row, dst) in columns[..geometry.len()].chunks_exact_mut(cols).enumerate() {
        for oy in 0..geometry.out_h {
            let line = &mut dst[oy * geometry.out_w..(oy + 1) * geometry.out_w];
            for (ox, v) in line.iter_mut().enumerate() {
                *v = match geometry.source(row, oy, ox) {
                    Some(idx) => image[idx],
                    None => T::ZERO,
                };
            }
        }
    }
}

/// Scatters `columns` back into `image`, accumulating overlapping taps.
///
/// This is the transpose of [`unfold`]: values mapped into the padding are dropped and
/// existing contents of `image` are added to, never overwritten.
pub fn fold<T: DType>(columns: &[T], geometry: &PatchGeometry, image: &mut [T]) {
    assert_eq!(image.len(), geometry.channels * geometry.h * geometry.w);
    assert!(columns.len() >= geometry.len());
    let cols = geometry.cols();
    for (row, src) in columns[..geometry.len()].chunks_exact(cols).enumerate() {
        for oy in 0..geometry.out_h {
            let line = &src[oy * geometry.out_w..(oy + 1) * geometry.out_w];
            for (ox, &v) in line.iter().enumerate() {
                if let Some(idx) = geometry.source(row, oy, ox) {
                    image[idx] += v;
                }
            }
        }
    }
}
