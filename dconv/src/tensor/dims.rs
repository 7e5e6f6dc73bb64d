use std::fmt::{Debug, Display, Formatter, Write};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dim1(pub usize);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dim2(pub usize, pub usize);

impl Dim2 {
    #[inline]
    pub fn rows(&self) -> usize {
        self.0
    }
    #[inline]
    pub fn cols(&self) -> usize {
        self.1
    }
    #[inline]
    pub fn transposed(&self) -> Self {
        Dim2(self.1, self.0)
    }
}

/// Dimensions of a single image: `(channels, height, width)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dim3(pub usize, pub usize, pub usize);

impl Dim3 {
    #[inline]
    pub fn channels(&self) -> usize {
        self.0
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.1
    }
    #[inline]
    pub fn width(&self) -> usize {
        self.2
    }
    #[inline]
    pub fn channel_stride(&self) -> usize {
        self.1 * self.2
    }
    #[inline]
    pub fn offset(&self, c: usize, y: usize, x: usize) -> usize {
        debug_assert!(c < self.0 && y < self.1 && x < self.2);
        (c * self.1 + y) * self.2 + x
    }
}

/// Dimensions of a batch of images: `(batch, channels, height, width)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dim4(pub usize, pub usize, pub usize, pub usize);

impl Dim4 {
    #[inline]
    pub fn batch(&self) -> usize {
        self.0
    }
    #[inline]
    pub fn channels(&self) -> usize {
        self.1
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.2
    }
    #[inline]
    pub fn width(&self) -> usize {
        self.3
    }
    #[inline]
    pub fn image(&self) -> Dim3 {
        Dim3(self.1, self.2, self.3)
    }
    #[inline]
    pub fn batch_stride(&self) -> usize {
        self.1 * self.2 * self.3
    }
    #[inline]
    pub fn channel_stride(&self) -> usize {
        self.2 * self.3
    }
    #[inline]
    pub fn offset(&self, b: usize, c: usize, y: usize, x: usize) -> usize {
        debug_assert!(b < self.0);
        b * self.batch_stride() + self.image().offset(c, y, x)
    }
}

pub trait Dims: Copy + Debug + Eq + Display {
    const N: usize;
    fn first(&self) -> usize;
    fn tensor_len(&self) -> usize;
    fn as_vec(&self) -> Vec<usize>;
}

impl Dims for Dim1 {
    const N: usize = 1;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0]
    }
}

impl Dims for Dim2 {
    const N: usize = 2;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0 * self.1
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0, self.1]
    }
}

impl Dims for Dim3 {
    const N: usize = 3;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0 * self.1 * self.2
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0, self.1, self.2]
    }
}

impl Dims for Dim4 {
    const N: usize = 4;
    #[inline]
    fn first(&self) -> usize {
        self.0
    }
    #[inline]
    fn tensor_len(&self) -> usize {
        self.0 * self.1 * self.2 * self.3
    }
    fn as_vec(&self) -> Vec<usize> {
        vec![self.0, self.1, self.2, self.3]
    }
}

macro_rules! impl_dims_display {
    ($type_name:ident, $first:tt $(, $rest:tt)*) => {
        impl Display for $type_name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_char('(')?;
                Display::fmt(&self.$first, f)?;
                $(
                f.write_str(", ")?;
                Display::fmt(&self.$rest, f)?;
                )*
                f.write_char(')')
            }
        }
    };
}

impl_dims_display!(Dim1, 0);
impl_dims_display!(Dim2, 0, 1);
impl_dims_display!(Dim3, 0, 1, 2);
impl_dims_display!(Dim4, 0, 1, 2, 3);

impl From<usize> for Dim1 {
    #[inline]
    fn from(value: usize) -> Self {
        Dim1(value)
    }
}

impl From<(usize, usize)> for Dim2 {
    #[inline]
    fn from((rows, cols): (usize, usize)) -> Self {
        Dim2(rows, cols)
    }
}
