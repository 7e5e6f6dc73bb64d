use crate::tensor::{Dims, ITensor, TensorBase, TensorBaseMut};
use std::ops::{Deref, DerefMut};
use std::slice::{Iter, IterMut};

pub struct TensorView<'a, T, D: Dims> {
    data: &'a [T],
    dims: D,
}

impl<'a, T, D: Dims> TensorView<'a, T, D> {
    pub fn from_slice(data: &'a [T], dims: D) -> Self {
        assert_eq!(
            data.len(),
            dims.tensor_len(),
            "Mismatched data length {} and dimension {}",
            data.len(),
            dims
        );
        TensorView { data, dims }
    }
    #[inline]
    pub(crate) unsafe fn from_slice_unchecked(data: &'a [T], dims: D) -> Self {
        debug_assert_eq!(data.len(), dims.tensor_len());
        TensorView { data, dims }
    }
}

impl<'a, T, D: Dims> ITensor<D> for TensorView<'a, T, D> {
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }
    #[inline]
    fn dims(&self) -> &D {
        &self.dims
    }
}

impl<'a, T, D: Dims> AsRef<[T]> for TensorView<'a, T, D> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.data
    }
}

impl<'a, T, D: Dims> Deref for TensorView<'a, T, D> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<'a, T, D: Dims> TensorBase<T, D> for TensorView<'a, T, D> {}

impl<'a, T, D: Dims> IntoIterator for TensorView<'a, T, D> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

pub struct TensorViewMut<'a, T, D: Dims> {
    data: &'a mut [T],
    dims: D,
}

impl<'a, T, D: Dims> TensorViewMut<'a, T, D> {
    pub fn from_slice(data: &'a mut [T], dims: D) -> Self {
        assert_eq!(
            data.len(),
            dims.tensor_len(),
            "Mismatched data length {} and dimension {}",
            data.len(),
            dims
        );
        TensorViewMut { data, dims }
    }
    #[inline]
    pub(crate) unsafe fn from_slice_unchecked(data: &'a mut [T], dims: D) -> Self {
        debug_assert_eq!(data.len(), dims.tensor_len());
        TensorViewMut { data, dims }
    }
}

impl<'a, T, D: Dims> ITensor<D> for TensorViewMut<'a, T, D> {
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }
    #[inline]
    fn dims(&self) -> &D {
        &self.dims
    }
}

impl<'a, T, D: Dims> AsRef<[T]> for TensorViewMut<'a, T, D> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.data
    }
}

impl<'a, T, D: Dims> AsMut<[T]> for TensorViewMut<'a, T, D> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        self.data
    }
}

impl<'a, T, D: Dims> Deref for TensorViewMut<'a, T, D> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<'a, T, D: Dims> DerefMut for TensorViewMut<'a, T, D> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl<'a, T, D: Dims> TensorBase<T, D> for TensorViewMut<'a, T, D> {}

impl<'a, T, D: Dims> TensorBaseMut<T, D> for TensorViewMut<'a, T, D> {}

impl<'a, T, D: Dims> IntoIterator for TensorViewMut<'a, T, D> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter_mut()
    }
}
