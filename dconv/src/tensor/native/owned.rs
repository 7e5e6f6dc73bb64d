use crate::error::{Error, Result};
use crate::tensor::dims::{Dim1, Dim2, Dim3, Dim4, Dims};
use crate::tensor::{ITensor, TensorBase, TensorBaseMut};
use num_traits::Zero;
use rand::distributions::Distribution;
use rand::Rng;
use std::slice::{Iter, IterMut};
use std::vec::IntoIter;

pub struct Tensor<T, D>
where
    D: Dims,
{
    data: Vec<T>,
    dims: D,
}

pub type Tensor1<T> = Tensor<T, Dim1>;
pub type Tensor2<T> = Tensor<T, Dim2>;
pub type Tensor3<T> = Tensor<T, Dim3>;
pub type Tensor4<T> = Tensor<T, Dim4>;

impl<T, D: Dims> Tensor<T, D> {
    pub fn from_vec(data: Vec<T>, dims: D) -> Self {
        assert_eq!(data.len(), dims.tensor_len());
        Tensor { data, dims }
    }

    pub fn from_distribution<R, S>(rng: &mut R, dist: S, dims: D) -> Self
    where
        R: Rng,
        S: Distribution<T>,
    {
        let data: Vec<T> = dist.sample_iter(rng).take(dims.tensor_len()).collect();
        Tensor { data, dims }
    }

    #[inline]
    pub(super) unsafe fn from_vec_unchecked(data: Vec<T>, dims: D) -> Self {
        debug_assert_eq!(data.len(), dims.tensor_len());
        Tensor { data, dims }
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.data.iter_mut()
    }
}

impl<T> Tensor1<T> {
    pub fn from_vec_1d(data: Vec<T>) -> Self {
        let len = data.len();
        Tensor { data, dims: Dim1(len) }
    }
}

impl<T: Clone, D: Dims> Tensor<T, D> {
    pub fn filled(value: T, dims: D) -> Self {
        Tensor {
            data: vec![value; dims.tensor_len()],
            dims,
        }
    }

    /// Like [`Tensor::filled`], but reports an allocation failure instead of aborting.
    pub fn try_filled(what: &'static str, value: T, dims: D) -> Result<Self> {
        let len = dims.tensor_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|source| Error::Allocation { what, len, source })?;
        data.resize(len, value);
        Ok(Tensor { data, dims })
    }

    pub fn resize(&mut self, fill: T, dims: D) {
        if self.dims != dims {
            let new_len = dims.tensor_len();
            if self.data.len() != new_len {
                self.data.resize(new_len, fill);
            }
            self.dims = dims;
        }
    }

    /// Resizes the tensor, reporting an allocation failure instead of aborting.
    pub fn try_resize(&mut self, what: &'static str, fill: T, dims: D) -> Result<()> {
        if self.dims != dims {
            let new_len = dims.tensor_len();
            let len = self.data.len();
            if new_len > len {
                self.data
                    .try_reserve_exact(new_len - len)
                    .map_err(|source| Error::Allocation { what, len: new_len, source })?;
            }
            self.data.resize(new_len, fill);
            self.dims = dims;
        }
        Ok(())
    }

    #[inline]
    pub fn fill(&mut self, fill: T) {
        self.data.fill(fill);
    }
}

impl<T: Zero + Clone, D: Dims> Tensor<T, D> {
    #[inline]
    pub fn zeroed(dims: D) -> Self {
        Self::filled(T::zero(), dims)
    }
    #[inline]
    pub fn try_zeroed(what: &'static str, dims: D) -> Result<Self> {
        Self::try_filled(what, T::zero(), dims)
    }
    #[inline]
    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
    }
}

impl<T, D: Dims> ITensor<D> for Tensor<T, D> {
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }
    #[inline]
    fn dims(&self) -> &D {
        &self.dims
    }
}

impl<T, D: Dims> AsRef<[T]> for Tensor<T, D> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        &self.data
    }
}

impl<T, D: Dims> AsMut<[T]> for Tensor<T, D> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T, D: Dims> TensorBase<T, D> for Tensor<T, D> {}

impl<T, D: Dims> TensorBaseMut<T, D> for Tensor<T, D> {}

impl<'a, T, D: Dims> IntoIterator for &'a Tensor<T, D> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<'a, T, D: Dims> IntoIterator for &'a mut Tensor<T, D> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter_mut()
    }
}

impl<T, D: Dims> IntoIterator for Tensor<T, D> {
    type Item = T;
    type IntoIter = IntoIter<T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<T: Clone, D: Dims> Clone for Tensor<T, D> {
    fn clone(&self) -> Self {
        unsafe { Tensor::from_vec_unchecked(self.data.clone(), self.dims) }
    }
}

#[cfg(test)]
mod test {
    use crate::tensor::{Dim1, Dim2, Dim4, ITensor, Tensor, Tensor1, TensorBase};

    #[test]
    fn test_resize_keeps_prefix() {
        let mut t = Tensor1::from_vec_1d(vec![1, 2, 3]);
        t.resize(0, Dim1(5));
        assert_eq!(t.as_ref(), &[1, 2, 3, 0, 0]);
        t.resize(0, Dim1(2));
        assert_eq!(t.as_ref(), &[1, 2]);
    }

    #[test]
    fn test_try_zeroed() {
        let t = Tensor::<f32, Dim4>::try_zeroed("test", Dim4(2, 3, 4, 5)).unwrap();
        assert_eq!(t.len(), 120);
        assert!(t.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reshape() {
        let t = Tensor1::from_vec_1d(vec![1, 2, 3, 4, 5, 6]);
        let m = t.reshape(Dim2(2, 3));
        assert_eq!(m.dims(), &Dim2(2, 3));
        assert_eq!(m[4], 5);
    }
}
