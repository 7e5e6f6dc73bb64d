use crate::tensor::{Dims, ITensor, TensorView, TensorViewMut};

pub trait TensorBase<T, D: Dims>: ITensor<D> + AsRef<[T]> {
    #[inline]
    fn view(&self) -> TensorView<'_, T, D> {
        unsafe { TensorView::from_slice_unchecked(self.as_ref(), *self.dims()) }
    }

    /// Views the same data under different dimensions with the same length.
    #[inline]
    fn reshape<E: Dims>(&self, dims: E) -> TensorView<'_, T, E> {
        TensorView::from_slice(self.as_ref(), dims)
    }
}

pub trait TensorBaseMut<T, D: Dims>: TensorBase<T, D> + AsMut<[T]> {
    #[inline]
    fn view_mut(&mut self) -> TensorViewMut<'_, T, D> {
        let dims = *self.dims();
        unsafe { TensorViewMut::from_slice_unchecked(self.as_mut(), dims) }
    }
}
