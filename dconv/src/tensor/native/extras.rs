use crate::tensor::{Dims, ITensor, Tensor, TensorView, TensorViewMut};

impl<T, D: Dims> std::ops::Index<usize> for Tensor<T, D> {
    type Output = T;
    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.as_ref()[index]
    }
}

impl<T, D: Dims> std::ops::IndexMut<usize> for Tensor<T, D> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.as_mut()[index]
    }
}

macro_rules! impl_tensor_eq {
    ($type_name: ident $(, $l: lifetime )?) => {
        impl<$($l,)?T, D: Dims> PartialEq<Tensor<T, D>> for $type_name<$($l,)?T, D> where T: PartialEq {
            fn eq(&self, other: &Tensor<T, D>) -> bool {
                self.dims() == other.dims() && self.as_ref() == other.as_ref()
            }
        }

        impl<$($l,)?'b, T, D: Dims> PartialEq<TensorView<'b, T, D>> for $type_name<$($l,)?T, D> where T: PartialEq {
            fn eq(&self, other: &TensorView<'b, T, D>) -> bool {
                self.dims() == other.dims() && self.as_ref() == other.as_ref()
            }
        }

        impl<$($l,)?'b, T, D: Dims> PartialEq<TensorViewMut<'b, T, D>> for $type_name<$($l,)?T, D> where T: PartialEq {
            fn eq(&self, other: &TensorViewMut<'b, T, D>) -> bool {
                self.dims() == other.dims() && self.as_ref() == other.as_ref()
            }
        }
    };
}

impl_tensor_eq!(Tensor);
impl_tensor_eq!(TensorView, 'a);
impl_tensor_eq!(TensorViewMut, 'a);
