use crate::tensor::{Dims, Tensor, TensorBase, TensorView, TensorViewMut};
use approx::{AbsDiffEq, RelativeEq};
use std::iter::zip;

/// Same dims and `close` holds for every pair of elements.
fn all_close<T, D, A, B>(a: &A, b: &B, mut close: impl FnMut(&T, &T) -> bool) -> bool
where
    D: Dims,
    A: TensorBase<T, D> + ?Sized,
    B: TensorBase<T, D> + ?Sized,
{
    a.dims() == b.dims() && zip(a.as_ref(), b.as_ref()).all(|(x, y)| close(x, y))
}

macro_rules! impl_tensor_approx {
    ($type_name: ident $(, $l: lifetime )?) => {
        impl<$($l,)? T: AbsDiffEq, D: Dims> AbsDiffEq<Tensor<T, D>> for $type_name<$($l,)? T, D>
        where
            T::Epsilon: Copy,
        {
            type Epsilon = T::Epsilon;

            fn default_epsilon() -> T::Epsilon {
                T::default_epsilon()
            }

            fn abs_diff_eq(&self, other: &Tensor<T, D>, epsilon: T::Epsilon) -> bool {
                all_close::<T, D, _, _>(self, other, |x, y| x.abs_diff_eq(y, epsilon))
            }
        }

        impl<$($l,)? T: RelativeEq, D: Dims> RelativeEq<Tensor<T, D>> for $type_name<$($l,)? T, D>
        where
            T::Epsilon: Copy,
        {
            fn default_max_relative() -> T::Epsilon {
                T::default_max_relative()
            }

            fn relative_eq(&self, other: &Tensor<T, D>, epsilon: T::Epsilon, max_relative: T::Epsilon) -> bool {
                all_close::<T, D, _, _>(self, other, |x, y| x.relative_eq(y, epsilon, max_relative))
            }
        }
    };
}

impl_tensor_approx!(Tensor);
impl_tensor_approx!(TensorView, 'a);
impl_tensor_approx!(TensorViewMut, 'a);
