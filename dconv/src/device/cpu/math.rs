use crate::dtype::{DType, DTypeFloat};
use crate::tensor::{Dim2, TensorBase, TensorBaseMut};
use std::iter::zip;

pub trait DTypeOps: DTypeFloat {
    /// Computes `c = alpha * op(a) * op(b) + beta * c` where `op` optionally transposes.
    ///
    /// When `beta` is zero the previous contents of `c` are never read.
    fn matrix_multiply<A, B, C>(alpha: Self, a: &A, ta: bool, b: &B, tb: bool, beta: Self, c: &mut C)
    where
        A: TensorBase<Self, Dim2>,
        B: TensorBase<Self, Dim2>,
        C: TensorBaseMut<Self, Dim2>;
}

macro_rules! implement_dtype_ops {
    ($t: ident, $g: ident) => {
        impl DTypeOps for $t {
            fn matrix_multiply<A, B, C>(alpha: Self, a: &A, ta: bool, b: &B, tb: bool, beta: Self, c: &mut C)
            where
                A: TensorBase<Self, Dim2>,
                B: TensorBase<Self, Dim2>,
                C: TensorBaseMut<Self, Dim2>,
            {
                let &Dim2(a_rows, a_cols) = a.dims();
                let &Dim2(b_rows, b_cols) = b.dims();
                let &Dim2(_, c_cols) = c.dims();
                let (m, k, rsa, csa) = if ta {
                    (a_cols, a_rows, 1, a_cols as isize)
                } else {
                    (a_rows, a_cols, a_cols as isize, 1)
                };
                let (n, rsb, csb) = if tb {
                    assert_eq!(b_cols, k);
                    (b_rows, 1, b_cols as isize)
                } else {
                    assert_eq!(b_rows, k);
                    (b_cols, b_cols as isize, 1)
                };
                assert_eq!(c.dims(), &Dim2(m, n));
                unsafe {
                    matrixmultiply::$g(
                        m,
                        k,
                        n,
                        alpha,
                        a.as_ref().as_ptr(),
                        rsa,
                        csa,
                        b.as_ref().as_ptr(),
                        rsb,
                        csb,
                        beta,
                        c.as_mut().as_mut_ptr(),
                        c_cols as isize,
                        1,
                    );
                }
            }
        }
    };
}

implement_dtype_ops!(f32, sgemm);
implement_dtype_ops!(f64, dgemm);

/// `y += alpha * x`
#[inline]
pub fn axpy<T: DType>(alpha: T, x: &[T], y: &mut [T]) {
    assert_eq!(x.len(), y.len());
    for (yi, &xi) in zip(y, x) {
        *yi += alpha * xi;
    }
}

/// `x *= alpha`
#[inline]
pub fn scal<T: DType>(alpha: T, x: &mut [T]) {
    x.iter_mut().for_each(|xi| *xi *= alpha);
}

#[inline]
pub fn sum<T: DType>(x: &[T]) -> T {
    x.iter().fold(T::ZERO, |acc, &xi| acc + xi)
}

#[cfg(test)]
mod test {
    use crate::device::cpu::math::{axpy, scal, sum, DTypeOps};
    use crate::tensor::{Dim2, Tensor};

    macro_rules! assert_slice_equal {
        ($a:expr, $b:expr) => {{
            let a: &[f32] = $a.as_ref();
            let b = $b;
            if a.len() != b.len() || !std::iter::zip(a, &b).all(|(&i, &j)| (i - j).abs() <= f32::EPSILON) {
                let mismatch: Vec<usize> = std::iter::zip(a, &b)
                    .enumerate()
                    .filter(|(_, (i, j))| (**i - **j).abs() > f32::EPSILON)
                    .map(|(idx, _)| idx)
                    .collect();
                panic!("slices not equal: left={:?}, right={:?}, mismatched indexes={:?}", a, &b, &mismatch);
            }
        }};
    }

    #[test]
    fn test_mat_mul() {
        let a = Tensor::from_vec(vec![1f32, 2., 3., 4., 5., 6.], Dim2(2, 3));
        let b = Tensor::from_vec(vec![7f32, 8., 9., 10., 11., 12.], Dim2(3, 2));
        let c = Tensor::from_vec(vec![0.5f32, 1., 1., 0.25], Dim2(2, 2));

        let mut r2x2 = Tensor::filled(0f32, Dim2(2, 2));
        let mut r2x3 = Tensor::filled(0f32, Dim2(2, 3));
        let mut r3x2 = Tensor::filled(0f32, Dim2(3, 2));
        let mut r3x3 = Tensor::filled(0f32, Dim2(3, 3));

        // various combinations of A X B

        r2x2.fill(100.); // existing values should be ignored
        f32::matrix_multiply(1.0, &a, false, &b, false, 0.0, &mut r2x2);
        assert_slice_equal!(r2x2, [58., 64., 139., 154.]);

        r2x2.fill(0.);
        f32::matrix_multiply(0.5, &a, false, &b, false, 0.0, &mut r2x2);
        assert_slice_equal!(r2x2, [29., 32., 69.5, 77.]);

        r2x2.fill(1.);
        f32::matrix_multiply(1.0, &a, false, &b, false, 5.0, &mut r2x2);
        assert_slice_equal!(r2x2, [63., 69., 144., 159.]);

        // B X A

        r3x3.fill(100.);
        f32::matrix_multiply(1.0, &b, false, &a, false, 0.0, &mut r3x3);
        assert_slice_equal!(r3x3, [39., 54., 69., 49., 68., 87., 59., 82., 105.]);

        // C X Bt

        r2x3.fill(100.);
        f32::matrix_multiply(1.0, &c, false, &b, true, 0.0, &mut r2x3);
        assert_slice_equal!(r2x3, [11.5, 14.5, 17.5, 9., 11.5, 14.]);

        // At X C

        r3x2.fill(100.);
        f32::matrix_multiply(1.0, &a, true, &c, false, 0.0, &mut r3x2);
        assert_slice_equal!(r3x2, [4.5, 2., 6., 3.25, 7.5, 4.5]);
    }

    #[test]
    fn test_level1() {
        let mut y = vec![1f32, 2., 3.];
        axpy(2.0, &[1., 1., 1.], &mut y);
        assert_slice_equal!(y, [3., 4., 5.]);
        scal(0.5, &mut y);
        assert_slice_equal!(y, [1.5, 2., 2.5]);
        assert_eq!(sum(&y), 6.0);
        assert_eq!(sum::<f64>(&[]), 0.0);
    }

    #[test]
    #[should_panic(expected = "mismatched indexes=[1]")]
    fn test_slice_mismatch_reports_indexes() {
        let actual = vec![1f32, 2., 3.];
        assert_slice_equal!(actual, [1., 2.5, 3.]);
    }
}
