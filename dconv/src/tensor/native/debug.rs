use crate::tensor::{Dims, ITensor, Tensor, TensorView, TensorViewMut};
use std::any::type_name;
use std::fmt::{self, Debug, Formatter};

/// Items kept at each end of a row before the middle is elided.
const EDGE_COLS: usize = 4;
/// Rows (images, channels, ...) kept at each end of the leading axis.
const EDGE_ROWS: usize = 2;

fn write_elided<I>(
    f: &mut Formatter,
    items: I,
    edge: usize,
    sep: &str,
    mut write_item: impl FnMut(&mut Formatter, I::Item) -> fmt::Result,
) -> fmt::Result
where
    I: ExactSizeIterator,
{
    let len = items.len();
    let hidden = len.saturating_sub(2 * edge);
    for (i, item) in items.enumerate() {
        if hidden > 0 && i >= edge && i < len - edge {
            if i == edge {
                write!(f, "{sep}...({hidden} more)")?;
            }
            continue;
        }
        if i > 0 {
            f.write_str(sep)?;
        }
        write_item(f, item)?;
    }
    Ok(())
}

fn write_row<T: Debug>(f: &mut Formatter, row: &[T]) -> fmt::Result {
    f.write_str("[")?;
    write_elided(f, row.iter(), EDGE_COLS, ", ", |f, x| Debug::fmt(x, f))?;
    f.write_str("]")
}

/// `Tensor<f32>(2, 3) [...]`, one line per entry of the leading axis.
fn write_tensor<T: Debug, D: Dims>(f: &mut Formatter, data: &[T], dims: &D) -> fmt::Result {
    write!(f, "Tensor<{}>{} ", type_name::<T>(), dims)?;
    let outer = dims.first();
    if D::N < 2 || data.is_empty() || outer == 0 {
        return write_row(f, data);
    }
    f.write_str("[\n  ")?;
    write_elided(f, data.chunks_exact(data.len() / outer), EDGE_ROWS, ",\n  ", write_row)?;
    f.write_str("\n]")
}

macro_rules! impl_tensor_debug {
    ($type_name: ident $(, $l: lifetime )?) => {
        impl<$($l,)? T: Debug, D: Dims> Debug for $type_name<$($l,)? T, D> {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                write_tensor(f, self.as_ref(), self.dims())
            }
        }
    };
}

impl_tensor_debug!(Tensor);
impl_tensor_debug!(TensorView, 'a);
impl_tensor_debug!(TensorViewMut, 'a);

#[cfg(test)]
mod test {
    use crate::tensor::{Dim2, Dim4, Tensor, Tensor1};

    #[test]
    fn test_short_rows_are_complete() {
        assert_eq!("Tensor<i32>(5) [1, 2, 3, 4, 5]", format!("{:?}", Tensor1::from_vec_1d(vec![1, 2, 3, 4, 5])));
        assert_eq!(
            "Tensor<i32>(2, 2) [\n  [1, 2],\n  [3, 4]\n]",
            format!("{:?}", Tensor::from_vec(vec![1, 2, 3, 4], Dim2(2, 2)))
        );
    }

    #[test]
    fn test_middle_is_elided() {
        let a = Tensor::from_vec((0..200).collect(), Dim2(10, 20));
        let expected = "Tensor<i32>(10, 20) [
  [0, 1, 2, 3, ...(12 more), 16, 17, 18, 19],
  [20, 21, 22, 23, ...(12 more), 36, 37, 38, 39],
  ...(6 more),
  [160, 161, 162, 163, ...(12 more), 176, 177, 178, 179],
  [180, 181, 182, 183, ...(12 more), 196, 197, 198, 199]
]";
        assert_eq!(expected, format!("{a:?}"));
    }

    #[test]
    fn test_images_print_one_per_line() {
        let batch = Tensor::from_vec(vec![0u8; 2 * 3 * 2 * 2], Dim4(2, 3, 2, 2));
        let text = format!("{batch:?}");
        assert!(text.starts_with("Tensor<u8>(2, 3, 2, 2) [\n  [0, 0, 0, 0, ...(4 more), 0, 0, 0, 0],"));
        assert_eq!(text.lines().count(), 4);
    }
}
