mod dims;
mod native;

pub use dims::*;
pub use native::base::*;
pub use native::owned::*;
pub use native::view::*;

/// Common accessors shared by owned tensors and tensor views
pub trait ITensor<D: Dims> {
    fn len(&self) -> usize;
    fn dims(&self) -> &D;
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
