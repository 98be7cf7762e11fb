//! Normalization of un-normalized transform output.

use std::marker::PhantomData;

use crate::backend::Backend;
use crate::error::{PencilFftError, Result};
use crate::scalar::Scalar;

/// In-place scaling by a real factor at location `B`.
///
/// Real data is multiplied by the factor, complex data by the factor as a
/// real number. The device specialization runs on device memory directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataScaling<B: Backend> {
    _location: PhantomData<B>,
}

impl<B: Backend> DataScaling<B> {
    /// Multiplies the first `count` elements of `data` by `scalar`.
    ///
    /// # Errors
    /// * `SizeMismatch` if `count` exceeds the buffer length.
    /// * `OwnershipViolation` if a device buffer is empty.
    pub fn apply<T: Scalar>(count: usize, data: &mut B::Buffer<T>, scalar: f64) -> Result<()> {
        let len = B::owned_len(data, "scale")?;
        if count > len {
            return Err(PencilFftError::SizeMismatch {
                expected: len,
                got: count,
            });
        }
        if count == 0 {
            return Ok(());
        }
        B::scale(data, count, scalar)
    }
}
