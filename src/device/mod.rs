//! Owning containers for device-resident memory.
//!
//! A [`DeviceBuffer`] owns exactly one device allocation or nothing at all.
//! Data only crosses the host/device boundary through the explicit
//! [`DeviceBuffer::load`] and [`DeviceBuffer::unload`] calls; ownership of a
//! raw allocation only changes hands through [`DeviceBuffer::release`] and
//! [`DeviceBuffer::capture`].

pub mod runtime;

use std::fmt;
use std::ops::Range;
use std::ptr::NonNull;

use crate::error::{PencilFftError, Result};
use crate::scalar::Scalar;

/// Owned handle to a raw device allocation, produced by
/// [`DeviceBuffer::release`] and taken back by [`DeviceBuffer::capture`].
///
/// The handle is neither `Copy` nor `Clone`: at any time exactly one value
/// (a handle or a buffer) is responsible for the allocation.
#[derive(Debug)]
pub struct DevicePtr<T> {
    ptr: NonNull<T>,
}

impl<T> DevicePtr<T> {
    /// Raw device address, for handing to external device libraries.
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

// SAFETY: the handle is the unique owner of its allocation.
unsafe impl<T: Send> Send for DevicePtr<T> {}

/// RAII container for `len` elements of device memory.
///
/// The empty buffer holds no allocation, reports `len() == 0` and a null
/// [`as_ptr`](Self::as_ptr). Dropping a non-empty buffer frees its
/// allocation; dropping an empty one does nothing. Moving a buffer out with
/// `std::mem::take` leaves an empty, still usable buffer behind.
pub struct DeviceBuffer<T: Scalar> {
    ptr: Option<NonNull<T>>,
    len: usize,
}

// SAFETY: a buffer is the unique owner of its allocation, no other value
// aliases the device memory.
unsafe impl<T: Scalar> Send for DeviceBuffer<T> {}
unsafe impl<T: Scalar> Sync for DeviceBuffer<T> {}

impl<T: Scalar> DeviceBuffer<T> {
    /// The empty buffer.
    pub const fn new() -> Self {
        Self { ptr: None, len: 0 }
    }

    /// A buffer of `len` zeroed elements; `len == 0` gives the empty buffer.
    pub fn with_len(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self::new());
        }
        let ptr = runtime::allocate::<T>(len)?;
        Ok(Self {
            ptr: Some(ptr),
            len,
        })
    }

    /// Copies a host slice into a new device buffer.
    pub fn load(host: &[T]) -> Result<Self> {
        let buffer = Self::with_len(host.len())?;
        if let Some(ptr) = buffer.ptr {
            // SAFETY: the allocation was just sized to `host.len()` elements.
            unsafe { runtime::copy_to_device(host, ptr)? };
        }
        Ok(buffer)
    }

    /// Copies `range` of `source` into a fresh device allocation, without a
    /// host round trip.
    ///
    /// # Errors
    /// * `SizeMismatch` if `range` reaches past the end of `source`.
    pub fn copy_from_range(source: &DeviceBuffer<T>, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > source.len {
            return Err(PencilFftError::SizeMismatch {
                expected: source.len,
                got: range.end,
            });
        }
        let buffer = Self::with_len(range.len())?;
        if let (Some(src), Some(dst)) = (source.ptr, buffer.ptr) {
            // SAFETY: `range` lies inside the source allocation and the new
            // allocation holds exactly `range.len()` elements.
            unsafe {
                let start = NonNull::new_unchecked(src.as_ptr().wrapping_add(range.start));
                runtime::copy_on_device(start, dst, range.len())?;
            }
        }
        Ok(buffer)
    }

    /// Copies the device data into a new host vector.
    ///
    /// Pending device work on the buffer is complete when this returns.
    ///
    /// # Errors
    /// * `OwnershipViolation` if the buffer is empty.
    pub fn unload(&self) -> Result<Vec<T>> {
        let ptr = self.device_ptr("unload")?;
        runtime::synchronize()?;
        let mut host = vec![T::default(); self.len];
        // SAFETY: the buffer owns `len` initialized elements at `ptr`.
        unsafe { runtime::copy_to_host(ptr, &mut host)? };
        Ok(host)
    }

    /// Takes ownership of an existing device allocation without copying.
    ///
    /// On success `handle` is cleared, so the caller is left without a way
    /// to reach the allocation other than through the returned buffer. On
    /// failure `handle` is left as it was and still owns the allocation.
    ///
    /// # Errors
    /// * `OwnershipViolation` if `handle` is `None`, if `len` is zero, if
    ///   the handle does not refer to a live device allocation or if the
    ///   allocation holds fewer than `len` elements.
    pub fn capture(handle: &mut Option<DevicePtr<T>>, len: usize) -> Result<Self> {
        let ptr = handle.as_ref().map(|h| h.ptr).ok_or_else(|| {
            PencilFftError::OwnershipViolation("capture of an empty handle".to_string())
        })?;
        let capacity = runtime::capacity(ptr).ok_or_else(|| {
            PencilFftError::OwnershipViolation(format!(
                "capture of unknown device pointer {:p}",
                ptr
            ))
        })?;
        if len == 0 || len > capacity {
            return Err(PencilFftError::OwnershipViolation(format!(
                "capture of {} elements from an allocation of {}",
                len, capacity
            )));
        }
        *handle = None;
        Ok(Self {
            ptr: Some(ptr),
            len,
        })
    }

    /// Hands the allocation back to the caller and leaves the buffer empty.
    ///
    /// # Errors
    /// * `OwnershipViolation` if the buffer is already empty (for example a
    ///   second release).
    pub fn release(&mut self) -> Result<DevicePtr<T>> {
        let ptr = self.ptr.take().ok_or_else(|| {
            PencilFftError::OwnershipViolation("release of an empty device buffer".to_string())
        })?;
        self.len = 0;
        Ok(DevicePtr { ptr })
    }

    /// Deep device-to-device duplicate.
    pub fn try_clone(&self) -> Result<Self> {
        Self::copy_from_range(self, 0..self.len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw device address, null for the empty buffer.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(std::ptr::null(), |p| p.as_ptr().cast_const())
    }

    /// Base address of the allocation, for kernels running on the device.
    ///
    /// # Errors
    /// * `OwnershipViolation` naming `operation` if the buffer is empty.
    pub(crate) fn device_ptr(&self, operation: &str) -> Result<NonNull<T>> {
        self.ptr.ok_or_else(|| {
            PencilFftError::OwnershipViolation(format!("{} on an empty device buffer", operation))
        })
    }

    /// Device-side view of the data for kernels running on the arena.
    #[cfg(not(feature = "cuda"))]
    pub(crate) fn kernel_view(&self, operation: &str) -> Result<&[T]> {
        let ptr = self.device_ptr(operation)?;
        // SAFETY: the buffer owns `len` initialized elements at `ptr` and the
        // shared borrow of `self` keeps them alive and unaliased by writers.
        Ok(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) })
    }

    /// Mutable device-side view of the data for kernels.
    #[cfg(not(feature = "cuda"))]
    pub(crate) fn kernel_view_mut(&mut self, operation: &str) -> Result<&mut [T]> {
        let ptr = self.device_ptr(operation)?;
        // SAFETY: as in `kernel_view`, with the exclusive borrow of `self`
        // guaranteeing no other access for the lifetime of the slice.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) })
    }
}

impl<T: Scalar> Default for DeviceBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Clone for DeviceBuffer<T> {
    /// Never aliases: a new device allocation receives a copy of the data.
    ///
    /// # Panics
    /// If the device cannot provide the new allocation.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(buffer) => buffer,
            Err(err) => panic!("device buffer clone failed: {}", err),
        }
    }
}

impl<T: Scalar> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            if let Err(err) = runtime::free(ptr) {
                tracing::warn!(error = %err, "device buffer drop failed to free its allocation");
            }
        }
    }
}

impl<T: Scalar> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::num_complex::Complex;

    fn check_vector_type<T: Scalar + PartialEq>(source: Vec<T>) -> Result<()> {
        let num_entries = source.len();

        let v1 = DeviceBuffer::load(&source)?;
        assert_eq!(v1.len(), source.len());

        let mut v2 = v1.clone();
        assert_eq!(v1.len(), v2.len());
        assert_ne!(v1.as_ptr(), v2.as_ptr());
        assert_eq!(v2.unload()?, source);

        {
            let t = std::mem::take(&mut v2);
            assert_eq!(t.unload()?, source);
        }
        assert!(v2.is_empty());
        assert!(v2.as_ptr().is_null());

        let mut v1 = v1;
        v2 = std::mem::take(&mut v1);
        assert!(v1.is_empty());
        assert_eq!(v2.unload()?, source);

        let v1 = DeviceBuffer::load(&source)?;
        let mut v2 = DeviceBuffer::copy_from_range(&v1, 0..num_entries / 2)?;
        assert_eq!(v2.len(), num_entries / 2);
        assert_eq!(v2.unload()?, source[..num_entries / 2].to_vec());

        let num_v2 = v2.len();
        let mut raw = Some(v2.release()?);
        assert!(v2.is_empty());
        assert!(raw.as_ref().is_some_and(|h| runtime::is_live(h.as_ptr())));
        v2 = DeviceBuffer::capture(&mut raw, num_v2)?;
        assert!(raw.is_none());
        assert!(!v2.is_empty());
        assert_eq!(v2.unload()?, source[..num_entries / 2].to_vec());
        Ok(())
    }

    #[test]
    fn test_device_vector() -> Result<()> {
        check_vector_type((0..11).map(|i| i as f32).collect())?;
        check_vector_type((0..40).map(|i| i as f64).collect())?;
        check_vector_type((0..73).map(|i| Complex::new(i as f32, -(i as f32))).collect())?;
        check_vector_type((0..13).map(|i| Complex::new(i as f64, 0.5)).collect())?;
        Ok(())
    }

    #[test]
    fn test_sized_buffer_is_zeroed() -> Result<()> {
        let buffer = DeviceBuffer::<Complex<f64>>::with_len(5)?;
        assert_eq!(buffer.unload()?, vec![Complex::new(0.0, 0.0); 5]);

        let empty = DeviceBuffer::<f32>::with_len(0)?;
        assert!(empty.is_empty());
        assert!(empty.as_ptr().is_null());
        Ok(())
    }

    #[test]
    fn test_empty_buffer_ownership_violations() -> Result<()> {
        let mut buffer = DeviceBuffer::load(&[1.0f64, 2.0, 3.0])?;
        let mut handle = Some(buffer.release()?);
        assert!(matches!(
            buffer.release(),
            Err(PencilFftError::OwnershipViolation(_))
        ));
        assert!(matches!(
            buffer.unload(),
            Err(PencilFftError::OwnershipViolation(_))
        ));

        let restored = DeviceBuffer::capture(&mut handle, 3)?;
        assert_eq!(restored.unload()?, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            DeviceBuffer::capture(&mut handle, 3),
            Err(PencilFftError::OwnershipViolation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_failed_capture_keeps_the_handle() -> Result<()> {
        let mut buffer = DeviceBuffer::load(&[1.0f32; 8])?;
        let mut handle = Some(buffer.release()?);
        let address = handle.as_ref().map(DevicePtr::as_ptr).unwrap();

        // too long or empty: the capture fails and the caller keeps the handle
        for len in [9, 0] {
            assert!(matches!(
                DeviceBuffer::capture(&mut handle, len),
                Err(PencilFftError::OwnershipViolation(_))
            ));
            assert_eq!(handle.as_ref().map(DevicePtr::as_ptr), Some(address));
            assert!(runtime::is_live(address));
        }

        // the same handle is then captured as a shorter view
        let shorter = DeviceBuffer::capture(&mut handle, 4)?;
        assert!(handle.is_none());
        assert_eq!(shorter.as_ptr(), address.cast_const());
        assert_eq!(shorter.unload()?, vec![1.0f32; 4]);
        Ok(())
    }

    #[test]
    fn test_range_past_the_end() -> Result<()> {
        let buffer = DeviceBuffer::load(&[0.0f64; 4])?;
        assert!(matches!(
            DeviceBuffer::copy_from_range(&buffer, 2..6),
            Err(PencilFftError::SizeMismatch { .. })
        ));
        Ok(())
    }
}
