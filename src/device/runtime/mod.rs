//! Device runtime primitives: allocate, free, copy and synchronize.
//!
//! [`super::DeviceBuffer`] is the only owner of handles into this module.
//! Every live allocation is recorded in a process-wide registry, which lets
//! the runtime reject frees of unknown or already freed pointers and lets
//! buffers validate pointers handed to `capture`.
//!
//! With the `cuda` feature the memory comes from the CUDA driver of device 0.
//! Without it the runtime serves device memory from a dedicated host arena
//! whose kernels complete before they return.

#[cfg(not(feature = "cuda"))]
mod arena;
#[cfg(feature = "cuda")]
pub(crate) mod cuda;

#[cfg(not(feature = "cuda"))]
use arena as memory;
#[cfg(feature = "cuda")]
use cuda as memory;

use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::error::{PencilFftError, Result};
use crate::scalar::Scalar;

/// Registry of live allocations: base address to layout.
static ALLOCATIONS: OnceLock<Mutex<HashMap<usize, Layout>>> = OnceLock::new();

fn registry() -> Result<MutexGuard<'static, HashMap<usize, Layout>>> {
    ALLOCATIONS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| PencilFftError::DeviceAllocation("device registry lock poisoned".to_string()))
}

/// Allocates `count` zero-initialized elements of device memory.
///
/// # Errors
/// * `DeviceAllocation` if `count` is zero, the byte size overflows or the
///   device is out of memory.
pub(crate) fn allocate<T: Scalar>(count: usize) -> Result<NonNull<T>> {
    if count == 0 {
        return Err(PencilFftError::DeviceAllocation(
            "zero-sized device allocation".to_string(),
        ));
    }
    let layout = Layout::array::<T>(count).map_err(|e| {
        PencilFftError::DeviceAllocation(format!("{} elements: {}", count, e))
    })?;

    let mut registry = registry()?;
    let ptr = memory::alloc_zeroed(layout)?.cast::<T>();
    registry.insert(ptr.as_ptr() as usize, layout);
    tracing::trace!(address = ptr.as_ptr() as usize, bytes = layout.size(), "device allocate");
    Ok(ptr)
}

/// Returns an allocation to the runtime.
///
/// # Errors
/// * `OwnershipViolation` if `ptr` is not the base of a live allocation,
///   e.g. when it was already freed.
pub(crate) fn free<T>(ptr: NonNull<T>) -> Result<()> {
    let address = ptr.as_ptr() as usize;
    let layout = registry()?.remove(&address).ok_or_else(|| {
        PencilFftError::OwnershipViolation(format!(
            "free of unknown device pointer {:#x}",
            address
        ))
    })?;

    // SAFETY: the registry entry proves the pointer came from `allocate` with
    // exactly this layout and has not been freed since.
    unsafe { memory::dealloc(ptr.cast::<u8>(), layout)? };
    tracing::trace!(address, bytes = layout.size(), "device free");
    Ok(())
}

/// Number of `T` elements the live allocation at `ptr` can hold, `None` when
/// `ptr` is not the base of a live allocation.
pub(crate) fn capacity<T>(ptr: NonNull<T>) -> Option<usize> {
    let registry = registry().ok()?;
    registry
        .get(&(ptr.as_ptr() as usize))
        .map(|layout| layout.size() / std::mem::size_of::<T>())
}

/// Copies host memory into device memory.
///
/// # Safety
/// `dst` must point into a live allocation with room for `src.len()`
/// elements.
pub(crate) unsafe fn copy_to_device<T: Scalar>(src: &[T], dst: NonNull<T>) -> Result<()> {
    memory::copy_to_device(src, dst)?;
    tracing::trace!(elements = src.len(), "host to device copy");
    Ok(())
}

/// Copies device memory into host memory.
///
/// # Safety
/// `src` must point into a live allocation holding at least `dst.len()`
/// initialized elements.
pub(crate) unsafe fn copy_to_host<T: Scalar>(src: NonNull<T>, dst: &mut [T]) -> Result<()> {
    memory::copy_to_host(src, dst)?;
    tracing::trace!(elements = dst.len(), "device to host copy");
    Ok(())
}

/// Copies `count` elements between two distinct device allocations.
///
/// # Safety
/// Both pointers must point into live, non-overlapping allocations with at
/// least `count` elements past them.
pub(crate) unsafe fn copy_on_device<T: Scalar>(
    src: NonNull<T>,
    dst: NonNull<T>,
    count: usize,
) -> Result<()> {
    memory::copy_on_device(src, dst, count)?;
    tracing::trace!(elements = count, "device to device copy");
    Ok(())
}

/// True when `ptr` is the base of a live device allocation.
pub fn is_live<T>(ptr: *const T) -> bool {
    NonNull::new(ptr.cast_mut()).is_some_and(|p| capacity(p).is_some())
}

/// Waits for all outstanding device work.
///
/// # Errors
/// * `DeviceAllocation` if the allocation registry is no longer usable.
/// * `DeviceRuntime` if the device reports a failure of earlier work.
pub fn synchronize() -> Result<()> {
    registry()?;
    memory::synchronize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::num_complex::Complex;

    #[test]
    fn test_allocate_and_free() -> Result<()> {
        let ptr = allocate::<Complex<f64>>(17)?;
        assert!(is_live(ptr.as_ptr()));
        assert_eq!(capacity(ptr), Some(17));

        free(ptr)?;
        Ok(())
    }

    #[test]
    fn test_unknown_pointer_is_rejected() {
        let mut host_value = 1.0f32;
        let foreign = NonNull::from(&mut host_value);
        assert!(!is_live(foreign.as_ptr()));
        assert_eq!(capacity(foreign), None);
        assert!(matches!(free(foreign), Err(PencilFftError::OwnershipViolation(_))));
    }

    #[test]
    fn test_zero_sized_allocation() {
        assert!(matches!(
            allocate::<f64>(0),
            Err(PencilFftError::DeviceAllocation(_))
        ));
    }

    #[test]
    fn test_copies_round_trip() -> Result<()> {
        let values = [1.5f32, -2.0, 8.25];
        let first = allocate::<f32>(values.len())?;
        let second = allocate::<f32>(values.len())?;
        let mut back = [0.0f32; 3];
        // SAFETY: both allocations hold exactly `values.len()` elements.
        unsafe {
            copy_to_device(&values, first)?;
            copy_on_device(first, second, values.len())?;
            copy_to_host(second, &mut back)?;
        }
        synchronize()?;
        assert_eq!(back, values);
        free(first)?;
        free(second)
    }
}
