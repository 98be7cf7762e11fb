//! Device memory served from a host arena.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{PencilFftError, Result};

pub(super) fn alloc_zeroed(layout: Layout) -> Result<NonNull<u8>> {
    // SAFETY: `allocate` only asks for non-empty layouts.
    let raw = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(raw).ok_or_else(|| {
        PencilFftError::DeviceAllocation(format!("arena exhausted at {} bytes", layout.size()))
    })
}

/// # Safety
/// `ptr` must come from [`alloc_zeroed`] with the same `layout`.
pub(super) unsafe fn dealloc(ptr: NonNull<u8>, layout: Layout) -> Result<()> {
    alloc::dealloc(ptr.as_ptr(), layout);
    Ok(())
}

pub(super) unsafe fn copy_to_device<T>(src: &[T], dst: NonNull<T>) -> Result<()> {
    std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len());
    Ok(())
}

pub(super) unsafe fn copy_to_host<T>(src: NonNull<T>, dst: &mut [T]) -> Result<()> {
    std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), dst.len());
    Ok(())
}

pub(super) unsafe fn copy_on_device<T>(
    src: NonNull<T>,
    dst: NonNull<T>,
    count: usize,
) -> Result<()> {
    std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), count);
    Ok(())
}

/// Arena kernels finish before returning, nothing is ever outstanding.
pub(super) fn synchronize() -> Result<()> {
    Ok(())
}
