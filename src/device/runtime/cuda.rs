//! Device memory served by the CUDA driver.
//!
//! All allocations and transforms share the primary context of device 0,
//! created on first use and bound to every thread that touches the device.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use cudarc::driver::{result as driver, CudaContext, CudaStream, DriverError};

use crate::error::{PencilFftError, Result};

static CONTEXT: OnceLock<std::result::Result<Arc<CudaContext>, String>> = OnceLock::new();

pub(crate) fn driver_error(operation: &str, err: DriverError) -> PencilFftError {
    PencilFftError::DeviceRuntime(format!("{}: {:?}", operation, err))
}

/// The context of device 0, bound to the calling thread.
pub(crate) fn context() -> Result<Arc<CudaContext>> {
    let ctx = CONTEXT
        .get_or_init(|| CudaContext::new(0).map_err(|e| format!("{:?}", e)))
        .as_ref()
        .map_err(|e| PencilFftError::DeviceRuntime(format!("no CUDA device: {}", e)))?;
    ctx.bind_to_thread().map_err(|e| driver_error("bind context", e))?;
    Ok(Arc::clone(ctx))
}

/// Stream on which transforms and kernels are queued.
pub(crate) fn stream() -> Result<Arc<CudaStream>> {
    Ok(context()?.default_stream())
}

fn address<T>(ptr: NonNull<T>) -> u64 {
    ptr.as_ptr() as usize as u64
}

pub(super) fn alloc_zeroed(layout: Layout) -> Result<NonNull<u8>> {
    context()?;
    let bytes = layout.size();
    // SAFETY: the context is current on this thread.
    let raw = unsafe { driver::malloc_sync(bytes) }.map_err(|e| {
        PencilFftError::DeviceAllocation(format!("cuMemAlloc of {} bytes: {:?}", bytes, e))
    })?;
    // SAFETY: `raw` is a fresh allocation of `bytes` bytes.
    if let Err(err) = unsafe { driver::memset_d8_sync(raw, 0, bytes) } {
        // SAFETY: nothing else has seen the allocation yet.
        let _ = unsafe { driver::free_sync(raw) };
        return Err(driver_error("zero new allocation", err));
    }
    NonNull::new(raw as usize as *mut u8).ok_or_else(|| {
        PencilFftError::DeviceAllocation("driver returned a null device pointer".to_string())
    })
}

/// # Safety
/// `ptr` must come from [`alloc_zeroed`] and must not be used afterwards.
pub(super) unsafe fn dealloc(ptr: NonNull<u8>, _layout: Layout) -> Result<()> {
    context()?;
    driver::free_sync(address(ptr)).map_err(|e| driver_error("cuMemFree", e))
}

pub(super) unsafe fn copy_to_device<T>(src: &[T], dst: NonNull<T>) -> Result<()> {
    context()?;
    driver::memcpy_htod_sync(address(dst), src).map_err(|e| driver_error("host to device copy", e))
}

pub(super) unsafe fn copy_to_host<T>(src: NonNull<T>, dst: &mut [T]) -> Result<()> {
    context()?;
    driver::memcpy_dtoh_sync(dst, address(src)).map_err(|e| driver_error("device to host copy", e))
}

pub(super) unsafe fn copy_on_device<T>(
    src: NonNull<T>,
    dst: NonNull<T>,
    count: usize,
) -> Result<()> {
    context()?;
    let bytes = count * std::mem::size_of::<T>();
    driver::memcpy_dtod_sync(address(dst), address(src), bytes)
        .map_err(|e| driver_error("device to device copy", e))
}

pub(super) fn synchronize() -> Result<()> {
    context()?
        .synchronize()
        .map_err(|e| driver_error("context synchronize", e))
}
