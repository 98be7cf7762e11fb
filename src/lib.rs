//! Building blocks of distributed 3-D FFTs.
//!
//! The global index space is split into boxes owned by cooperating ranks.
//! This crate sizes the process grid, cuts the world into pencils in a fixed,
//! invertible order, and runs the batched 1-D transforms of one rank's box on
//! the host or on the device. Moving data between pencil layouts is left to
//! the communication layer, which consumes the boxes produced here.
//!
//! Building with the `cuda` feature puts device buffers in CUDA memory and
//! runs device executors on cuFFT. Without it the device location is served
//! by a host arena and runs the same transforms as data-parallel batches.

pub mod backend;
pub mod device;
pub mod error;
pub mod geometry;
pub mod pencils;
pub mod plan;
pub mod procgrid;
pub mod scalar;
pub mod scale;

#[cfg(test)]
mod tests;

pub use backend::{
    Backend, Device, DeviceFftExecutor, DeviceFftExecutorR2c, FftExecutor, FftExecutorR2c, Host,
    HostFftExecutor, HostFftExecutorR2c,
};
pub use device::{DeviceBuffer, DevicePtr};
pub use error::{PencilFftError, Result};
pub use geometry::{find_world, world_complete, Box3d};
pub use pencils::{make_pencils, reorder, split_world};
pub use plan::{LogicPlan, LogicStage, PlanOptions};
pub use procgrid::{factor_pairs, make_procgrid, proc_setup_min_surface};
pub use rustfft::num_complex::Complex;
pub use scalar::{Precision, Scalar};
pub use scale::DataScaling;
