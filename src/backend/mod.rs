//! Execution locations and the transform executors built on them.
//!
//! The set of locations is closed: [`Host`] and [`Device`] are zero-sized
//! tags implementing the sealed [`Backend`] trait, and every executor is
//! generic over the tag. Choosing a location is a compile-time decision, so
//! the per-line transform loops are monomorphized for each location.
//!
//! A location decides which buffer type holds the data (`[T]` on the host,
//! [`DeviceBuffer`](crate::DeviceBuffer) on the device), which library plans
//! the 1-D transforms and how the independent blocks of a batch run. The host plans with
//! rustfft and runs blocks one after the other on the calling thread. With
//! the `cuda` feature the device plans batched cuFFT transforms and scales
//! with NVRTC kernels; without it the device runs the rustfft plans over its
//! arena as one data-parallel batch and synchronizes before returning.

mod cpu;
#[cfg(feature = "cuda")]
mod cufft;
mod executor;

pub use executor::{
    DeviceFftExecutor, DeviceFftExecutorR2c, FftExecutor, FftExecutorR2c, HostFftExecutor,
    HostFftExecutorR2c,
};

use rustfft::num_complex::Complex;

use crate::error::Result;
use crate::scalar::{Precision, Scalar};
use cpu::{CpuC2c, CpuR2c, Sequential};

mod sealed {
    pub trait Sealed {}
}

/// Sign of the exponent of a complex transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// Execution location of a transform or scaling operation.
///
/// Kernels assume the callers checked buffer lengths against the plan
/// layout; executors and [`crate::DataScaling`] always do.
pub trait Backend: sealed::Sealed + Send + Sync + 'static {
    /// Short name used in logs and errors.
    const NAME: &'static str;

    /// Buffer type holding `T` elements at this location.
    type Buffer<T: Scalar>: ?Sized;

    /// Complex transforms of one executor.
    type C2cPlan<F: Precision>: Send + Sync;

    /// Real-to-complex transforms of one executor.
    type R2cPlan<F: Precision>: Send + Sync;

    /// Number of elements of `buffer`.
    ///
    /// # Errors
    /// * `OwnershipViolation` naming `operation` if a device buffer is empty.
    fn owned_len<T: Scalar>(buffer: &Self::Buffer<T>, operation: &str) -> Result<usize>;

    fn plan_c2c<F: Precision>(layout: LineLayout) -> Result<Self::C2cPlan<F>>;

    fn plan_r2c<F: Precision>(layout: LineLayout) -> Result<Self::R2cPlan<F>>;

    /// Transforms every line of `data` in place.
    fn c2c<F: Precision>(
        plan: &Self::C2cPlan<F>,
        data: &mut Self::Buffer<Complex<F>>,
        direction: Direction,
    ) -> Result<()>;

    /// Forward transform of real lines into full complex spectra.
    fn real_to_full<F: Precision>(
        plan: &Self::C2cPlan<F>,
        input: &Self::Buffer<F>,
        output: &mut Self::Buffer<Complex<F>>,
    ) -> Result<()>;

    /// Inverse transform of full spectra, keeping the real part.
    fn full_to_real<F: Precision>(
        plan: &Self::C2cPlan<F>,
        input: &Self::Buffer<Complex<F>>,
        output: &mut Self::Buffer<F>,
    ) -> Result<()>;

    /// Forward transform of real lines into Hermitian-compacted spectra.
    fn r2c<F: Precision>(
        plan: &Self::R2cPlan<F>,
        input: &Self::Buffer<F>,
        output: &mut Self::Buffer<Complex<F>>,
    ) -> Result<()>;

    /// Inverse of [`r2c`](Self::r2c), leaving `input` untouched.
    fn c2r<F: Precision>(
        plan: &Self::R2cPlan<F>,
        input: &Self::Buffer<Complex<F>>,
        output: &mut Self::Buffer<F>,
    ) -> Result<()>;

    /// Multiplies the first `count` elements of `data` by `scalar`.
    fn scale<T: Scalar>(data: &mut Self::Buffer<T>, count: usize, scalar: f64) -> Result<()>;
}

/// Host memory, executed sequentially on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Host;

/// Device memory held in [`DeviceBuffer`](crate::DeviceBuffer)s, executed as
/// data-parallel batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Device;

impl sealed::Sealed for Host {}
impl sealed::Sealed for Device {}

impl Backend for Host {
    const NAME: &'static str = "host";

    type Buffer<T: Scalar> = [T];
    type C2cPlan<F: Precision> = CpuC2c<F>;
    type R2cPlan<F: Precision> = CpuR2c<F>;

    fn owned_len<T: Scalar>(buffer: &[T], _operation: &str) -> Result<usize> {
        Ok(buffer.len())
    }

    fn plan_c2c<F: Precision>(layout: LineLayout) -> Result<CpuC2c<F>> {
        Ok(CpuC2c::new(layout))
    }

    fn plan_r2c<F: Precision>(layout: LineLayout) -> Result<CpuR2c<F>> {
        Ok(CpuR2c::new(layout))
    }

    fn c2c<F: Precision>(
        plan: &CpuC2c<F>,
        data: &mut [Complex<F>],
        direction: Direction,
    ) -> Result<()> {
        plan.execute::<Sequential>(data, direction)
    }

    fn real_to_full<F: Precision>(
        plan: &CpuC2c<F>,
        input: &[F],
        output: &mut [Complex<F>],
    ) -> Result<()> {
        plan.real_to_full::<Sequential>(input, output)
    }

    fn full_to_real<F: Precision>(
        plan: &CpuC2c<F>,
        input: &[Complex<F>],
        output: &mut [F],
    ) -> Result<()> {
        plan.full_to_real::<Sequential>(input, output)
    }

    fn r2c<F: Precision>(plan: &CpuR2c<F>, input: &[F], output: &mut [Complex<F>]) -> Result<()> {
        plan.forward::<Sequential>(input, output)
    }

    fn c2r<F: Precision>(plan: &CpuR2c<F>, input: &[Complex<F>], output: &mut [F]) -> Result<()> {
        plan.backward::<Sequential>(input, output)
    }

    fn scale<T: Scalar>(data: &mut [T], count: usize, scalar: f64) -> Result<()> {
        cpu::scale::<Sequential, T>(&mut data[..count], scalar)
    }
}

#[cfg(not(feature = "cuda"))]
mod arena {
    use rustfft::num_complex::Complex;

    use super::cpu::{self, CpuC2c, CpuR2c, Parallel};
    use super::{Backend, Device, Direction, LineLayout};
    use crate::device::{runtime, DeviceBuffer};
    use crate::error::Result;
    use crate::scalar::{Precision, Scalar};

    impl Backend for Device {
        const NAME: &'static str = "device";

        type Buffer<T: Scalar> = DeviceBuffer<T>;
        type C2cPlan<F: Precision> = CpuC2c<F>;
        type R2cPlan<F: Precision> = CpuR2c<F>;

        fn owned_len<T: Scalar>(buffer: &DeviceBuffer<T>, operation: &str) -> Result<usize> {
            buffer.device_ptr(operation).map(|_| buffer.len())
        }

        fn plan_c2c<F: Precision>(layout: LineLayout) -> Result<CpuC2c<F>> {
            Ok(CpuC2c::new(layout))
        }

        fn plan_r2c<F: Precision>(layout: LineLayout) -> Result<CpuR2c<F>> {
            Ok(CpuR2c::new(layout))
        }

        fn c2c<F: Precision>(
            plan: &CpuC2c<F>,
            data: &mut DeviceBuffer<Complex<F>>,
            direction: Direction,
        ) -> Result<()> {
            plan.execute::<Parallel>(data.kernel_view_mut("transform")?, direction)?;
            runtime::synchronize()
        }

        fn real_to_full<F: Precision>(
            plan: &CpuC2c<F>,
            input: &DeviceBuffer<F>,
            output: &mut DeviceBuffer<Complex<F>>,
        ) -> Result<()> {
            let src = input.kernel_view("forward")?;
            plan.real_to_full::<Parallel>(src, output.kernel_view_mut("forward")?)?;
            runtime::synchronize()
        }

        fn full_to_real<F: Precision>(
            plan: &CpuC2c<F>,
            input: &DeviceBuffer<Complex<F>>,
            output: &mut DeviceBuffer<F>,
        ) -> Result<()> {
            let src = input.kernel_view("backward")?;
            plan.full_to_real::<Parallel>(src, output.kernel_view_mut("backward")?)?;
            runtime::synchronize()
        }

        fn r2c<F: Precision>(
            plan: &CpuR2c<F>,
            input: &DeviceBuffer<F>,
            output: &mut DeviceBuffer<Complex<F>>,
        ) -> Result<()> {
            let src = input.kernel_view("forward")?;
            plan.forward::<Parallel>(src, output.kernel_view_mut("forward")?)?;
            runtime::synchronize()
        }

        fn c2r<F: Precision>(
            plan: &CpuR2c<F>,
            input: &DeviceBuffer<Complex<F>>,
            output: &mut DeviceBuffer<F>,
        ) -> Result<()> {
            let src = input.kernel_view("backward")?;
            plan.backward::<Parallel>(src, output.kernel_view_mut("backward")?)?;
            runtime::synchronize()
        }

        fn scale<T: Scalar>(data: &mut DeviceBuffer<T>, count: usize, scalar: f64) -> Result<()> {
            let values = data.kernel_view_mut("scale")?;
            cpu::scale::<Parallel, T>(&mut values[..count], scalar)?;
            runtime::synchronize()
        }
    }
}

/// Strided-line geometry of a 1-D transform along one axis of a box.
///
/// With dimension 0 contiguous, the lines along `axis` have `stride` equal
/// to the product of the lower extents. The data splits into `blocks`
/// contiguous, independent blocks of `stride * len` elements, each holding
/// `stride` interleaved lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    pub len: usize,
    pub stride: usize,
    pub blocks: usize,
}

impl LineLayout {
    pub fn new(sizes: [usize; 3], axis: usize) -> Self {
        Self {
            len: sizes[axis],
            stride: sizes[..axis].iter().product(),
            blocks: sizes[axis + 1..].iter().product(),
        }
    }

    pub fn block(&self) -> usize {
        self.stride * self.len
    }

    /// Layout of the Hermitian-compacted output along the same axis.
    pub fn compacted(&self) -> Self {
        Self {
            len: self.len / 2 + 1,
            ..*self
        }
    }

    pub fn total(&self) -> usize {
        self.block() * self.blocks
    }
}
