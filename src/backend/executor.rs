//! Batched 1-D transforms along one axis of a 3-D box.
//!
//! Both executor families plan their transforms once at construction and
//! reuse the plans for every call. Results are never normalized: a forward
//! followed by a backward transform multiplies the data by `size(axis)`.

use std::fmt;
use std::marker::PhantomData;

use rustfft::num_complex::Complex;

use super::{Backend, Device, Direction, Host, LineLayout};
use crate::error::{PencilFftError, Result};
use crate::geometry::{check_axis, Box3d};
use crate::scalar::Precision;

pub type HostFftExecutor<F> = FftExecutor<Host, F>;
pub type DeviceFftExecutor<F> = FftExecutor<Device, F>;
pub type HostFftExecutorR2c<F> = FftExecutorR2c<Host, F>;
pub type DeviceFftExecutorR2c<F> = FftExecutorR2c<Device, F>;

/// Checks that a buffer of the box can be addressed at this location.
fn plan_layout<B: Backend, F: Precision>(geometry: &Box3d, axis: usize) -> Result<LineLayout> {
    check_axis(axis)?;
    let element = std::mem::size_of::<Complex<F>>();
    let addressable = geometry
        .count()
        .and_then(|count| count.checked_mul(element))
        .is_some_and(|bytes| bytes <= isize::MAX as usize);
    if !addressable {
        return Err(init_error::<B>(geometry, axis, "box data exceeds the addressable size"));
    }
    Ok(LineLayout::new(geometry.sizes(), axis))
}

fn init_error<B: Backend>(geometry: &Box3d, axis: usize, reason: impl ToString) -> PencilFftError {
    PencilFftError::BackendInitialization {
        backend: B::NAME,
        geometry: *geometry,
        axis,
        reason: reason.to_string(),
    }
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(PencilFftError::SizeMismatch { expected, got });
    }
    Ok(())
}

/// Complex-to-complex executor bound to one box and axis.
///
/// Besides the in-place complex transforms it accepts real input, producing
/// the full (non-compacted) spectrum, and can return the real part of an
/// inverse transform.
pub struct FftExecutor<B: Backend, F: Precision> {
    geometry: Box3d,
    axis: usize,
    layout: LineLayout,
    plan: B::C2cPlan<F>,
    _location: PhantomData<B>,
}

impl<B: Backend, F: Precision> FftExecutor<B, F> {
    /// Plans the transforms of length `geometry.size(axis)`.
    ///
    /// # Errors
    /// * `InvalidAxis` if `axis > 2`.
    /// * `BackendInitialization` if the box data cannot be addressed or the
    ///   location cannot plan the transforms.
    pub fn new(geometry: Box3d, axis: usize) -> Result<Self> {
        let layout = plan_layout::<B, F>(&geometry, axis)?;
        let plan = B::plan_c2c::<F>(layout).map_err(|e| init_error::<B>(&geometry, axis, e))?;
        tracing::debug!(
            backend = B::NAME,
            geometry = %geometry,
            axis,
            length = layout.len,
            batch = layout.stride * layout.blocks,
            "planned c2c executor"
        );
        Ok(Self {
            geometry,
            axis,
            layout,
            plan,
            _location: PhantomData,
        })
    }

    pub fn geometry(&self) -> &Box3d {
        &self.geometry
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Number of elements of the input and output buffers.
    pub fn box_size(&self) -> usize {
        self.layout.total()
    }

    /// Un-normalized forward transform in place.
    pub fn forward(&mut self, data: &mut B::Buffer<Complex<F>>) -> Result<()> {
        self.execute(data, Direction::Forward, "forward")
    }

    /// Un-normalized inverse transform in place.
    pub fn backward(&mut self, data: &mut B::Buffer<Complex<F>>) -> Result<()> {
        self.execute(data, Direction::Inverse, "backward")
    }

    /// Forward transform of real input into the full complex spectrum.
    pub fn forward_real(
        &mut self,
        input: &B::Buffer<F>,
        output: &mut B::Buffer<Complex<F>>,
    ) -> Result<()> {
        check_len(self.box_size(), B::owned_len(input, "forward")?)?;
        check_len(self.box_size(), B::owned_len(output, "forward")?)?;
        B::real_to_full(&self.plan, input, output)
    }

    /// Inverse transform of a full complex spectrum, keeping the real part.
    pub fn backward_real(
        &mut self,
        input: &B::Buffer<Complex<F>>,
        output: &mut B::Buffer<F>,
    ) -> Result<()> {
        check_len(self.box_size(), B::owned_len(input, "backward")?)?;
        check_len(self.box_size(), B::owned_len(output, "backward")?)?;
        B::full_to_real(&self.plan, input, output)
    }

    fn execute(
        &self,
        data: &mut B::Buffer<Complex<F>>,
        direction: Direction,
        operation: &str,
    ) -> Result<()> {
        check_len(self.box_size(), B::owned_len(data, operation)?)?;
        B::c2c(&self.plan, data, direction)
    }
}

impl<B: Backend, F: Precision> fmt::Debug for FftExecutor<B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftExecutor")
            .field("backend", &B::NAME)
            .field("geometry", &self.geometry)
            .field("axis", &self.axis)
            .finish()
    }
}

/// Real-to-complex executor bound to one box and axis.
///
/// The forward transform keeps only the `size(axis) / 2 + 1` non-redundant
/// coefficients of every line; the backward transform rebuilds the full real
/// line from them. Imaginary parts that a real signal cannot produce (the
/// zero frequency and, for even lengths, the Nyquist frequency) are ignored.
pub struct FftExecutorR2c<B: Backend, F: Precision> {
    geometry: Box3d,
    axis: usize,
    layout: LineLayout,
    plan: B::R2cPlan<F>,
    _location: PhantomData<B>,
}

impl<B: Backend, F: Precision> FftExecutorR2c<B, F> {
    /// Plans the real transforms of length `geometry.size(axis)`.
    ///
    /// # Errors
    /// * `InvalidAxis` if `axis > 2`.
    /// * `BackendInitialization` if the box data cannot be addressed or the
    ///   location cannot plan the transforms.
    pub fn new(geometry: Box3d, axis: usize) -> Result<Self> {
        let layout = plan_layout::<B, F>(&geometry, axis)?;
        let plan = B::plan_r2c::<F>(layout).map_err(|e| init_error::<B>(&geometry, axis, e))?;
        tracing::debug!(
            backend = B::NAME,
            geometry = %geometry,
            axis,
            length = layout.len,
            batch = layout.stride * layout.blocks,
            "planned r2c executor"
        );
        Ok(Self {
            geometry,
            axis,
            layout,
            plan,
            _location: PhantomData,
        })
    }

    pub fn geometry(&self) -> &Box3d {
        &self.geometry
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Number of elements of the box, same as [`real_size`](Self::real_size).
    pub fn box_size(&self) -> usize {
        self.layout.total()
    }

    /// Number of real elements of the input of `forward`.
    pub fn real_size(&self) -> usize {
        self.layout.total()
    }

    /// Number of complex elements of the output of `forward`.
    pub fn complex_size(&self) -> usize {
        self.layout.compacted().total()
    }

    pub fn forward(
        &mut self,
        input: &B::Buffer<F>,
        output: &mut B::Buffer<Complex<F>>,
    ) -> Result<()> {
        check_len(self.real_size(), B::owned_len(input, "forward")?)?;
        check_len(self.complex_size(), B::owned_len(output, "forward")?)?;
        B::r2c(&self.plan, input, output)
    }

    pub fn backward(
        &mut self,
        input: &B::Buffer<Complex<F>>,
        output: &mut B::Buffer<F>,
    ) -> Result<()> {
        check_len(self.complex_size(), B::owned_len(input, "backward")?)?;
        check_len(self.real_size(), B::owned_len(output, "backward")?)?;
        B::c2r(&self.plan, input, output)
    }
}

impl<B: Backend, F: Precision> fmt::Debug for FftExecutorR2c<B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftExecutorR2c")
            .field("backend", &B::NAME)
            .field("geometry", &self.geometry)
            .field("axis", &self.axis)
            .finish()
    }
}
