//! Element types accepted by executors, scaling and device buffers.

use std::fmt::Debug;

use rustfft::num_complex::Complex;
use rustfft::FftNum;

mod sealed {
    pub trait Sealed {}
}

/// A real or complex floating-point element.
///
/// The all-zero bit pattern is a valid value of every implementor, which is
/// what a freshly sized device allocation holds.
pub trait Scalar: sealed::Sealed + Copy + Default + Debug + Send + Sync + 'static {
    /// Number of real components, 1 for real and 2 for complex elements.
    const COMPONENTS: usize;

    /// Multiplies the element by a real scalar in place.
    fn scale_by(&mut self, scalar: f64);
}

/// Floating-point precision of a transform, `f32` or `f64`.
pub trait Precision: Scalar + FftNum {
    /// Converts a scaling factor to this precision.
    fn from_scale(scalar: f64) -> Self;
}

macro_rules! impl_precision {
    ($($real:ty),*) => {$(
        impl sealed::Sealed for $real {}

        impl Scalar for $real {
            const COMPONENTS: usize = 1;

            #[inline]
            fn scale_by(&mut self, scalar: f64) {
                *self *= scalar as $real;
            }
        }

        impl Precision for $real {
            #[inline]
            fn from_scale(scalar: f64) -> Self {
                scalar as $real
            }
        }
    )*};
}

impl_precision!(f32, f64);

impl<F: Precision> sealed::Sealed for Complex<F> {}

impl<F: Precision> Scalar for Complex<F> {
    const COMPONENTS: usize = 2;

    #[inline]
    fn scale_by(&mut self, scalar: f64) {
        *self = *self * F::from_scale(scalar);
    }
}
