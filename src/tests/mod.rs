//! Cross-module tests for the executors, scaling and device buffers.
//!
//! The reference coefficients use the box `{0, 0, 0}-{1, 2, 3}` (sizes
//! 2 x 3 x 4, 24 entries) filled with `1, 2, ..., 24` in storage order.


use crate::backend::{Backend, Device, Host};
use crate::device::DeviceBuffer;
use crate::scalar::{Precision, Scalar};
use rustfft::num_complex::Complex;

/// Moves test data to and from a location.
pub(crate) trait Staging: Backend {
    type Owned<T: Scalar>;

    fn stage<T: Scalar>(host: &[T]) -> Self::Owned<T>;
    fn zeros<T: Scalar>(len: usize) -> Self::Owned<T>;
    fn fetch<T: Scalar>(owned: &Self::Owned<T>) -> Vec<T>;
    fn borrow<T: Scalar>(owned: &Self::Owned<T>) -> &Self::Buffer<T>;
    fn borrow_mut<T: Scalar>(owned: &mut Self::Owned<T>) -> &mut Self::Buffer<T>;
}

impl Staging for Host {
    type Owned<T: Scalar> = Vec<T>;

    fn stage<T: Scalar>(host: &[T]) -> Vec<T> {
        host.to_vec()
    }

    fn zeros<T: Scalar>(len: usize) -> Vec<T> {
        vec![T::default(); len]
    }

    fn fetch<T: Scalar>(owned: &Vec<T>) -> Vec<T> {
        owned.clone()
    }

    fn borrow<T: Scalar>(owned: &Vec<T>) -> &[T] {
        owned.as_slice()
    }

    fn borrow_mut<T: Scalar>(owned: &mut Vec<T>) -> &mut [T] {
        owned.as_mut_slice()
    }
}

impl Staging for Device {
    type Owned<T: Scalar> = DeviceBuffer<T>;

    fn stage<T: Scalar>(host: &[T]) -> DeviceBuffer<T> {
        DeviceBuffer::load(host).unwrap()
    }

    fn zeros<T: Scalar>(len: usize) -> DeviceBuffer<T> {
        DeviceBuffer::with_len(len).unwrap()
    }

    fn fetch<T: Scalar>(owned: &DeviceBuffer<T>) -> Vec<T> {
        owned.unload().unwrap()
    }

    fn borrow<T: Scalar>(owned: &DeviceBuffer<T>) -> &DeviceBuffer<T> {
        owned
    }

    fn borrow_mut<T: Scalar>(owned: &mut DeviceBuffer<T>) -> &mut DeviceBuffer<T> {
        owned
    }
}

/// Widening conversion used by the comparisons.
pub(crate) trait ToC64: Copy {
    fn to_c64(self) -> Complex<f64>;
}

impl ToC64 for f32 {
    fn to_c64(self) -> Complex<f64> {
        Complex::new(f64::from(self), 0.0)
    }
}

impl ToC64 for f64 {
    fn to_c64(self) -> Complex<f64> {
        Complex::new(self, 0.0)
    }
}

impl ToC64 for Complex<f32> {
    fn to_c64(self) -> Complex<f64> {
        Complex::new(f64::from(self.re), f64::from(self.im))
    }
}

impl ToC64 for Complex<f64> {
    fn to_c64(self) -> Complex<f64> {
        self
    }
}

/// Relative tolerance for the precision `F`.
pub(crate) fn tolerance<F>() -> f64 {
    if std::mem::size_of::<F>() == 4 {
        5e-4
    } else {
        1e-9
    }
}

/// True when every entry is within `tolerance` of the reference, relative to
/// the larger of one and the reference magnitude.
pub(crate) fn approx<T: ToC64, R: ToC64>(result: &[T], reference: &[R], tolerance: f64) -> bool {
    result.len() == reference.len()
        && result.iter().zip(reference).all(|(&x, &y)| {
            let (x, y) = (x.to_c64(), y.to_c64());
            (x - y).norm() <= tolerance * y.norm().max(1.0)
        })
}

pub(crate) fn make_input<F: Precision>() -> Vec<F> {
    (1..=24).map(|i| F::from_scale(f64::from(i))).collect()
}

pub(crate) fn make_complex_input<F: Precision>() -> Vec<Complex<F>> {
    make_input::<F>()
        .into_iter()
        .map(|x| Complex::new(x, F::from_scale(0.0)))
        .collect()
}

/// Coefficients after transforming along dimension 0 (lines of length 2).
pub(crate) fn make_fft0() -> Vec<Complex<f64>> {
    let mut result = vec![Complex::new(0.0, 0.0); 24];
    for i in (0..24).step_by(2) {
        result[i] = Complex::new(3.0 + 2.0 * i as f64, 0.0);
        result[i + 1] = Complex::new(-1.0, 0.0);
    }
    result
}

/// Coefficients after transforming along dimension 1 (lines of length 3).
pub(crate) fn make_fft1() -> Vec<Complex<f64>> {
    let mut result = vec![Complex::new(0.0, 0.0); 24];
    for j in 0..4 {
        for i in 0..2 {
            result[6 * j + i] = Complex::new((2 * j + i + 1) as f64 * 9.0 - i as f64 * 6.0, 0.0);
            result[6 * j + i + 2] = Complex::new(-3.0, 1.73205080756888);
            result[6 * j + i + 4] = Complex::new(-3.0, -1.73205080756888);
        }
    }
    result
}

/// Same as [`make_fft1`] keeping only the non-redundant coefficients.
pub(crate) fn make_fft1_r2c() -> Vec<Complex<f64>> {
    let mut result = vec![Complex::new(0.0, 0.0); 16];
    for j in 0..4 {
        for i in 0..2 {
            result[4 * j + i] = Complex::new((2 * j + i + 1) as f64 * 9.0 - i as f64 * 6.0, 0.0);
            result[4 * j + i + 2] = Complex::new(-3.0, 1.73205080756888);
        }
    }
    result
}

/// Coefficients after transforming along dimension 2 (lines of length 4).
pub(crate) fn make_fft2() -> Vec<Complex<f64>> {
    let mut result = vec![Complex::new(0.0, 0.0); 24];
    for i in 0..6 {
        result[i] = Complex::new(40.0 + 4.0 * i as f64, 0.0);
        result[i + 6] = Complex::new(-12.0, 12.0);
        result[i + 12] = Complex::new(-12.0, 0.0);
        result[i + 18] = Complex::new(-12.0, -12.0);
    }
    result
}

/// Same as [`make_fft2`] keeping only the non-redundant coefficients.
pub(crate) fn make_fft2_r2c() -> Vec<Complex<f64>> {
    let mut full = make_fft2();
    full.truncate(18);
    full
}
