//! Line transforms and scaling running on the CPU.
//!
//! The host runs them blocks-in-sequence on the calling thread; the arena
//! device spreads the same blocks over the rayon pool.

use std::sync::Arc;

use num_traits::Zero;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{Direction, LineLayout};
use crate::error::Result;
use crate::scalar::{Precision, Scalar};

/// Elements scaled per block on data-parallel dispatch.
const SCALE_BLOCK: usize = 4096;

/// How the independent blocks of a batch are run.
pub(crate) trait Dispatch {
    /// Runs `kernel` on every consecutive block of `block` elements.
    fn for_each_block<T, K>(data: &mut [T], block: usize, kernel: K) -> Result<()>
    where
        T: Send,
        K: Fn(&mut [T]) -> Result<()> + Send + Sync;

    /// Runs `kernel` on matching pairs of source and destination blocks.
    fn for_each_block_pair<S, D, K>(
        src: &[S],
        src_block: usize,
        dst: &mut [D],
        dst_block: usize,
        kernel: K,
    ) -> Result<()>
    where
        S: Sync,
        D: Send,
        K: Fn(&[S], &mut [D]) -> Result<()> + Send + Sync;
}

pub(crate) struct Sequential;

#[cfg_attr(feature = "cuda", allow(dead_code))]
pub(crate) struct Parallel;

impl Dispatch for Sequential {
    fn for_each_block<T, K>(data: &mut [T], block: usize, kernel: K) -> Result<()>
    where
        T: Send,
        K: Fn(&mut [T]) -> Result<()> + Send + Sync,
    {
        data.chunks_mut(block).try_for_each(kernel)
    }

    fn for_each_block_pair<S, D, K>(
        src: &[S],
        src_block: usize,
        dst: &mut [D],
        dst_block: usize,
        kernel: K,
    ) -> Result<()>
    where
        S: Sync,
        D: Send,
        K: Fn(&[S], &mut [D]) -> Result<()> + Send + Sync,
    {
        src.chunks(src_block)
            .zip(dst.chunks_mut(dst_block))
            .try_for_each(|(s, d)| kernel(s, d))
    }
}

impl Dispatch for Parallel {
    fn for_each_block<T, K>(data: &mut [T], block: usize, kernel: K) -> Result<()>
    where
        T: Send,
        K: Fn(&mut [T]) -> Result<()> + Send + Sync,
    {
        data.par_chunks_mut(block).try_for_each(kernel)
    }

    fn for_each_block_pair<S, D, K>(
        src: &[S],
        src_block: usize,
        dst: &mut [D],
        dst_block: usize,
        kernel: K,
    ) -> Result<()>
    where
        S: Sync,
        D: Send,
        K: Fn(&[S], &mut [D]) -> Result<()> + Send + Sync,
    {
        src.par_chunks(src_block)
            .zip(dst.par_chunks_mut(dst_block))
            .try_for_each(|(s, d)| kernel(s, d))
    }
}

fn zero<F: Precision>() -> Complex<F> {
    Complex::new(F::zero(), F::zero())
}

/// Copies line `j` of a block with `stride` interleaved lines into `line`.
fn gather<T: Copy>(block: &[T], j: usize, stride: usize, line: &mut [T]) {
    for (dst, src) in line.iter_mut().zip(block[j..].iter().step_by(stride)) {
        *dst = *src;
    }
}

/// Inverse of [`gather`].
fn scatter<T: Copy>(line: &[T], j: usize, stride: usize, block: &mut [T]) {
    for (dst, src) in block[j..].iter_mut().step_by(stride).zip(line) {
        *dst = *src;
    }
}

/// In-place complex transform of every line in one block.
fn c2c_block<F: Precision>(fft: &dyn Fft<F>, layout: LineLayout, block: &mut [Complex<F>]) {
    let mut scratch = vec![zero::<F>(); fft.get_inplace_scratch_len()];
    if layout.stride == 1 {
        fft.process_with_scratch(block, &mut scratch);
        return;
    }
    let mut line = vec![zero::<F>(); layout.len];
    for j in 0..layout.stride {
        gather(block, j, layout.stride, &mut line);
        fft.process_with_scratch(&mut line, &mut scratch);
        scatter(&line, j, layout.stride, block);
    }
}

/// Complex transforms of one executor, planned with rustfft.
pub struct CpuC2c<F: Precision> {
    layout: LineLayout,
    forward: Arc<dyn Fft<F>>,
    inverse: Arc<dyn Fft<F>>,
}

impl<F: Precision> CpuC2c<F> {
    pub(crate) fn new(layout: LineLayout) -> Self {
        let mut planner = FftPlanner::<F>::new();
        Self {
            layout,
            forward: planner.plan_fft_forward(layout.len),
            inverse: planner.plan_fft_inverse(layout.len),
        }
    }

    fn plan(&self, direction: Direction) -> &dyn Fft<F> {
        match direction {
            Direction::Forward => &*self.forward,
            Direction::Inverse => &*self.inverse,
        }
    }

    pub(crate) fn execute<D: Dispatch>(
        &self,
        data: &mut [Complex<F>],
        direction: Direction,
    ) -> Result<()> {
        let fft = self.plan(direction);
        let layout = self.layout;
        D::for_each_block(data, layout.block(), |block| {
            c2c_block(fft, layout, block);
            Ok(())
        })
    }

    /// Forward transform of real lines into the full spectrum.
    pub(crate) fn real_to_full<D: Dispatch>(
        &self,
        src: &[F],
        dst: &mut [Complex<F>],
    ) -> Result<()> {
        let fft = &*self.forward;
        let layout = self.layout;
        let block = layout.block();
        D::for_each_block_pair(src, block, dst, block, |src, dst| {
            let mut scratch = vec![zero::<F>(); fft.get_inplace_scratch_len()];
            let mut line = vec![zero::<F>(); layout.len];
            for j in 0..layout.stride {
                for (c, &r) in line.iter_mut().zip(src[j..].iter().step_by(layout.stride)) {
                    *c = Complex::new(r, F::zero());
                }
                fft.process_with_scratch(&mut line, &mut scratch);
                scatter(&line, j, layout.stride, dst);
            }
            Ok(())
        })
    }

    /// Inverse transform of full spectra, keeping the real part.
    pub(crate) fn full_to_real<D: Dispatch>(
        &self,
        src: &[Complex<F>],
        dst: &mut [F],
    ) -> Result<()> {
        let fft = &*self.inverse;
        let layout = self.layout;
        let block = layout.block();
        D::for_each_block_pair(src, block, dst, block, |src, dst| {
            let mut scratch = vec![zero::<F>(); fft.get_inplace_scratch_len()];
            let mut line = vec![zero::<F>(); layout.len];
            for j in 0..layout.stride {
                gather(src, j, layout.stride, &mut line);
                fft.process_with_scratch(&mut line, &mut scratch);
                for (r, c) in dst[j..].iter_mut().step_by(layout.stride).zip(&line) {
                    *r = c.re;
                }
            }
            Ok(())
        })
    }
}

/// Real-to-complex transforms of one executor, planned with realfft.
pub struct CpuR2c<F: Precision> {
    layout: LineLayout,
    forward: Arc<dyn RealToComplex<F>>,
    inverse: Arc<dyn ComplexToReal<F>>,
}

impl<F: Precision> CpuR2c<F> {
    pub(crate) fn new(layout: LineLayout) -> Self {
        let mut planner = RealFftPlanner::<F>::new();
        Self {
            layout,
            forward: planner.plan_fft_forward(layout.len),
            inverse: planner.plan_fft_inverse(layout.len),
        }
    }

    pub(crate) fn forward<D: Dispatch>(&self, src: &[F], dst: &mut [Complex<F>]) -> Result<()> {
        let r2c = &*self.forward;
        let real = self.layout;
        let compact = real.compacted();
        D::for_each_block_pair(src, real.block(), dst, compact.block(), |src, dst| {
            let mut rline = r2c.make_input_vec();
            let mut cline = r2c.make_output_vec();
            let mut scratch = r2c.make_scratch_vec();
            for j in 0..real.stride {
                gather(src, j, real.stride, &mut rline);
                r2c.process_with_scratch(&mut rline, &mut cline, &mut scratch)?;
                scatter(&cline, j, compact.stride, dst);
            }
            Ok(())
        })
    }

    /// Inverse of [`forward`](Self::forward). The imaginary parts of the
    /// zero frequency and, for even lengths, of the Nyquist frequency are
    /// dropped before the transform.
    pub(crate) fn backward<D: Dispatch>(&self, src: &[Complex<F>], dst: &mut [F]) -> Result<()> {
        let c2r = &*self.inverse;
        let real = self.layout;
        let compact = real.compacted();
        D::for_each_block_pair(src, compact.block(), dst, real.block(), |src, dst| {
            let mut cline = c2r.make_input_vec();
            let mut rline = c2r.make_output_vec();
            let mut scratch = c2r.make_scratch_vec();
            for j in 0..real.stride {
                gather(src, j, compact.stride, &mut cline);
                cline[0].im = F::zero();
                if real.len % 2 == 0 {
                    cline[compact.len - 1].im = F::zero();
                }
                c2r.process_with_scratch(&mut cline, &mut rline, &mut scratch)?;
                scatter(&rline, j, real.stride, dst);
            }
            Ok(())
        })
    }
}

pub(crate) fn scale<D: Dispatch, T: Scalar>(values: &mut [T], scalar: f64) -> Result<()> {
    D::for_each_block(values, SCALE_BLOCK, |block| {
        block.iter_mut().for_each(|v| v.scale_by(scalar));
        Ok(())
    })
}
