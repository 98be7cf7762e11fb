//! Device transforms on cuFFT, with the element-wise work done by NVRTC
//! kernels compiled on first use.
//!
//! cuFFT plans one line length per handle. Lines along axis 0 are contiguous
//! and the whole buffer runs as one batch; lines along the other axes are
//! interleaved with `stride`, so one plan covers the `stride` lines of a
//! block and runs once per block.

use std::ffi::c_int;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use cudarc::cufft::{result as cufft, sys, CudaFft, FftDirection};
use cudarc::driver::{CudaFunction, CudaStream, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::compile_ptx;
use rustfft::num_complex::Complex;

use super::{Backend, Device, Direction, LineLayout};
use crate::device::runtime::cuda::{context, driver_error, stream};
use crate::device::DeviceBuffer;
use crate::error::{PencilFftError, Result};
use crate::scalar::{Precision, Scalar};

const KERNEL_SOURCE: &str = r#"
#define GRID_STRIDE(i, n) \
    for (unsigned long long i = blockIdx.x * (unsigned long long)blockDim.x + threadIdx.x; \
         i < (n); i += (unsigned long long)blockDim.x * gridDim.x)

#define ELEMENTWISE(real, suffix) \
extern "C" __global__ void scale_##suffix(real *data, unsigned long long n, real s) { \
    GRID_STRIDE(i, n) data[i] *= s; \
} \
extern "C" __global__ void widen_##suffix(const real *src, real *dst, unsigned long long n) { \
    GRID_STRIDE(i, n) { dst[2 * i] = src[i]; dst[2 * i + 1] = 0; } \
} \
extern "C" __global__ void real_part_##suffix(const real *src, real *dst, unsigned long long n) { \
    GRID_STRIDE(i, n) dst[i] = src[2 * i]; \
} \
extern "C" __global__ void drop_edge_imag_##suffix(real *data, unsigned long long stride, \
        unsigned long long len, unsigned long long lines, unsigned int even) { \
    GRID_STRIDE(t, lines) { \
        unsigned long long first = (t / stride) * stride * len + t % stride; \
        data[2 * first + 1] = 0; \
        if (even) data[2 * (first + (len - 1) * stride) + 1] = 0; \
    } \
}

ELEMENTWISE(float, f32)
ELEMENTWISE(double, f64)
"#;

const THREADS: u32 = 256;
const MAX_BLOCKS: u64 = 65_535;

/// Element-wise kernels of one precision.
struct Kernels {
    scale: CudaFunction,
    widen: CudaFunction,
    real_part: CudaFunction,
    drop_edge_imag: CudaFunction,
}

static KERNELS: OnceLock<std::result::Result<[Kernels; 2], String>> = OnceLock::new();

fn load_kernels() -> Result<[Kernels; 2]> {
    let ptx = compile_ptx(KERNEL_SOURCE)
        .map_err(|e| PencilFftError::DeviceRuntime(format!("nvrtc: {:?}", e)))?;
    let module = context()?
        .load_module(ptx)
        .map_err(|e| driver_error("load kernel module", e))?;
    let load = |name: String| {
        module
            .load_function(&name)
            .map_err(|e| driver_error(&format!("load kernel {}", name), e))
    };
    let mut kernels = Vec::with_capacity(2);
    for suffix in ["f32", "f64"] {
        kernels.push(Kernels {
            scale: load(format!("scale_{}", suffix))?,
            widen: load(format!("widen_{}", suffix))?,
            real_part: load(format!("real_part_{}", suffix))?,
            drop_edge_imag: load(format!("drop_edge_imag_{}", suffix))?,
        });
    }
    let mut kernels = kernels.into_iter();
    match (kernels.next(), kernels.next()) {
        (Some(single), Some(double)) => Ok([single, double]),
        _ => Err(PencilFftError::DeviceRuntime("missing kernel set".to_string())),
    }
}

/// Kernels matching the precision of elements `T`.
fn kernels<T: Scalar>() -> Result<&'static Kernels> {
    let sets = KERNELS
        .get_or_init(|| load_kernels().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| PencilFftError::DeviceRuntime(e.clone()))?;
    Ok(&sets[usize::from(is_double::<T>())])
}

fn is_double<T: Scalar>() -> bool {
    std::mem::size_of::<T>() / T::COMPONENTS == 8
}

fn address<T>(ptr: NonNull<T>) -> u64 {
    ptr.as_ptr() as usize as u64
}

fn launch_config(n: u64) -> LaunchConfig {
    let blocks = n.div_ceil(u64::from(THREADS)).clamp(1, MAX_BLOCKS) as u32;
    LaunchConfig {
        grid_dim: (blocks, 1, 1),
        block_dim: (THREADS, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// Launches `kernel(src, dst, n)` over `n` elements and waits for it.
fn launch_copy(kernel: &CudaFunction, name: &str, src: u64, dst: u64, n: u64) -> Result<()> {
    let stream = stream()?;
    let mut launch = stream.launch_builder(kernel);
    launch.arg(&src).arg(&dst).arg(&n);
    // SAFETY: callers pass live allocations holding the `n` elements the
    // kernel reads from `src` and writes to `dst`.
    unsafe { launch.launch(launch_config(n)) }.map_err(|e| driver_error(name, e))?;
    stream.synchronize().map_err(|e| driver_error(name, e))
}

fn cufft_error(operation: &str, err: cufft::CufftError) -> PencilFftError {
    PencilFftError::DeviceRuntime(format!("cuFFT {}: {:?}", operation, err))
}

fn to_c_int(value: usize) -> Result<c_int> {
    c_int::try_from(value).map_err(|_| {
        PencilFftError::DeviceRuntime(format!("{} exceeds the cuFFT index range", value))
    })
}

/// A batched cuFFT plan over the lines of one layout.
struct LinePlan {
    fft: CudaFft,
    stream: Arc<CudaStream>,
    launches: usize,
    in_step: usize,
    out_step: usize,
}

impl LinePlan {
    /// `in_len` and `out_len` are the input and output line lengths, which
    /// differ from `layout.len` on the complex side of real transforms.
    fn new(
        layout: LineLayout,
        in_len: usize,
        out_len: usize,
        kind: sys::cufftType,
    ) -> Result<Self> {
        let stream = stream()?;
        let contiguous = layout.stride == 1;
        let (stride, batch, launches) = if contiguous {
            (1, layout.blocks, 1)
        } else {
            (layout.stride, layout.stride, layout.blocks)
        };
        let (idist, odist) = if contiguous { (in_len, out_len) } else { (1, 1) };

        let mut n = [to_c_int(layout.len)?];
        let mut inembed = [to_c_int(in_len)?];
        let mut onembed = [to_c_int(out_len)?];
        let stride = to_c_int(stride)?;
        let fft = CudaFft::plan_many(
            &mut n,
            Some(&mut inembed),
            stride,
            to_c_int(idist)?,
            Some(&mut onembed),
            stride,
            to_c_int(odist)?,
            kind,
            to_c_int(batch)?,
            stream.clone(),
        )
        .map_err(|e| cufft_error("plan", e))?;

        Ok(Self {
            fft,
            stream,
            launches,
            in_step: layout.stride * in_len,
            out_step: layout.stride * out_len,
        })
    }

    /// Runs `exec` on the input and output address of every launch, then
    /// waits for the stream.
    fn run<I, O, E>(&self, input: NonNull<I>, output: NonNull<O>, exec: E) -> Result<()>
    where
        E: Fn(sys::cufftHandle, *mut I, *mut O) -> std::result::Result<(), cufft::CufftError>,
    {
        let handle = self.fft.handle();
        for launch in 0..self.launches {
            let src = input.as_ptr().wrapping_add(launch * self.in_step);
            let dst = output.as_ptr().wrapping_add(launch * self.out_step);
            exec(handle, src, dst).map_err(|e| cufft_error("exec", e))?;
        }
        self.stream
            .synchronize()
            .map_err(|e| driver_error("transform synchronize", e))
    }

    fn c2c<F: Precision>(&self, data: NonNull<Complex<F>>, direction: Direction) -> Result<()> {
        let direction = match direction {
            Direction::Forward => FftDirection::Forward,
            Direction::Inverse => FftDirection::Inverse,
        } as c_int;
        // SAFETY: the plan was sized from the layout of `data`, which the
        // caller checked against the buffer length.
        self.run(data, data, |handle, src, dst| unsafe {
            if is_double::<F>() {
                cufft::exec_z2z(handle, src.cast(), dst.cast(), direction)
            } else {
                cufft::exec_c2c(handle, src.cast(), dst.cast(), direction)
            }
        })
    }
}

/// Complex transforms of one executor on cuFFT.
pub struct CufftC2c<F: Precision> {
    total: usize,
    lines: LinePlan,
    _precision: PhantomData<F>,
}

/// Real-to-complex transforms of one executor on cuFFT.
pub struct CufftR2c<F: Precision> {
    layout: LineLayout,
    forward: LinePlan,
    inverse: LinePlan,
    _precision: PhantomData<F>,
}

impl Backend for Device {
    const NAME: &'static str = "device";

    type Buffer<T: Scalar> = DeviceBuffer<T>;
    type C2cPlan<F: Precision> = CufftC2c<F>;
    type R2cPlan<F: Precision> = CufftR2c<F>;

    fn owned_len<T: Scalar>(buffer: &DeviceBuffer<T>, operation: &str) -> Result<usize> {
        buffer.device_ptr(operation).map(|_| buffer.len())
    }

    fn plan_c2c<F: Precision>(layout: LineLayout) -> Result<CufftC2c<F>> {
        let kind = if is_double::<F>() {
            sys::cufftType::CUFFT_Z2Z
        } else {
            sys::cufftType::CUFFT_C2C
        };
        Ok(CufftC2c {
            total: layout.total(),
            lines: LinePlan::new(layout, layout.len, layout.len, kind)?,
            _precision: PhantomData,
        })
    }

    fn plan_r2c<F: Precision>(layout: LineLayout) -> Result<CufftR2c<F>> {
        let (forward, inverse) = if is_double::<F>() {
            (sys::cufftType::CUFFT_D2Z, sys::cufftType::CUFFT_Z2D)
        } else {
            (sys::cufftType::CUFFT_R2C, sys::cufftType::CUFFT_C2R)
        };
        let compact = layout.compacted().len;
        Ok(CufftR2c {
            layout,
            forward: LinePlan::new(layout, layout.len, compact, forward)?,
            inverse: LinePlan::new(layout, compact, layout.len, inverse)?,
            _precision: PhantomData,
        })
    }

    fn c2c<F: Precision>(
        plan: &CufftC2c<F>,
        data: &mut DeviceBuffer<Complex<F>>,
        direction: Direction,
    ) -> Result<()> {
        plan.lines.c2c::<F>(data.device_ptr("transform")?, direction)
    }

    fn real_to_full<F: Precision>(
        plan: &CufftC2c<F>,
        input: &DeviceBuffer<F>,
        output: &mut DeviceBuffer<Complex<F>>,
    ) -> Result<()> {
        let src = input.device_ptr("forward")?;
        let dst = output.device_ptr("forward")?;
        let kernel = &kernels::<F>()?.widen;
        launch_copy(kernel, "widen", address(src), address(dst), plan.total as u64)?;
        plan.lines.c2c::<F>(dst, Direction::Forward)
    }

    fn full_to_real<F: Precision>(
        plan: &CufftC2c<F>,
        input: &DeviceBuffer<Complex<F>>,
        output: &mut DeviceBuffer<F>,
    ) -> Result<()> {
        let dst = output.device_ptr("backward")?;
        let scratch = input.try_clone()?;
        let work = scratch.device_ptr("backward")?;
        plan.lines.c2c::<F>(work, Direction::Inverse)?;
        let kernel = &kernels::<F>()?.real_part;
        launch_copy(kernel, "real part", address(work), address(dst), plan.total as u64)
    }

    fn r2c<F: Precision>(
        plan: &CufftR2c<F>,
        input: &DeviceBuffer<F>,
        output: &mut DeviceBuffer<Complex<F>>,
    ) -> Result<()> {
        let src = input.device_ptr("forward")?;
        let dst = output.device_ptr("forward")?;
        // SAFETY: the plan was sized from the layouts of both buffers.
        plan.forward.run(src, dst, |handle, src, dst| unsafe {
            if is_double::<F>() {
                cufft::exec_d2z(handle, src.cast(), dst.cast())
            } else {
                cufft::exec_r2c(handle, src.cast(), dst.cast())
            }
        })
    }

    fn c2r<F: Precision>(
        plan: &CufftR2c<F>,
        input: &DeviceBuffer<Complex<F>>,
        output: &mut DeviceBuffer<F>,
    ) -> Result<()> {
        let dst = output.device_ptr("backward")?;
        // complex-to-real execution overwrites its input
        let scratch = input.try_clone()?;
        let work = scratch.device_ptr("backward")?;

        let layout = plan.layout;
        let work_address = address(work);
        let (stride, len) = (layout.stride as u64, layout.compacted().len as u64);
        let lines = (layout.stride * layout.blocks) as u64;
        let even = u32::from(layout.len % 2 == 0);
        let stream = stream()?;
        let mut launch = stream.launch_builder(&kernels::<F>()?.drop_edge_imag);
        launch.arg(&work_address).arg(&stride).arg(&len).arg(&lines).arg(&even);
        // SAFETY: every line of the scratch copy holds `len` complex entries.
        unsafe { launch.launch(launch_config(lines)) }
            .map_err(|e| driver_error("drop edge imaginary parts", e))?;

        // SAFETY: the plan was sized from the layouts of both buffers.
        plan.inverse.run(work, dst, |handle, src, dst| unsafe {
            if is_double::<F>() {
                cufft::exec_z2d(handle, src.cast(), dst.cast())
            } else {
                cufft::exec_c2r(handle, src.cast(), dst.cast())
            }
        })
    }

    fn scale<T: Scalar>(data: &mut DeviceBuffer<T>, count: usize, scalar: f64) -> Result<()> {
        let ptr = data.device_ptr("scale")?;
        if count == 0 {
            return Ok(());
        }
        let values = address(ptr);
        let n = (count * T::COMPONENTS) as u64;
        let single = scalar as f32;
        let stream = stream()?;
        let mut launch = stream.launch_builder(&kernels::<T>()?.scale);
        launch.arg(&values).arg(&n);
        if is_double::<T>() {
            launch.arg(&scalar);
        } else {
            launch.arg(&single);
        }
        // SAFETY: the buffer holds at least `count` elements of
        // `T::COMPONENTS` reals each.
        unsafe { launch.launch(launch_config(n)) }.map_err(|e| driver_error("scale", e))?;
        stream.synchronize().map_err(|e| driver_error("scale", e))
    }
}
