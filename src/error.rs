use thiserror::Error;

use crate::geometry::Box3d;

#[derive(Error, Debug)]
pub enum PencilFftError {
    #[error("Invalid box: low {low:?} exceeds high {high:?} on axis {axis}")]
    InvalidBox {
        low: [i32; 3],
        high: [i32; 3],
        axis: usize,
    },

    #[error("Invalid process count: {0}")]
    InvalidProcessCount(usize),

    #[error("Empty box set: {0}")]
    EmptyBoxSet(String),

    #[error("Invalid decomposition of {world} over grid {grid:?}: {reason}")]
    InvalidDecomposition {
        world: Box3d,
        grid: Vec<usize>,
        reason: String,
    },

    #[error("Invalid axis {axis}, expected one of 0, 1, 2")]
    InvalidAxis { axis: usize },

    #[error("Boxes do not partition the world: {0}")]
    IncompleteWorld(String),

    #[error("Invalid plan options: {0}")]
    InvalidOptions(String),

    #[error(
        "Backend initialization failed for {backend} executor on {geometry} along axis {axis}: \
         {reason}"
    )]
    BackendInitialization {
        backend: &'static str,
        geometry: Box3d,
        axis: usize,
        reason: String,
    },

    #[error("Transform failed: {0}")]
    Transform(#[from] realfft::FftError),

    #[error("Size mismatch: expected {expected} elements, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),

    #[error("Device allocation failed: {0}")]
    DeviceAllocation(String),

    #[error("Device runtime error: {0}")]
    DeviceRuntime(String),
}

pub type Result<T> = std::result::Result<T, PencilFftError>;
