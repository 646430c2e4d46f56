// scanline_core/src/error.rs

use thiserror::Error;

use crate::gpu::{BufferHandle, ReadbackHandle};

/// Failures reported by a `RayTracingDevice`.
///
/// These never cross the `ScanStrategy` boundary: the GPU strategy logs them and
/// abandons the work for that frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("hardware ray tracing is not supported by this device")]
    RayTracingUnsupported,

    #[error("the scene acceleration structure is missing or stale")]
    InvalidAccelerationStructure,

    #[error("unknown device buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    #[error("unknown readback {0:?}")]
    UnknownReadback(ReadbackHandle),

    #[error("buffer too small: {needed} bytes needed, {capacity} available")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("readback {0:?} has not completed yet")]
    ReadbackNotReady(ReadbackHandle),

    #[error("byte length {len} is not a whole number of {stride}-byte records")]
    MisalignedData { len: usize, stride: usize },
}

/// Result alias
pub type GpuResult<T> = std::result::Result<T, GpuError>;
