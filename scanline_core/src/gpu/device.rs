// scanline_core/src/gpu/device.rs

use crate::error::GpuResult;

/// Opaque handle to a device-side buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque handle to an asynchronous device-to-host copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadbackHandle(pub u64);

/// Opaque handle to the scene's top-level acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccelerationStructureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Read-only structured buffer of `[f32; 3]` ray directions.
    SampleDirections,
    /// Read-write structured buffer of `GpuLidarPoint` results.
    ScanResults,
}

/// Parameter block for one ray-generation dispatch, one invocation per sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayDispatch {
    pub acceleration_structure: AccelerationStructureHandle,
    pub sensor_location: [f32; 3],
    /// Sensor orientation as `[x, y, z, w]`.
    pub sensor_rotation: [f32; 4],
    pub sample_directions: BufferHandle,
    pub num_samples: u32,
    pub min_range: f32,
    pub max_range: f32,
    pub scan_results: BufferHandle,
}

/// The GPU submission capability the ray-tracing scan path schedules work on.
///
/// All methods are called from the render domain (the per-frame hook), except
/// `supports_ray_tracing`, which is queried at strategy selection.
pub trait RayTracingDevice: Send + Sync {
    fn supports_ray_tracing(&self) -> bool;

    /// The current scene acceleration structure, or `None` while it is unbuilt or stale.
    fn acceleration_structure(&self) -> Option<AccelerationStructureHandle>;

    fn create_buffer(&self, usage: BufferUsage, size_bytes: usize) -> GpuResult<BufferHandle>;

    fn upload(&self, buffer: BufferHandle, bytes: &[u8]) -> GpuResult<()>;

    /// Enqueues the ray-generation, closest-hit and miss stages.
    fn dispatch_rays(&self, dispatch: &RayDispatch) -> GpuResult<()>;

    /// Enqueues a copy of the first `size_bytes` of `buffer` to host memory.
    fn request_readback(&self, buffer: BufferHandle, size_bytes: usize)
        -> GpuResult<ReadbackHandle>;

    /// Polls a readback; never blocks.
    fn is_readback_ready(&self, readback: ReadbackHandle) -> bool;

    /// Maps a completed readback, hands its bytes to `visit`, then unmaps.
    fn read_readback(
        &self,
        readback: ReadbackHandle,
        visit: &mut dyn FnMut(&[u8]),
    ) -> GpuResult<()>;

    fn release_readback(&self, readback: ReadbackHandle);

    fn release_buffer(&self, buffer: BufferHandle);

    /// Blocks until every submitted command has retired.
    fn flush(&self);
}
