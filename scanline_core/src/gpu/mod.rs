// scanline_core/src/gpu/mod.rs

//! The GPU-side collaborators of the ray-tracing scan path: the device
//! capability, the per-frame hook registry that drives it, and the device
//! record layout.

pub mod device;
pub mod hooks;
pub mod layout;
pub mod software;

pub use device::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, RayDispatch, RayTracingDevice,
    ReadbackHandle,
};
pub use hooks::{FrameContext, FrameHook, FrameHookId, FrameHookRegistry};
pub use layout::GpuLidarPoint;
pub use software::SoftwareRayTracingDevice;
