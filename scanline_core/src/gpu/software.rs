// scanline_core/src/gpu/software.rs

//! A CPU emulation of the ray-tracing device.
//!
//! Buffers live in host memory, the ray-generation / closest-hit / miss stages
//! run on the rayon pool against a [`TraceableScene`], and readbacks complete
//! only after a configurable number of polls so callers observe the same
//! latency a real device pipeline would impose.

use crate::error::{GpuError, GpuResult};
use crate::gpu::device::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, RayDispatch, RayTracingDevice,
    ReadbackHandle,
};
use crate::gpu::layout::GpuLidarPoint;
use crate::messages::LidarPoint;
use crate::scene::{RayQuery, TraceableScene};
use crate::utils::lock;
use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

const DIRECTION_STRIDE: usize = std::mem::size_of::<[f32; 3]>();

struct DeviceBuffer {
    usage: BufferUsage,
    bytes: Vec<u8>,
}

struct PendingReadback {
    bytes: Vec<u8>,
    polls_remaining: u32,
}

#[derive(Default)]
struct DeviceState {
    next_handle: u64,
    buffers: HashMap<BufferHandle, DeviceBuffer>,
    readbacks: HashMap<ReadbackHandle, PendingReadback>,
}

impl DeviceState {
    fn allocate_id(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct SoftwareRayTracingDevice {
    /// Geometry the current acceleration structure was built from.
    scene: Mutex<Arc<dyn TraceableScene>>,
    ray_tracing_supported: AtomicBool,
    acceleration_valid: AtomicBool,
    acceleration_generation: AtomicU64,
    readback_latency: AtomicU32,
    dispatch_count: AtomicU64,
    readback_request_count: AtomicU64,
    state: Mutex<DeviceState>,
}

impl std::fmt::Debug for SoftwareRayTracingDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareRayTracingDevice")
            .field("ray_tracing_supported", &self.supports_ray_tracing())
            .field("acceleration_structure", &self.acceleration_structure())
            .field("readback_latency", &self.readback_latency())
            .field("dispatch_count", &self.dispatch_count())
            .finish()
    }
}

impl SoftwareRayTracingDevice {
    /// A device tracing against `scene`, with readbacks ready on the first poll.
    pub fn new(scene: Arc<dyn TraceableScene>) -> Self {
        Self {
            scene: Mutex::new(scene),
            ray_tracing_supported: AtomicBool::new(true),
            acceleration_valid: AtomicBool::new(true),
            acceleration_generation: AtomicU64::new(1),
            readback_latency: AtomicU32::new(0),
            dispatch_count: AtomicU64::new(0),
            readback_request_count: AtomicU64::new(0),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Number of `is_readback_ready` polls that report "not ready" before a readback completes.
    pub fn with_readback_latency(self, polls: u32) -> Self {
        self.set_readback_latency(polls);
        self
    }

    pub fn set_readback_latency(&self, polls: u32) {
        self.readback_latency.store(polls, Ordering::Relaxed);
    }

    pub fn readback_latency(&self) -> u32 {
        self.readback_latency.load(Ordering::Relaxed)
    }

    pub fn set_ray_tracing_supported(&self, supported: bool) {
        self.ray_tracing_supported.store(supported, Ordering::Relaxed);
    }

    /// Marks the acceleration structure stale (`false`) or rebuilt (`true`).
    /// A rebuild issues a new handle.
    pub fn set_acceleration_structure_valid(&self, valid: bool) {
        if valid && !self.acceleration_valid.load(Ordering::Acquire) {
            self.acceleration_generation.fetch_add(1, Ordering::AcqRel);
        }
        self.acceleration_valid.store(valid, Ordering::Release);
    }

    /// Replaces the traced geometry and issues a new acceleration-structure
    /// handle. Dispatches recorded against the old handle are rejected.
    pub fn rebuild_acceleration_structure(&self, scene: Arc<dyn TraceableScene>) {
        *lock(&self.scene) = scene;
        self.acceleration_generation.fetch_add(1, Ordering::AcqRel);
        self.acceleration_valid.store(true, Ordering::Release);
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count.load(Ordering::Acquire)
    }

    pub fn readback_request_count(&self) -> u64 {
        self.readback_request_count.load(Ordering::Acquire)
    }

    pub fn live_buffer_count(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    pub fn pending_readback_count(&self) -> usize {
        lock(&self.state).readbacks.len()
    }

    // --- Shader stages ---

    fn ray_gen(
        scene: &dyn TraceableScene,
        origin: &Point3<f64>,
        rotation: &UnitQuaternion<f64>,
        direction: &[f32; 3],
        min_range: f32,
        max_range: f32,
    ) -> GpuLidarPoint {
        let local = Vector3::new(direction[0], direction[1], direction[2]).cast::<f64>();
        let world = rotation * local;
        let query = RayQuery::new(
            origin + world * f64::from(min_range),
            origin + world * f64::from(max_range),
        );
        match scene.cast_ray(&query) {
            Some(hit) => Self::closest_hit(&hit.impact_point),
            None => Self::miss(),
        }
    }

    fn closest_hit(impact_point: &Point3<f64>) -> GpuLidarPoint {
        GpuLidarPoint::from(&LidarPoint::placeholder_hit(impact_point.cast::<f32>()))
    }

    fn miss() -> GpuLidarPoint {
        GpuLidarPoint::miss()
    }
}

impl RayTracingDevice for SoftwareRayTracingDevice {
    fn supports_ray_tracing(&self) -> bool {
        self.ray_tracing_supported.load(Ordering::Relaxed)
    }

    fn acceleration_structure(&self) -> Option<AccelerationStructureHandle> {
        self.acceleration_valid
            .load(Ordering::Acquire)
            .then(|| AccelerationStructureHandle(self.acceleration_generation.load(Ordering::Acquire)))
    }

    fn create_buffer(&self, usage: BufferUsage, size_bytes: usize) -> GpuResult<BufferHandle> {
        let mut state = lock(&self.state);
        let handle = BufferHandle(state.allocate_id());
        state.buffers.insert(
            handle,
            DeviceBuffer {
                usage,
                bytes: vec![0; size_bytes],
            },
        );
        trace!(?handle, ?usage, size_bytes, "created device buffer");
        Ok(handle)
    }

    fn upload(&self, buffer: BufferHandle, bytes: &[u8]) -> GpuResult<()> {
        let mut state = lock(&self.state);
        let target = state
            .buffers
            .get_mut(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?;
        if bytes.len() > target.bytes.len() {
            return Err(GpuError::BufferTooSmall {
                needed: bytes.len(),
                capacity: target.bytes.len(),
            });
        }
        target.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn dispatch_rays(&self, dispatch: &RayDispatch) -> GpuResult<()> {
        if !self.supports_ray_tracing() {
            return Err(GpuError::RayTracingUnsupported);
        }
        if self.acceleration_structure() != Some(dispatch.acceleration_structure) {
            return Err(GpuError::InvalidAccelerationStructure);
        }

        let num_samples = dispatch.num_samples as usize;
        let directions: Vec<[f32; 3]> = {
            let state = lock(&self.state);
            let source = state
                .buffers
                .get(&dispatch.sample_directions)
                .ok_or(GpuError::UnknownBuffer(dispatch.sample_directions))?;
            let needed = num_samples * DIRECTION_STRIDE;
            if source.bytes.len() < needed {
                return Err(GpuError::BufferTooSmall {
                    needed,
                    capacity: source.bytes.len(),
                });
            }
            let results = state
                .buffers
                .get(&dispatch.scan_results)
                .ok_or(GpuError::UnknownBuffer(dispatch.scan_results))?;
            let output_needed = GpuLidarPoint::buffer_size(num_samples);
            if results.bytes.len() < output_needed {
                return Err(GpuError::BufferTooSmall {
                    needed: output_needed,
                    capacity: results.bytes.len(),
                });
            }
            source.bytes[..needed]
                .chunks_exact(DIRECTION_STRIDE)
                .map(bytemuck::pod_read_unaligned::<[f32; 3]>)
                .collect()
        };

        let [lx, ly, lz] = dispatch.sensor_location;
        let origin = Point3::new(lx, ly, lz).cast::<f64>();
        let [qx, qy, qz, qw] = dispatch.sensor_rotation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(
            f64::from(qw),
            f64::from(qx),
            f64::from(qy),
            f64::from(qz),
        ));

        let scene = Arc::clone(&lock(&self.scene));

        // One ray-generation invocation per sample.
        let records: Vec<GpuLidarPoint> = directions
            .par_iter()
            .map(|direction| {
                Self::ray_gen(
                    scene.as_ref(),
                    &origin,
                    &rotation,
                    direction,
                    dispatch.min_range,
                    dispatch.max_range,
                )
            })
            .collect();

        let mut state = lock(&self.state);
        let target = state
            .buffers
            .get_mut(&dispatch.scan_results)
            .ok_or(GpuError::UnknownBuffer(dispatch.scan_results))?;
        target.bytes[..GpuLidarPoint::buffer_size(num_samples)]
            .copy_from_slice(bytemuck::cast_slice(&records));
        self.dispatch_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn request_readback(
        &self,
        buffer: BufferHandle,
        size_bytes: usize,
    ) -> GpuResult<ReadbackHandle> {
        let mut state = lock(&self.state);
        let source = state
            .buffers
            .get(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?;
        if source.bytes.len() < size_bytes {
            return Err(GpuError::BufferTooSmall {
                needed: size_bytes,
                capacity: source.bytes.len(),
            });
        }
        let pending = PendingReadback {
            bytes: source.bytes[..size_bytes].to_vec(),
            polls_remaining: self.readback_latency(),
        };
        let handle = ReadbackHandle(state.allocate_id());
        state.readbacks.insert(handle, pending);
        self.readback_request_count.fetch_add(1, Ordering::AcqRel);
        Ok(handle)
    }

    fn is_readback_ready(&self, readback: ReadbackHandle) -> bool {
        let mut state = lock(&self.state);
        match state.readbacks.get_mut(&readback) {
            Some(pending) if pending.polls_remaining == 0 => true,
            Some(pending) => {
                pending.polls_remaining -= 1;
                false
            }
            None => false,
        }
    }

    fn read_readback(
        &self,
        readback: ReadbackHandle,
        visit: &mut dyn FnMut(&[u8]),
    ) -> GpuResult<()> {
        let state = lock(&self.state);
        let pending = state
            .readbacks
            .get(&readback)
            .ok_or(GpuError::UnknownReadback(readback))?;
        if pending.polls_remaining != 0 {
            return Err(GpuError::ReadbackNotReady(readback));
        }
        visit(&pending.bytes);
        Ok(())
    }

    fn release_readback(&self, readback: ReadbackHandle) {
        lock(&self.state).readbacks.remove(&readback);
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        if let Some(released) = lock(&self.state).buffers.remove(&buffer) {
            trace!(?buffer, usage = ?released.usage, "released device buffer");
        }
    }

    fn flush(&self) {
        for pending in lock(&self.state).readbacks.values_mut() {
            pending.polls_remaining = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Plane, PrimitiveScene};
    use approx::assert_relative_eq;

    fn wall_device(distance: f64) -> SoftwareRayTracingDevice {
        let scene = PrimitiveScene::new().with(
            Plane::new(Point3::new(distance, 0.0, 0.0), -Vector3::x_axis()),
            None,
        );
        SoftwareRayTracingDevice::new(Arc::new(scene))
    }

    fn dispatch_forward(
        device: &SoftwareRayTracingDevice,
        directions: &[[f32; 3]],
    ) -> GpuResult<BufferHandle> {
        let dirs = device.create_buffer(
            BufferUsage::SampleDirections,
            directions.len() * DIRECTION_STRIDE,
        )?;
        let out = device.create_buffer(
            BufferUsage::ScanResults,
            GpuLidarPoint::buffer_size(directions.len()),
        )?;
        device.upload(dirs, bytemuck::cast_slice(directions))?;
        device.dispatch_rays(&RayDispatch {
            acceleration_structure: device
                .acceleration_structure()
                .ok_or(GpuError::InvalidAccelerationStructure)?,
            sensor_location: [0.0; 3],
            sensor_rotation: [0.0, 0.0, 0.0, 1.0],
            sample_directions: dirs,
            num_samples: directions.len() as u32,
            min_range: 0.5,
            max_range: 100.0,
            scan_results: out,
        })?;
        Ok(out)
    }

    #[test]
    fn dispatch_writes_hit_and_miss_records() {
        let device = wall_device(10.0);
        let out = dispatch_forward(&device, &[[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]]).unwrap();

        let readback = device
            .request_readback(out, GpuLidarPoint::buffer_size(2))
            .unwrap();
        assert!(device.is_readback_ready(readback));

        let mut points = Vec::new();
        device
            .read_readback(readback, &mut |bytes| {
                points = GpuLidarPoint::decode_hits(bytes).unwrap();
            })
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].position.x, 10.0, epsilon = 1e-4);
        assert_eq!(device.dispatch_count(), 1);
    }

    #[test]
    fn readback_completes_after_latency_polls() {
        let device = wall_device(10.0).with_readback_latency(2);
        let out = dispatch_forward(&device, &[[1.0, 0.0, 0.0]]).unwrap();
        let readback = device.request_readback(out, GpuLidarPoint::STRIDE).unwrap();

        assert_eq!(
            device.read_readback(readback, &mut |_| {}),
            Err(GpuError::ReadbackNotReady(readback))
        );
        assert!(!device.is_readback_ready(readback));
        assert!(!device.is_readback_ready(readback));
        assert!(device.is_readback_ready(readback));

        device.release_readback(readback);
        assert_eq!(device.pending_readback_count(), 0);
    }

    #[test]
    fn flush_completes_outstanding_readbacks() {
        let device = wall_device(10.0).with_readback_latency(100);
        let out = dispatch_forward(&device, &[[1.0, 0.0, 0.0]]).unwrap();
        let readback = device.request_readback(out, GpuLidarPoint::STRIDE).unwrap();
        device.flush();
        assert!(device.is_readback_ready(readback));
    }

    #[test]
    fn stale_acceleration_structure_rejects_dispatch() {
        let device = wall_device(10.0);
        let stale = device.acceleration_structure().unwrap();
        device.set_acceleration_structure_valid(false);
        assert!(device.acceleration_structure().is_none());
        assert_eq!(
            dispatch_forward(&device, &[[1.0, 0.0, 0.0]]),
            Err(GpuError::InvalidAccelerationStructure)
        );

        device.set_acceleration_structure_valid(true);
        assert_ne!(device.acceleration_structure(), Some(stale));
        assert!(dispatch_forward(&device, &[[1.0, 0.0, 0.0]]).is_ok());
    }

    #[test]
    fn rebuilt_scene_is_traced_under_a_new_handle() {
        let device = wall_device(10.0);
        let before = device.acceleration_structure();
        device.set_acceleration_structure_valid(false);

        let nearer = PrimitiveScene::new().with(
            Plane::new(Point3::new(4.0, 0.0, 0.0), -Vector3::x_axis()),
            None,
        );
        device.rebuild_acceleration_structure(Arc::new(nearer));
        assert!(device.acceleration_structure().is_some());
        assert_ne!(device.acceleration_structure(), before);

        let out = dispatch_forward(&device, &[[1.0, 0.0, 0.0]]).unwrap();
        let readback = device.request_readback(out, GpuLidarPoint::STRIDE).unwrap();
        let mut points = Vec::new();
        device
            .read_readback(readback, &mut |bytes| {
                points = GpuLidarPoint::decode_hits(bytes).unwrap();
            })
            .unwrap();
        assert_relative_eq!(points[0].position.x, 4.0, epsilon = 1e-4);
    }

    #[test]
    fn buffer_bookkeeping() {
        let device = wall_device(10.0);
        let buffer = device.create_buffer(BufferUsage::ScanResults, 8).unwrap();
        assert_eq!(
            device.upload(buffer, &[0u8; 16]),
            Err(GpuError::BufferTooSmall {
                needed: 16,
                capacity: 8
            })
        );
        assert_eq!(device.live_buffer_count(), 1);
        device.release_buffer(buffer);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(
            device.upload(buffer, &[0u8; 4]),
            Err(GpuError::UnknownBuffer(buffer))
        );
    }

    #[test]
    fn unsupported_device_refuses_dispatch() {
        let device = wall_device(10.0);
        device.set_ray_tracing_supported(false);
        assert_eq!(
            dispatch_forward(&device, &[[1.0, 0.0, 0.0]]),
            Err(GpuError::RayTracingUnsupported)
        );
    }
}
