// scanline_core/src/lidar/ray_tracing.rs

//! Hardware ray-tracing scan backend.
//!
//! A scan request cannot complete inside `execute_scan`: the work is handed to
//! the render domain, which runs a per-frame hook that dispatches the rays and
//! copies the results back to host memory some frames later. `execute_scan`
//! therefore stages the request and returns the most recently completed cloud.
//!
//! ```text
//! Idle -> ParamsStaged -> Dispatched -> ReadbackPending -> ReadbackReady -> Idle
//! ```
//!
//! Only one readback is ever in flight per strategy. A dispatch that completes
//! while a readback is outstanding waits for it to retire before its own copy
//! is requested.

use crate::error::GpuResult;
use crate::gpu::{
    AccelerationStructureHandle, BufferHandle, BufferUsage, FrameContext, FrameHookId,
    FrameHookRegistry, GpuLidarPoint, RayDispatch, RayTracingDevice, ReadbackHandle,
};
use crate::lidar::strategy::{ScanMode, ScanParameters, ScanStrategy};
use crate::messages::LidarPoint;
use crate::scene::TraceableScene;
use crate::utils::lock;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Where the pipeline currently stands, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    Idle,
    ParamsStaged,
    Dispatched,
    ReadbackPending,
    ReadbackReady,
}

/// State shared between the simulation thread and the render hook.
#[derive(Default)]
struct SharedSlots {
    /// Latest un-serviced request. Overwritten by each `execute_scan`.
    staged: Option<ScanParameters>,
    latest: Vec<LidarPoint>,
    /// `requested_at` of the request `latest` was traced for.
    latest_requested_at: Option<f64>,
}

/// A dispatch whose results sit in the device buffer, not yet copied.
#[derive(Debug, Clone, Copy)]
struct CompletedDispatch {
    samples: usize,
    requested_at: f64,
}

#[derive(Debug, Clone, Copy)]
struct InFlightReadback {
    handle: ReadbackHandle,
    requested_at: f64,
}

struct DeviceBuffers {
    directions: BufferHandle,
    results: BufferHandle,
    capacity: usize,
}

/// Render-side state, touched only from the frame hook and on teardown.
struct RenderPipeline {
    device: Arc<dyn RayTracingDevice>,
    buffers: Option<DeviceBuffers>,
    awaiting_copy: Option<CompletedDispatch>,
    in_flight: Option<InFlightReadback>,
    phase: PipelinePhase,
    completed_readbacks: u64,
    /// Consecutive frames a staged request waited for the acceleration structure.
    frames_waiting_for_scene: u64,
}

struct PipelineShared {
    slots: Mutex<SharedSlots>,
    render: Mutex<RenderPipeline>,
}

impl RenderPipeline {
    fn new(device: Arc<dyn RayTracingDevice>) -> Self {
        Self {
            device,
            buffers: None,
            awaiting_copy: None,
            in_flight: None,
            phase: PipelinePhase::Idle,
            completed_readbacks: 0,
            frames_waiting_for_scene: 0,
        }
    }

    fn on_frame(&mut self, slots: &Mutex<SharedSlots>, frame: &FrameContext) {
        self.retire_readback(slots);
        self.service_staged_request(slots, frame);
        self.request_pending_copy();

        self.phase = if self.in_flight.is_some() {
            PipelinePhase::ReadbackPending
        } else if self.awaiting_copy.is_some() {
            PipelinePhase::Dispatched
        } else {
            PipelinePhase::Idle
        };
    }

    // --- Stage 1: readback completion ---

    fn retire_readback(&mut self, slots: &Mutex<SharedSlots>) {
        let Some(InFlightReadback {
            handle: readback,
            requested_at,
        }) = self.in_flight
        else {
            return;
        };
        if !self.device.is_readback_ready(readback) {
            return;
        }
        self.phase = PipelinePhase::ReadbackReady;

        let mut decoded = Ok(Vec::new());
        let mapped = self.device.read_readback(readback, &mut |bytes| {
            decoded = GpuLidarPoint::decode_hits(bytes);
        });
        self.device.release_readback(readback);
        self.in_flight = None;

        match mapped.and(decoded) {
            Ok(points) => {
                let hits = points.len();
                let previous = {
                    let mut slots = lock(slots);
                    slots.latest_requested_at = Some(requested_at);
                    std::mem::replace(&mut slots.latest, points)
                };
                drop(previous);
                self.completed_readbacks += 1;
                trace!(hits, requested_at, "Ray-tracing readback retired");
            }
            Err(err) => warn!(error = %err, "Discarding ray-tracing readback"),
        }
    }

    // --- Stage 2: upload and dispatch ---

    fn service_staged_request(&mut self, slots: &Mutex<SharedSlots>, frame: &FrameContext) {
        let acceleration_structure = self.device.acceleration_structure();
        let mut scene_unavailable = false;

        let request = {
            let mut slots = lock(slots);
            if slots.staged.as_ref().is_some_and(|p| p.num_samples() == 0) {
                slots.staged = None;
            }
            match (slots.staged.is_some(), acceleration_structure) {
                (false, _) => None,
                (true, None) => {
                    scene_unavailable = true;
                    None
                }
                (true, Some(tlas)) => slots.staged.take().map(|params| (params, tlas)),
            }
        };

        if scene_unavailable {
            self.frames_waiting_for_scene += 1;
            if self.frames_waiting_for_scene == 1 {
                warn!(
                    frame = frame.frame_number,
                    "Scene acceleration structure unavailable; holding ray-tracing request"
                );
            } else {
                trace!(
                    frame = frame.frame_number,
                    waited = self.frames_waiting_for_scene,
                    "Still waiting for the scene acceleration structure"
                );
            }
            return;
        }
        if self.frames_waiting_for_scene > 0 {
            debug!(
                waited = self.frames_waiting_for_scene,
                "Scene acceleration structure available again"
            );
            self.frames_waiting_for_scene = 0;
        }
        let Some((params, tlas)) = request else {
            return;
        };

        match self.dispatch(&params, tlas) {
            Ok(samples) => {
                // Supersedes any earlier dispatch still waiting for its copy.
                self.awaiting_copy = Some(CompletedDispatch {
                    samples,
                    requested_at: params.requested_at,
                });
                trace!(frame = frame.frame_number, samples, "Dispatched ray-tracing scan");
            }
            Err(err) => warn!(error = %err, "Ray-tracing dispatch failed; dropping request"),
        }
    }

    fn dispatch(
        &mut self,
        params: &ScanParameters,
        acceleration_structure: AccelerationStructureHandle,
    ) -> GpuResult<usize> {
        let samples = params.num_samples();
        let buffers = self.ensure_buffers(samples)?;

        let directions: Vec<[f32; 3]> = params
            .sample_directions
            .iter()
            .map(|d| [d.x, d.y, d.z])
            .collect();
        self.device
            .upload(buffers.directions, bytemuck::cast_slice(&directions))?;

        let location = params.sensor_location.cast::<f32>();
        let rotation = params.sensor_rotation.quaternion();
        self.device.dispatch_rays(&RayDispatch {
            acceleration_structure,
            sensor_location: [location.x, location.y, location.z],
            sensor_rotation: [
                rotation.i as f32,
                rotation.j as f32,
                rotation.k as f32,
                rotation.w as f32,
            ],
            sample_directions: buffers.directions,
            num_samples: u32::try_from(samples).unwrap_or(u32::MAX),
            min_range: params.min_range,
            max_range: params.max_range,
            scan_results: buffers.results,
        })?;
        Ok(samples)
    }

    /// Returns buffers holding at least `samples` records, reallocating when short.
    fn ensure_buffers(&mut self, samples: usize) -> GpuResult<BufferPair> {
        if let Some(buffers) = &self.buffers {
            if buffers.capacity >= samples {
                return Ok(BufferPair {
                    directions: buffers.directions,
                    results: buffers.results,
                });
            }
        }
        self.release_buffers();

        let directions = self
            .device
            .create_buffer(BufferUsage::SampleDirections, samples * std::mem::size_of::<[f32; 3]>())?;
        let results = match self
            .device
            .create_buffer(BufferUsage::ScanResults, GpuLidarPoint::buffer_size(samples))
        {
            Ok(results) => results,
            Err(err) => {
                self.device.release_buffer(directions);
                return Err(err);
            }
        };
        debug!(capacity = samples, "Allocated ray-tracing scan buffers");
        self.buffers = Some(DeviceBuffers {
            directions,
            results,
            capacity: samples,
        });
        Ok(BufferPair {
            directions,
            results,
        })
    }

    // --- Stage 3: readback request ---

    fn request_pending_copy(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(completed) = self.awaiting_copy.take() else {
            return;
        };
        let Some(buffers) = &self.buffers else {
            return;
        };
        match self
            .device
            .request_readback(buffers.results, GpuLidarPoint::buffer_size(completed.samples))
        {
            Ok(handle) => {
                self.in_flight = Some(InFlightReadback {
                    handle,
                    requested_at: completed.requested_at,
                })
            }
            Err(err) => warn!(error = %err, "Ray-tracing readback request failed"),
        }
    }

    // --- Teardown ---

    fn release_buffers(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            self.device.release_buffer(buffers.directions);
            self.device.release_buffer(buffers.results);
        }
    }

    fn release(&mut self) {
        if let Some(readback) = self.in_flight.take() {
            self.device.release_readback(readback.handle);
        }
        self.awaiting_copy = None;
        self.release_buffers();
        self.phase = PipelinePhase::Idle;
    }
}

#[derive(Clone, Copy)]
struct BufferPair {
    directions: BufferHandle,
    results: BufferHandle,
}

/// Non-blocking scan backend driven by the render domain.
pub struct GpuRayTracingStrategy {
    shared: Arc<PipelineShared>,
    device: Arc<dyn RayTracingDevice>,
    hooks: Arc<FrameHookRegistry>,
    hook_id: FrameHookId,
    /// Pairs with the cloud handed out by the last `execute_scan`.
    returned_requested_at: Option<f64>,
}

impl std::fmt::Debug for GpuRayTracingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuRayTracingStrategy")
            .field("hook_id", &self.hook_id)
            .field("phase", &self.phase())
            .finish()
    }
}

impl GpuRayTracingStrategy {
    /// Creates the strategy and registers its per-frame hook.
    pub fn new(device: Arc<dyn RayTracingDevice>, hooks: Arc<FrameHookRegistry>) -> Self {
        let shared = Arc::new(PipelineShared {
            slots: Mutex::new(SharedSlots::default()),
            render: Mutex::new(RenderPipeline::new(Arc::clone(&device))),
        });

        let hook_state = Arc::clone(&shared);
        let hook_id = hooks.register(Box::new(move |frame| {
            lock(&hook_state.render).on_frame(&hook_state.slots, frame);
        }));

        Self {
            shared,
            device,
            hooks,
            hook_id,
            returned_requested_at: None,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        let phase = lock(&self.shared.render).phase;
        if phase == PipelinePhase::Idle && lock(&self.shared.slots).staged.is_some() {
            PipelinePhase::ParamsStaged
        } else {
            phase
        }
    }

    /// Number of readbacks converted into a published cloud so far.
    pub fn completed_readbacks(&self) -> u64 {
        lock(&self.shared.render).completed_readbacks
    }

    /// Frames the current staged request has been held for a missing
    /// acceleration structure. Zero once the scene is available.
    pub fn frames_waiting_for_scene(&self) -> u64 {
        lock(&self.shared.render).frames_waiting_for_scene
    }
}

impl ScanStrategy for GpuRayTracingStrategy {
    fn mode(&self) -> ScanMode {
        ScanMode::RayTracing
    }

    fn execute_scan(
        &mut self,
        params: &ScanParameters,
        _scene: Option<&dyn TraceableScene>,
    ) -> Vec<LidarPoint> {
        let mut slots = lock(&self.shared.slots);
        slots.staged = Some(params.clone());
        self.returned_requested_at = slots.latest_requested_at;
        slots.latest.clone()
    }

    fn returned_request_time(&self) -> Option<f64> {
        self.returned_requested_at
    }
}

impl Drop for GpuRayTracingStrategy {
    fn drop(&mut self) {
        // Waits for a frame in progress, so no hook can observe a torn-down pipeline.
        self.hooks.unregister(self.hook_id);
        self.device.flush();
        lock(&self.shared.render).release();
        debug!("Ray-tracing scan strategy released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Plane, PrimitiveScene};
    use crate::gpu::SoftwareRayTracingDevice;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    struct Rig {
        device: Arc<SoftwareRayTracingDevice>,
        hooks: Arc<FrameHookRegistry>,
        strategy: GpuRayTracingStrategy,
    }

    impl Rig {
        fn new(readback_latency: u32) -> Self {
            let scene = PrimitiveScene::new().with(
                Plane::new(Point3::new(10.0, 0.0, 0.0), -Vector3::x_axis()),
                None,
            );
            let device = Arc::new(
                SoftwareRayTracingDevice::new(Arc::new(scene)).with_readback_latency(readback_latency),
            );
            let hooks = Arc::new(FrameHookRegistry::new());
            let dyn_device: Arc<dyn RayTracingDevice> = device.clone();
            let strategy = GpuRayTracingStrategy::new(dyn_device, Arc::clone(&hooks));
            Self {
                device,
                hooks,
                strategy,
            }
        }

        fn frames(&self, count: usize) {
            for _ in 0..count {
                self.hooks.run_frame(1.0 / 60.0);
            }
        }

        fn scan(&mut self, params: &ScanParameters) -> Vec<LidarPoint> {
            self.strategy.execute_scan(params, None)
        }
    }

    fn forward_scan(max_range: f32) -> ScanParameters {
        ScanParameters {
            sensor_location: Point3::origin(),
            sensor_rotation: UnitQuaternion::identity(),
            sample_directions: Arc::from(vec![Vector3::x(), -Vector3::x()]),
            min_range: 0.5,
            max_range,
            requested_at: 0.0,
        }
    }

    /// `count` rays straight at the wall, requested at `requested_at`.
    fn wall_scan(count: usize, requested_at: f64) -> ScanParameters {
        ScanParameters {
            sample_directions: Arc::from(vec![Vector3::x(); count]),
            requested_at,
            ..forward_scan(100.0)
        }
    }

    #[test]
    fn first_scan_returns_immediately_with_empty_cloud() {
        let mut rig = Rig::new(0);
        assert!(rig.scan(&forward_scan(100.0)).is_empty());
        assert_eq!(rig.strategy.phase(), PipelinePhase::ParamsStaged);
        assert_eq!(rig.device.dispatch_count(), 0);
    }

    #[test]
    fn results_arrive_after_dispatch_and_readback_frames() {
        let mut rig = Rig::new(0);
        rig.scan(&forward_scan(100.0));

        rig.frames(1);
        assert_eq!(rig.device.dispatch_count(), 1);
        assert_eq!(rig.strategy.phase(), PipelinePhase::ReadbackPending);

        rig.frames(1);
        assert_eq!(rig.strategy.phase(), PipelinePhase::Idle);
        assert_eq!(rig.strategy.completed_readbacks(), 1);

        let points = rig.scan(&forward_scan(100.0));
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].position, Point3::new(10.0, 0.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn only_one_readback_is_in_flight() {
        let mut rig = Rig::new(5);
        let hit = forward_scan(100.0);
        let miss = forward_scan(5.0);

        rig.scan(&hit);
        rig.frames(1);
        assert_eq!(rig.device.readback_request_count(), 1);

        // A second dispatch completes while the first copy is outstanding.
        rig.scan(&miss);
        rig.frames(5);
        assert_eq!(rig.device.dispatch_count(), 2);
        assert_eq!(rig.device.readback_request_count(), 1);
        assert_eq!(rig.device.pending_readback_count(), 1);
        assert_eq!(rig.strategy.phase(), PipelinePhase::ReadbackPending);

        // The first copy retires and the waiting dispatch is requested in the same frame.
        rig.frames(1);
        assert_eq!(rig.device.readback_request_count(), 2);
        assert_eq!(rig.scan(&miss).len(), 1);

        rig.frames(6);
        assert!(rig.scan(&miss).is_empty());
    }

    #[test]
    fn dispatches_completed_during_a_readback_collapse_to_the_latest() {
        let mut rig = Rig::new(5);

        rig.scan(&wall_scan(1, 1.0));
        rig.frames(1);
        rig.scan(&wall_scan(2, 2.0));
        rig.frames(1);
        rig.scan(&wall_scan(3, 3.0));
        rig.frames(1);
        assert_eq!(rig.device.dispatch_count(), 3);
        assert_eq!(rig.device.readback_request_count(), 1);

        rig.frames(3);
        assert_eq!(rig.device.readback_request_count(), 1);

        // The first copy retires; only the newest waiting dispatch is copied next.
        rig.frames(1);
        assert_eq!(rig.device.readback_request_count(), 2);
        assert_eq!(rig.scan(&wall_scan(3, 4.0)).len(), 1);
        assert_eq!(rig.strategy.returned_request_time(), Some(1.0));

        // The t=3 copy retires and the request staged at t=4 is copied next.
        rig.frames(6);
        assert_eq!(rig.device.readback_request_count(), 3);
        assert_eq!(rig.scan(&wall_scan(3, 5.0)).len(), 3);
        assert_eq!(rig.strategy.returned_request_time(), Some(3.0));
    }

    #[test]
    fn returned_cloud_carries_its_request_time() {
        let mut rig = Rig::new(0);
        assert!(rig.scan(&wall_scan(1, 0.5)).is_empty());
        assert_eq!(rig.strategy.returned_request_time(), None);

        rig.frames(2);
        assert_eq!(rig.scan(&wall_scan(1, 0.6)).len(), 1);
        assert_eq!(rig.strategy.returned_request_time(), Some(0.5));
    }

    #[test]
    fn missing_acceleration_structure_keeps_request_staged() {
        let mut rig = Rig::new(0);
        rig.device.set_acceleration_structure_valid(false);
        rig.scan(&forward_scan(100.0));

        rig.frames(3);
        assert_eq!(rig.device.dispatch_count(), 0);
        assert_eq!(rig.strategy.phase(), PipelinePhase::ParamsStaged);
        assert_eq!(rig.strategy.frames_waiting_for_scene(), 3);

        rig.device.set_acceleration_structure_valid(true);
        rig.frames(2);
        assert_eq!(rig.strategy.frames_waiting_for_scene(), 0);
        assert_eq!(rig.device.dispatch_count(), 1);
        assert_eq!(rig.scan(&forward_scan(100.0)).len(), 1);
    }

    #[test]
    fn superseded_request_is_never_dispatched() {
        let mut rig = Rig::new(0);
        rig.scan(&forward_scan(5.0));
        rig.scan(&forward_scan(100.0));

        rig.frames(2);
        assert_eq!(rig.device.dispatch_count(), 1);
        assert_eq!(rig.scan(&forward_scan(100.0)).len(), 1);
    }

    #[test]
    fn empty_direction_set_is_ignored() {
        let mut rig = Rig::new(0);
        let mut params = forward_scan(100.0);
        params.sample_directions = Arc::from(Vec::<Vector3<f32>>::new());
        rig.scan(&params);

        rig.frames(2);
        assert_eq!(rig.device.dispatch_count(), 0);
        assert_eq!(rig.strategy.phase(), PipelinePhase::Idle);
    }

    #[test]
    fn buffers_grow_only_when_capacity_is_short() {
        let mut rig = Rig::new(0);
        rig.scan(&forward_scan(100.0));
        rig.frames(2);
        assert_eq!(rig.device.live_buffer_count(), 2);

        let mut wide = forward_scan(100.0);
        wide.sample_directions = Arc::from(vec![Vector3::x(); 16]);
        rig.scan(&wide);
        rig.frames(2);
        assert_eq!(rig.device.live_buffer_count(), 2);
        assert_eq!(rig.scan(&wide).len(), 16);
    }

    #[test]
    fn render_thread_drives_the_pipeline_while_scans_continue() {
        let mut rig = Rig::new(1);
        let hooks = Arc::clone(&rig.hooks);
        let stop = Arc::new(AtomicBool::new(false));
        let render = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    hooks.run_frame(1.0 / 60.0);
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };

        let params = forward_scan(100.0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut points = rig.scan(&params);
        while points.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
            points = rig.scan(&params);
        }
        stop.store(true, Ordering::Release);
        render.join().expect("render thread exits cleanly");

        assert_eq!(points.len(), 1);
        assert!(rig.device.dispatch_count() >= 1);
    }

    #[test]
    fn drop_unregisters_hook_and_releases_device_resources() {
        let Rig {
            device,
            hooks,
            mut strategy,
        } = Rig::new(10);
        strategy.execute_scan(&forward_scan(100.0), None);
        hooks.run_frame(0.0);
        assert_eq!(hooks.len(), 1);
        assert_eq!(device.pending_readback_count(), 1);

        drop(strategy);
        assert!(hooks.is_empty());
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.pending_readback_count(), 0);

        // Frames after teardown touch nothing.
        hooks.run_frame(0.0);
        assert_eq!(device.dispatch_count(), 1);
    }
}
