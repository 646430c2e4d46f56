// scanline_sim/src/simulation/plugins/render_hooks.rs

//! The render-domain side of the GPU scan path.
//!
//! [`FrameHooks`] is the registry ray-tracing strategies attach their
//! per-frame pipeline to; it is driven once per Bevy frame in `Last`.
//! [`RenderDevices`] owns the emulated ray-tracing devices handed to sensors.

use std::sync::Arc;

use scanline_core::gpu::{FrameHookRegistry, SoftwareRayTracingDevice};
use scanline_core::lidar::strategy::ScanBackends;
use scanline_core::prelude::TraceableScene;

use crate::prelude::*;
use crate::simulation::config::structs::RayTracingConfig;

#[derive(Resource, Clone, Default, Debug)]
pub struct FrameHooks(pub Arc<FrameHookRegistry>);

/// A device created for one sensor.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub label: String,
    /// The agent carrying the sensor; its body is left out of the traced scene.
    pub owner: Entity,
    pub device: Arc<SoftwareRayTracingDevice>,
}

#[derive(Resource, Default, Debug)]
pub struct RenderDevices {
    devices: Vec<DeviceEntry>,
}

impl RenderDevices {
    /// Creates a device tracing against `scene` and returns the backends a
    /// LiDAR needs to use it.
    pub fn create_ray_tracing_backend(
        &mut self,
        label: impl Into<String>,
        owner: Entity,
        scene: Arc<dyn TraceableScene>,
        config: &RayTracingConfig,
        hooks: &FrameHooks,
    ) -> ScanBackends {
        let device = Arc::new(
            SoftwareRayTracingDevice::new(scene).with_readback_latency(config.readback_latency),
        );
        device.set_ray_tracing_supported(config.supported);
        self.devices.push(DeviceEntry {
            label: label.into(),
            owner,
            device: Arc::clone(&device),
        });
        ScanBackends::with_ray_tracing(device, Arc::clone(&hooks.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

pub struct RenderHooksPlugin;

impl Plugin for RenderHooksPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FrameHooks>()
            .init_resource::<RenderDevices>()
            .add_systems(Last, run_frame_hooks);
    }
}

fn run_frame_hooks(hooks: Res<FrameHooks>, time: Res<Time>) {
    hooks.0.run_frame(time.delta_secs());
}
