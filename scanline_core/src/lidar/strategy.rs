// scanline_core/src/lidar/strategy.rs

use crate::gpu::{FrameHookRegistry, RayTracingDevice};
use crate::lidar::compute_shader::GpuComputeStrategy;
use crate::lidar::parallel_for::CpuParallelStrategy;
use crate::lidar::ray_tracing::GpuRayTracingStrategy;
use crate::messages::LidarPoint;
use crate::scene::{RayQuery, TraceableScene};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// The interchangeable scan execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanMode {
    #[default]
    ParallelFor,
    ComputeShader,
    RayTracing,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanMode::ParallelFor => "parallel-for",
            ScanMode::ComputeShader => "compute-shader",
            ScanMode::RayTracing => "ray-tracing",
        };
        f.write_str(name)
    }
}

/// A snapshot of everything a strategy needs for one scan.
///
/// Cheap to clone: the direction set is shared, never borrowed from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParameters {
    pub sensor_location: Point3<f64>,
    pub sensor_rotation: UnitQuaternion<f64>,
    pub sample_directions: Arc<[Vector3<f32>]>,
    pub min_range: f32,
    pub max_range: f32,
    /// Simulation time at which the scan was requested, in seconds.
    pub requested_at: f64,
}

impl ScanParameters {
    pub fn num_samples(&self) -> usize {
        self.sample_directions.len()
    }

    /// The world-space query for sample `direction`, clipped to `[min_range, max_range]`.
    pub fn ray_query(&self, direction: &Vector3<f32>) -> RayQuery {
        let world_direction = self.sensor_rotation * direction.cast::<f64>();
        RayQuery::new(
            self.sensor_location + world_direction * f64::from(self.min_range),
            self.sensor_location + world_direction * f64::from(self.max_range),
        )
    }
}

/// Produces a point cloud for a pose, a direction set and a range window.
///
/// Implementations never fail outward: problems are logged and an empty (or
/// the previously available) cloud is returned.
pub trait ScanStrategy: Send + Sync {
    fn mode(&self) -> ScanMode;

    fn execute_scan(
        &mut self,
        params: &ScanParameters,
        scene: Option<&dyn TraceableScene>,
    ) -> Vec<LidarPoint>;

    /// `requested_at` of the request whose results the last `execute_scan`
    /// returned. `None` means the results belong to the request just made.
    fn returned_request_time(&self) -> Option<f64> {
        None
    }
}

impl fmt::Debug for dyn ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanStrategy({})", self.mode())
    }
}

/// The GPU capability pair needed by the hardware ray-tracing backend.
#[derive(Clone)]
pub struct RayTracingBackend {
    pub device: Arc<dyn RayTracingDevice>,
    pub hooks: Arc<FrameHookRegistry>,
}

impl fmt::Debug for RayTracingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayTracingBackend")
            .field("supports_ray_tracing", &self.device.supports_ray_tracing())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Capabilities available when (re)building a strategy.
#[derive(Debug, Clone, Default)]
pub struct ScanBackends {
    pub ray_tracing: Option<RayTracingBackend>,
}

impl ScanBackends {
    pub fn cpu_only() -> Self {
        Self::default()
    }

    pub fn with_ray_tracing(
        device: Arc<dyn RayTracingDevice>,
        hooks: Arc<FrameHookRegistry>,
    ) -> Self {
        Self {
            ray_tracing: Some(RayTracingBackend { device, hooks }),
        }
    }
}

/// Constructs the strategy for `requested`, falling back to `ParallelFor` when
/// the backend is unavailable. Returns the mode actually built.
pub fn build_strategy(
    requested: ScanMode,
    backends: &ScanBackends,
) -> (Box<dyn ScanStrategy>, ScanMode) {
    match requested {
        ScanMode::ParallelFor => (Box::new(CpuParallelStrategy::new()), ScanMode::ParallelFor),
        ScanMode::ComputeShader => {
            if GpuComputeStrategy::is_available() {
                (Box::new(GpuComputeStrategy::new()), ScanMode::ComputeShader)
            } else {
                fallback(requested, "compute shader scanning is not implemented")
            }
        }
        ScanMode::RayTracing => match &backends.ray_tracing {
            Some(backend) if backend.device.supports_ray_tracing() => {
                info!("Initializing hardware ray-tracing scan strategy");
                (
                    Box::new(GpuRayTracingStrategy::new(
                        Arc::clone(&backend.device),
                        Arc::clone(&backend.hooks),
                    )),
                    ScanMode::RayTracing,
                )
            }
            Some(_) => fallback(requested, "device does not support hardware ray tracing"),
            None => fallback(requested, "no ray-tracing device is available"),
        },
    }
}

fn fallback(requested: ScanMode, reason: &str) -> (Box<dyn ScanStrategy>, ScanMode) {
    warn!(
        requested = %requested,
        reason,
        "Scan mode unavailable; falling back to parallel-for"
    );
    (Box::new(CpuParallelStrategy::new()), ScanMode::ParallelFor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PrimitiveScene;
    use crate::gpu::SoftwareRayTracingDevice;
    use approx::assert_relative_eq;

    fn software_backends(supported: bool) -> ScanBackends {
        let device = SoftwareRayTracingDevice::new(Arc::new(PrimitiveScene::new()));
        device.set_ray_tracing_supported(supported);
        ScanBackends::with_ray_tracing(Arc::new(device), Arc::new(FrameHookRegistry::new()))
    }

    #[test]
    fn parallel_for_is_always_built() {
        let (strategy, mode) = build_strategy(ScanMode::ParallelFor, &ScanBackends::cpu_only());
        assert_eq!(mode, ScanMode::ParallelFor);
        assert_eq!(strategy.mode(), ScanMode::ParallelFor);
    }

    #[test]
    fn unavailable_backends_fall_back_to_parallel_for() {
        let (_, mode) = build_strategy(ScanMode::ComputeShader, &software_backends(true));
        assert_eq!(mode, ScanMode::ParallelFor);

        let (_, mode) = build_strategy(ScanMode::RayTracing, &ScanBackends::cpu_only());
        assert_eq!(mode, ScanMode::ParallelFor);

        let (strategy, mode) = build_strategy(ScanMode::RayTracing, &software_backends(false));
        assert_eq!(mode, ScanMode::ParallelFor);
        assert_eq!(strategy.mode(), mode);
    }

    #[test]
    fn supported_device_builds_ray_tracing() {
        let backends = software_backends(true);
        let (strategy, mode) = build_strategy(ScanMode::RayTracing, &backends);
        assert_eq!(mode, ScanMode::RayTracing);
        assert_eq!(strategy.mode(), ScanMode::RayTracing);
        assert_eq!(backends.ray_tracing.as_ref().map(|b| b.hooks.len()), Some(1));

        drop(strategy);
        assert_eq!(backends.ray_tracing.as_ref().map(|b| b.hooks.len()), Some(0));
    }

    #[test]
    fn ray_query_is_rotated_and_range_clipped() {
        let params = ScanParameters {
            sensor_location: Point3::new(1.0, 2.0, 3.0),
            sensor_rotation: UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            sample_directions: Arc::from(vec![Vector3::x()]),
            min_range: 1.0,
            max_range: 10.0,
            requested_at: 0.0,
        };
        let query = params.ray_query(&params.sample_directions[0]);
        assert_relative_eq!(query.start, Point3::new(1.0, 3.0, 3.0), epsilon = 1e-9);
        assert_relative_eq!(query.end, Point3::new(1.0, 12.0, 3.0), epsilon = 1e-9);
        assert!(query.want_material);
    }

    #[test]
    fn scan_mode_display_names() {
        assert_eq!(ScanMode::ParallelFor.to_string(), "parallel-for");
        assert_eq!(ScanMode::RayTracing.to_string(), "ray-tracing");
    }
}
