// scanline_core/src/lidar/compute_shader.rs

use crate::lidar::strategy::{ScanMode, ScanParameters, ScanStrategy};
use crate::messages::LidarPoint;
use crate::scene::TraceableScene;
use tracing::debug;

/// Placeholder for a compute-shader scan backend.
///
/// Selection never builds it while [`GpuComputeStrategy::is_available`] is
/// false; a directly constructed instance returns empty clouds.
#[derive(Debug, Default)]
pub struct GpuComputeStrategy {
    scans_requested: u64,
}

impl GpuComputeStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_available() -> bool {
        false
    }

    pub fn scans_requested(&self) -> u64 {
        self.scans_requested
    }
}

impl ScanStrategy for GpuComputeStrategy {
    fn mode(&self) -> ScanMode {
        ScanMode::ComputeShader
    }

    fn execute_scan(
        &mut self,
        params: &ScanParameters,
        _scene: Option<&dyn TraceableScene>,
    ) -> Vec<LidarPoint> {
        self.scans_requested += 1;
        debug!(
            samples = params.num_samples(),
            "Compute shader scan requested; backend not implemented"
        );
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    use std::sync::Arc;

    #[test]
    fn placeholder_returns_empty_cloud() {
        let mut strategy = GpuComputeStrategy::new();
        let params = ScanParameters {
            sensor_location: Point3::origin(),
            sensor_rotation: UnitQuaternion::identity(),
            sample_directions: Arc::from(vec![Vector3::x(); 8]),
            min_range: 0.0,
            max_range: 10.0,
            requested_at: 0.0,
        };
        assert!(strategy.execute_scan(&params, None).is_empty());
        assert_eq!(strategy.scans_requested(), 1);
        assert!(!GpuComputeStrategy::is_available());
    }
}
