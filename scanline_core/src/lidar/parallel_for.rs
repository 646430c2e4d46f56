// scanline_core/src/lidar/parallel_for.rs

use crate::lidar::strategy::{ScanMode, ScanParameters, ScanStrategy};
use crate::messages::LidarPoint;
use crate::scene::TraceableScene;
use rayon::prelude::*;
use tracing::{trace, warn};

/// Casts every sample ray on the rayon pool and blocks until all have returned.
#[derive(Debug, Default)]
pub struct CpuParallelStrategy;

impl CpuParallelStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ScanStrategy for CpuParallelStrategy {
    fn mode(&self) -> ScanMode {
        ScanMode::ParallelFor
    }

    fn execute_scan(
        &mut self,
        params: &ScanParameters,
        scene: Option<&dyn TraceableScene>,
    ) -> Vec<LidarPoint> {
        let Some(scene) = scene else {
            warn!("No traceable scene available; skipping CPU scan");
            return Vec::new();
        };

        // Pre-sized so workers only ever write their own slot.
        let mut points = vec![LidarPoint::default(); params.num_samples()];
        points
            .par_iter_mut()
            .zip(params.sample_directions.par_iter())
            .for_each(|(slot, direction)| {
                if let Some(hit) = scene.cast_ray(&params.ray_query(direction)) {
                    *slot = LidarPoint::placeholder_hit(hit.impact_point.cast::<f32>());
                }
            });

        // Runs after the parallel join; keeps survivors in sample order.
        points.retain(|point| point.hit);
        trace!(hits = points.len(), samples = params.num_samples(), "CPU scan complete");
        points
    }
}
