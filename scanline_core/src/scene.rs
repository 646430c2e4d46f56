// scanline_core/src/scene.rs

//! The "cast ray and report nearest hit" capability consumed by the CPU scan path.

use nalgebra::{Point3, Unit, Vector3};
use std::sync::Arc;

/// A single nearest-hit query along the segment `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQuery {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
    /// Request the surface material of the hit, if the scene tracks one.
    pub want_material: bool,
}

impl RayQuery {
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self {
            start,
            end,
            want_material: true,
        }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Unit direction from `start` to `end`, or `None` for a degenerate segment.
    pub fn direction(&self) -> Option<Unit<Vector3<f64>>> {
        Unit::try_new(self.end - self.start, f64::EPSILON)
    }
}

/// Physical surface properties reported alongside a hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    pub id: u32,
    pub reflectivity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// World-space point where the ray met the surface.
    pub impact_point: Point3<f64>,
    pub normal: Vector3<f64>,
    /// Distance from the query's `start`.
    pub distance: f64,
    pub material: Option<SurfaceMaterial>,
}

/// The collision representation of the 3D environment.
///
/// Implementations must be callable from many worker threads at once.
pub trait TraceableScene: Send + Sync {
    /// Returns the hit closest to `query.start` within the segment, if any.
    fn cast_ray(&self, query: &RayQuery) -> Option<SurfaceHit>;
}

impl<T: TraceableScene + ?Sized> TraceableScene for Arc<T> {
    fn cast_ray(&self, query: &RayQuery) -> Option<SurfaceHit> {
        (**self).cast_ray(query)
    }
}

impl<T: TraceableScene + ?Sized> TraceableScene for &T {
    fn cast_ray(&self, query: &RayQuery) -> Option<SurfaceHit> {
        (**self).cast_ray(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn query_direction_and_length() {
        let query = RayQuery::new(Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 4.0));
        assert_relative_eq!(query.length(), 4.0);
        let dir = query.direction().unwrap();
        assert_relative_eq!(dir.into_inner(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn degenerate_query_has_no_direction() {
        let p = Point3::new(2.0, 3.0, 4.0);
        assert!(RayQuery::new(p, p).direction().is_none());
    }
}
