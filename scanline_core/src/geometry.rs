// scanline_core/src/geometry.rs

//! Analytic primitives implementing [`TraceableScene`].
//!
//! These back the software ray-tracing device and the tests; the simulation
//! crate mirrors its static world into a [`PrimitiveScene`].

use crate::scene::{RayQuery, SurfaceHit, SurfaceMaterial, TraceableScene};
use nalgebra::{Isometry3, Point3, Unit, Vector3};
use std::sync::Arc;

const PARALLEL_EPSILON: f64 = 1e-12;

/// A shape that can report where a ray enters it.
pub trait Primitive: Send + Sync {
    /// Distance along `direction` from `origin` to the first intersection in
    /// `[0, max_distance]`, together with the outward surface normal.
    fn intersect(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
    ) -> Option<(f64, Vector3<f64>)>;
}

// --- Plane ---

/// An infinite plane `normal · p = offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Unit<Vector3<f64>>,
    pub offset: f64,
}

impl Plane {
    pub fn new(point: Point3<f64>, normal: Unit<Vector3<f64>>) -> Self {
        Self {
            offset: normal.dot(&point.coords),
            normal,
        }
    }
}

impl Primitive for Plane {
    fn intersect(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
    ) -> Option<(f64, Vector3<f64>)> {
        let denom = self.normal.dot(direction);
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }
        let t = (self.offset - self.normal.dot(&origin.coords)) / denom;
        if !(0.0..=max_distance).contains(&t) {
            return None;
        }
        // Report the face the ray actually struck.
        let normal = if denom < 0.0 {
            self.normal.into_inner()
        } else {
            -self.normal.into_inner()
        };
        Some((t, normal))
    }
}

// --- Sphere ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Primitive for Sphere {
    fn intersect(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
    ) -> Option<(f64, Vector3<f64>)> {
        let oc = origin - self.center;
        let b = oc.dot(direction);
        let c = oc.norm_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        // Nearest root in front of the origin; an origin inside the sphere hits the far wall.
        let t = [-b - sqrt_d, -b + sqrt_d]
            .into_iter()
            .find(|t| (0.0..=max_distance).contains(t))?;
        let normal = (origin + direction.into_inner() * t - self.center) / self.radius;
        Some((t, normal))
    }
}

// --- Axis-aligned box ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_center_half_extents(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }
}

impl Primitive for Aabb {
    fn intersect(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
    ) -> Option<(f64, Vector3<f64>)> {
        // Slab method.
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        let mut enter_axis = 0;
        let mut exit_axis = 0;

        for axis in 0..3 {
            let d = direction[axis];
            let o = origin[axis];
            if d.abs() < PARALLEL_EPSILON {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (t0, t1) = {
                let a = (self.min[axis] - o) * inv;
                let b = (self.max[axis] - o) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            if t0 > t_enter {
                t_enter = t0;
                enter_axis = axis;
            }
            if t1 < t_exit {
                t_exit = t1;
                exit_axis = axis;
            }
            if t_enter > t_exit {
                return None;
            }
        }

        let (t, axis, sign) = if t_enter >= 0.0 {
            (t_enter, enter_axis, -direction[enter_axis].signum())
        } else {
            // Origin inside the box: the ray leaves through the exit face.
            (t_exit, exit_axis, direction[exit_axis].signum())
        };
        if !(0.0..=max_distance).contains(&t) {
            return None;
        }
        let mut normal = Vector3::zeros();
        normal[axis] = sign;
        Some((t, normal))
    }
}

// --- Oriented box ---

/// A box with arbitrary pose. `half_extents` are along the box's own axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub pose: Isometry3<f64>,
    pub half_extents: Vector3<f64>,
}

impl OrientedBox {
    pub fn new(pose: Isometry3<f64>, half_extents: Vector3<f64>) -> Self {
        Self { pose, half_extents }
    }
}

impl Primitive for OrientedBox {
    fn intersect(
        &self,
        origin: &Point3<f64>,
        direction: &Unit<Vector3<f64>>,
        max_distance: f64,
    ) -> Option<(f64, Vector3<f64>)> {
        let local_origin = self.pose.inverse_transform_point(origin);
        let local_direction = Unit::new_unchecked(self.pose.inverse_transform_vector(direction));
        let local_box = Aabb::from_center_half_extents(Point3::origin(), self.half_extents);
        local_box
            .intersect(&local_origin, &local_direction, max_distance)
            .map(|(t, normal)| (t, self.pose.rotation * normal))
    }
}

// --- Scene ---

struct SceneEntry {
    shape: Box<dyn Primitive>,
    material: Option<SurfaceMaterial>,
}

/// A flat list of primitives answering nearest-hit queries by brute force.
#[derive(Default)]
pub struct PrimitiveScene {
    entries: Vec<SceneEntry>,
}

impl std::fmt::Debug for PrimitiveScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveScene")
            .field("primitives", &self.entries.len())
            .finish()
    }
}

impl PrimitiveScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, shape: impl Primitive + 'static, material: Option<SurfaceMaterial>) {
        self.entries.push(SceneEntry {
            shape: Box::new(shape),
            material,
        });
    }

    /// Builder-style variant of [`PrimitiveScene::add`].
    pub fn with(mut self, shape: impl Primitive + 'static, material: Option<SurfaceMaterial>) -> Self {
        self.add(shape, material);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TraceableScene for PrimitiveScene {
    fn cast_ray(&self, query: &RayQuery) -> Option<SurfaceHit> {
        let direction = query.direction()?;
        let max_distance = query.length();

        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .shape
                    .intersect(&query.start, &direction, max_distance)
                    .map(|(t, normal)| (t, normal, entry.material))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(t, normal, material)| SurfaceHit {
                impact_point: query.start + direction.into_inner() * t,
                normal,
                distance: t,
                material: if query.want_material { material } else { None },
            })
    }
}

/// Several scenes answered as one: the nearest hit across all layers wins.
#[derive(Clone, Default)]
pub struct LayeredScene {
    layers: Vec<Arc<dyn TraceableScene>>,
}

impl std::fmt::Debug for LayeredScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredScene")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl LayeredScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: Arc<dyn TraceableScene>) -> Self {
        self.layers.push(layer);
        self
    }
}

impl TraceableScene for LayeredScene {
    fn cast_ray(&self, query: &RayQuery) -> Option<SurfaceHit> {
        self.layers
            .iter()
            .filter_map(|layer| layer.cast_ray(query))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn forward_query(length: f64) -> RayQuery {
        RayQuery::new(Point3::origin(), Point3::new(length, 0.0, 0.0))
    }

    #[test]
    fn plane_ahead_is_hit_at_expected_distance() {
        let scene = PrimitiveScene::new().with(
            Plane::new(Point3::new(10.0, 0.0, 0.0), -Vector3::x_axis()),
            None,
        );
        let hit = scene.cast_ray(&forward_query(100.0)).unwrap();
        assert_relative_eq!(hit.distance, 10.0, epsilon = 1e-9);
        assert_relative_eq!(hit.impact_point, Point3::new(10.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(hit.normal, -Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn plane_beyond_segment_is_missed() {
        let scene = PrimitiveScene::new().with(
            Plane::new(Point3::new(10.0, 0.0, 0.0), Vector3::x_axis()),
            None,
        );
        assert!(scene.cast_ray(&forward_query(9.5)).is_none());
    }

    #[test]
    fn sphere_reports_near_surface() {
        let sphere = Sphere {
            center: Point3::new(5.0, 0.0, 0.0),
            radius: 1.0,
        };
        let (t, normal) = sphere
            .intersect(&Point3::origin(), &Vector3::x_axis(), 100.0)
            .unwrap();
        assert_relative_eq!(t, 4.0, epsilon = 1e-12);
        assert_relative_eq!(normal, -Vector3::x(), epsilon = 1e-12);

        // From inside, the far wall is the first surface.
        let (t, _) = sphere
            .intersect(&Point3::new(5.0, 0.0, 0.0), &Vector3::x_axis(), 100.0)
            .unwrap();
        assert_relative_eq!(t, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn aabb_slab_intersection() {
        let cube = Aabb::from_center_half_extents(Point3::new(0.0, 0.0, 3.0), Vector3::repeat(1.0));
        let (t, normal) = cube
            .intersect(&Point3::origin(), &Vector3::z_axis(), 10.0)
            .unwrap();
        assert_relative_eq!(t, 2.0, epsilon = 1e-12);
        assert_relative_eq!(normal, -Vector3::z(), epsilon = 1e-12);

        assert!(cube
            .intersect(&Point3::new(5.0, 0.0, 0.0), &Vector3::z_axis(), 10.0)
            .is_none());
        assert!(cube.contains(&Point3::new(0.5, -0.5, 3.5)));
    }

    #[test]
    fn oriented_box_is_hit_on_its_rotated_face() {
        // 4 x 1 m footprint turned a quarter turn: its long side now spans north.
        let pose = Isometry3::new(
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::z() * std::f64::consts::FRAC_PI_2,
        );
        let body = OrientedBox::new(pose, Vector3::new(2.0, 0.5, 1.0));

        let (t, normal) = body
            .intersect(&Point3::origin(), &Vector3::x_axis(), 50.0)
            .unwrap();
        assert_relative_eq!(t, 9.5, epsilon = 1e-9);
        assert_relative_eq!(normal, -Vector3::x(), epsilon = 1e-9);

        // An unrotated box would be missed 1.5 m south; this one is not.
        let south = Point3::new(0.0, -1.5, 0.0);
        assert!(body.intersect(&south, &Vector3::x_axis(), 50.0).is_some());
        let beside = Point3::new(0.0, -2.5, 0.0);
        assert!(body.intersect(&beside, &Vector3::x_axis(), 50.0).is_none());
    }

    #[test]
    fn layered_scene_returns_the_nearest_layer_hit() {
        let far: Arc<dyn TraceableScene> = Arc::new(PrimitiveScene::new().with(
            Plane::new(Point3::new(30.0, 0.0, 0.0), -Vector3::x_axis()),
            None,
        ));
        let near: Arc<dyn TraceableScene> = Arc::new(PrimitiveScene::new().with(
            Aabb::from_center_half_extents(Point3::new(12.0, 0.0, 0.0), Vector3::repeat(1.0)),
            None,
        ));

        let only_far = LayeredScene::new().with_layer(Arc::clone(&far));
        assert_relative_eq!(only_far.cast_ray(&forward_query(50.0)).unwrap().distance, 30.0, epsilon = 1e-9);

        let both = LayeredScene::new().with_layer(far).with_layer(near);
        assert_relative_eq!(both.cast_ray(&forward_query(50.0)).unwrap().distance, 11.0, epsilon = 1e-9);
        assert!(LayeredScene::new().cast_ray(&forward_query(50.0)).is_none());
    }

    #[test]
    fn nearest_primitive_wins_and_material_is_optional() {
        let near = SurfaceMaterial {
            id: 7,
            reflectivity: 0.3,
        };
        let scene = PrimitiveScene::new()
            .with(
                Aabb::from_center_half_extents(Point3::new(20.0, 0.0, 0.0), Vector3::repeat(1.0)),
                None,
            )
            .with(
                Sphere {
                    center: Point3::new(8.0, 0.0, 0.0),
                    radius: 1.0,
                },
                Some(near),
            );
        assert_eq!(scene.len(), 2);

        let hit = scene.cast_ray(&forward_query(50.0)).unwrap();
        assert_relative_eq!(hit.distance, 7.0, epsilon = 1e-9);
        assert_eq!(hit.material, Some(near));

        let mut query = forward_query(50.0);
        query.want_material = false;
        assert_eq!(scene.cast_ray(&query).unwrap().material, None);
    }
}
