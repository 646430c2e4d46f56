// scanline_sim/src/simulation/plugins/sensors/scene.rs

//! Exposes avian's spatial query pipeline as a [`TraceableScene`], and builds
//! the world copy traced by emulated ray-tracing devices.

use std::sync::Arc;

use avian3d::prelude::{SpatialQuery, SpatialQueryFilter};
use bevy::prelude::{Dir3, Entity, Vec3};
use nalgebra::{Isometry3, Unit, Vector3};
use scanline_core::geometry::{LayeredScene, OrientedBox};
use scanline_core::prelude::{PrimitiveScene, RayQuery, SurfaceHit, TraceableScene};

use crate::simulation::core::transforms::{
    bevy_vector_to_enu_vector, enu_point_to_bevy_point, enu_vector_to_bevy_vector,
};

/// A physics-backed scene for one scanning agent.
///
/// Queries arrive in the ENU frame and are answered in it; the agent's own
/// colliders are excluded so a sensor never sees the body it is mounted on.
pub struct AvianTraceableScene<'a, 'w, 's> {
    spatial_query: &'a SpatialQuery<'w, 's>,
    filter: SpatialQueryFilter,
}

impl<'a, 'w, 's> AvianTraceableScene<'a, 'w, 's> {
    pub fn new(
        spatial_query: &'a SpatialQuery<'w, 's>,
        excluded: impl IntoIterator<Item = Entity>,
    ) -> Self {
        Self {
            spatial_query,
            filter: SpatialQueryFilter::from_excluded_entities(excluded),
        }
    }
}

impl TraceableScene for AvianTraceableScene<'_, '_, '_> {
    fn cast_ray(&self, query: &RayQuery) -> Option<SurfaceHit> {
        let ray = BevyRay::from_query(query)?;
        let hit = self.spatial_query.cast_ray(
            ray.origin,
            ray.direction,
            ray.max_distance,
            true,
            &self.filter,
        )?;
        Some(ray.to_surface_hit(query, hit.distance, hit.normal))
    }
}

/// An agent's box body posed in the ENU world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentBodyPose {
    pub agent: Entity,
    pub pose: Isometry3<f64>,
    pub half_extents: Vector3<f64>,
}

/// The static world plus every agent body except `owner`'s.
///
/// Mirrors what [`AvianTraceableScene`] reports for the same sensor, minus
/// surface materials on agent bodies.
pub fn ray_tracing_scene(
    world: &Arc<PrimitiveScene>,
    bodies: &[AgentBodyPose],
    owner: Entity,
) -> LayeredScene {
    let mut agents = PrimitiveScene::new();
    for body in bodies.iter().filter(|body| body.agent != owner) {
        agents.add(OrientedBox::new(body.pose, body.half_extents), None);
    }
    let world: Arc<dyn TraceableScene> = world.clone();
    LayeredScene::new()
        .with_layer(world)
        .with_layer(Arc::new(agents))
}

/// An ENU ray query restated in Bevy's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BevyRay {
    pub origin: Vec3,
    pub direction: Dir3,
    pub max_distance: f32,
    enu_direction: Unit<Vector3<f64>>,
}

impl BevyRay {
    /// `None` for a zero-length query.
    pub fn from_query(query: &RayQuery) -> Option<Self> {
        let enu_direction = query.direction()?;
        let direction = Dir3::new(enu_vector_to_bevy_vector(&enu_direction)).ok()?;
        Some(Self {
            origin: enu_point_to_bevy_point(&query.start),
            direction,
            max_distance: query.length() as f32,
            enu_direction,
        })
    }

    /// Builds the ENU hit for a Bevy-frame hit `distance` along this ray.
    pub fn to_surface_hit(&self, query: &RayQuery, distance: f32, normal: Vec3) -> SurfaceHit {
        let distance = f64::from(distance);
        SurfaceHit {
            impact_point: query.start + self.enu_direction.into_inner() * distance,
            normal: bevy_vector_to_enu_vector(&normal),
            distance,
            // Colliders carry no surface material.
            material: None,
        }
    }
}
