// scanline_sim/src/simulation/plugins/world/spawner.rs

use std::sync::Arc;

use avian3d::prelude::*;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use scanline_core::geometry::{Aabb, PrimitiveScene};

use crate::prelude::*;
use crate::simulation::config::structs::{ObstacleConfig, WorldConfig};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::transforms::enu_point_to_bevy_point;

/// Thickness of the ground plate. Its top face is the ENU plane `z = 0`.
const GROUND_THICKNESS: f64 = 0.2;

/// The static world as a `TraceableScene`, mirroring the avian colliders.
///
/// Used by backends that cannot borrow the physics world, such as the
/// emulated ray-tracing device.
#[derive(Resource, Clone)]
pub struct WorldGeometry(pub Arc<PrimitiveScene>);

/// Marks the entities spawned from `[world]`.
#[derive(Component)]
pub struct StaticWorldBody;

/// Spawns the ground plate and box obstacles. Lights and a camera are added
/// only when `visuals` is set.
pub struct WorldSpawnerPlugin {
    pub visuals: bool,
}

impl Plugin for WorldSpawnerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(AppState::SceneBuilding),
            spawn_world.in_set(SceneBuildSet::CreateRequests),
        );
        if self.visuals {
            app.add_systems(OnEnter(AppState::SceneBuilding), spawn_lighting_and_camera);
        }
    }
}

// =========================================================================
// == Pure helpers ==
// =========================================================================

/// Draws `world.obstacle_count` boxes resting on the ground within the spread.
pub fn scatter_obstacles(world: &WorldConfig, rng: &mut impl Rng) -> Vec<ObstacleConfig> {
    let spread = f64::from(world.obstacle_spread);
    (0..world.obstacle_count)
        .map(|index| {
            let half_extents = Vector3::new(
                rng.gen_range(0.5..3.0),
                rng.gen_range(0.5..3.0),
                rng.gen_range(0.5..4.0),
            );
            let center = Vector3::new(
                rng.gen_range(-spread..=spread),
                rng.gen_range(-spread..=spread),
                half_extents.z,
            );
            ObstacleConfig {
                name: Some(format!("Obstacle {index}")),
                center,
                half_extents,
                material: None,
            }
        })
        .collect()
}

/// The Bevy transform and full edge lengths of an axis-aligned ENU box.
pub fn enu_box_to_bevy(center: &Vector3<f64>, half_extents: &Vector3<f64>) -> (Transform, Vec3) {
    let translation = enu_point_to_bevy_point(&Point3::from(*center));
    // East, Up, North edge lengths on Bevy X, Y, Z.
    let size = Vec3::new(
        (2.0 * half_extents.x) as f32,
        (2.0 * half_extents.z) as f32,
        (2.0 * half_extents.y) as f32,
    );
    (Transform::from_translation(translation), size)
}

fn ground_box(world: &WorldConfig) -> (Vector3<f64>, Vector3<f64>) {
    let half = f64::from(world.ground_size) / 2.0;
    (
        Vector3::new(0.0, 0.0, -GROUND_THICKNESS / 2.0),
        Vector3::new(half, half, GROUND_THICKNESS / 2.0),
    )
}

// =========================================================================
// == Systems ==
// =========================================================================

fn spawn_world(
    mut commands: Commands,
    config: Res<ScenarioConfig>,
    mut rng: ResMut<SimulationRng>,
    meshes: Option<ResMut<Assets<Mesh>>>,
    materials: Option<ResMut<Assets<StandardMaterial>>>,
) {
    let world = &config.world;
    let mut obstacles = world.obstacles.clone();
    obstacles.extend(scatter_obstacles(world, &mut rng.0));

    let mut geometry = PrimitiveScene::new();
    let mut visuals = meshes.zip(materials);

    // --- Ground ---
    let (ground_center, ground_half) = ground_box(world);
    geometry.add(
        Aabb::from_center_half_extents(Point3::from(ground_center), ground_half),
        None,
    );
    let (transform, size) = enu_box_to_bevy(&ground_center, &ground_half);
    let mut ground = commands.spawn((
        Name::new("Ground"),
        StaticWorldBody,
        RigidBody::Static,
        Collider::cuboid(size.x, size.y, size.z),
        transform,
    ));
    if let Some((meshes, materials)) = visuals.as_mut() {
        ground.insert((
            Mesh3d(meshes.add(Cuboid::new(size.x, size.y, size.z))),
            MeshMaterial3d(materials.add(Color::srgb(0.35, 0.4, 0.35))),
        ));
    }

    // --- Obstacles ---
    for (index, obstacle) in obstacles.iter().enumerate() {
        geometry.add(
            Aabb::from_center_half_extents(Point3::from(obstacle.center), obstacle.half_extents),
            obstacle.material.map(Into::into),
        );

        let (transform, size) = enu_box_to_bevy(&obstacle.center, &obstacle.half_extents);
        let name = obstacle
            .name
            .clone()
            .unwrap_or_else(|| format!("Obstacle {index}"));
        let mut entity = commands.spawn((
            Name::new(name),
            StaticWorldBody,
            RigidBody::Static,
            Collider::cuboid(size.x, size.y, size.z),
            transform,
        ));
        if let Some((meshes, materials)) = visuals.as_mut() {
            entity.insert((
                Mesh3d(meshes.add(Cuboid::new(size.x, size.y, size.z))),
                MeshMaterial3d(materials.add(Color::srgb(0.6, 0.55, 0.5))),
            ));
        }
    }

    info!(
        "[SPAWN] World built: ground {:.0} m, {} obstacles ({} random).",
        world.ground_size,
        obstacles.len(),
        world.obstacle_count
    );
    commands.insert_resource(WorldGeometry(Arc::new(geometry)));
}

/// Spawns lights and a static camera overlooking the origin.
fn spawn_lighting_and_camera(mut commands: Commands) {
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 15_000.0,
            ..default()
        },
        Transform::from_xyz(0.0, 50.0, 0.0).looking_at(Vec3::new(10.0, 0.0, 5.0), Vec3::Y),
    ));

    let camera_transform = Transform::from_xyz(-30.0, 25.0, 30.0).looking_at(Vec3::ZERO, Vec3::Y);
    commands.spawn((Camera3d::default(), camera_transform));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world_with(count: usize, spread: f32) -> WorldConfig {
        WorldConfig {
            obstacle_count: count,
            obstacle_spread: spread,
            ..WorldConfig::default()
        }
    }

    #[test]
    fn scattered_obstacles_are_deterministic_and_rest_on_the_ground() {
        let world = world_with(16, 20.0);
        let first = scatter_obstacles(&world, &mut ChaCha8Rng::seed_from_u64(3));
        let second = scatter_obstacles(&world, &mut ChaCha8Rng::seed_from_u64(3));

        assert_eq!(first.len(), 16);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.center, b.center);
            assert_eq!(a.half_extents, b.half_extents);
        }
        for obstacle in &first {
            assert!(obstacle.center.x.abs() <= 20.0 && obstacle.center.y.abs() <= 20.0);
            assert_relative_eq!(obstacle.center.z - obstacle.half_extents.z, 0.0);
        }
    }

    #[test]
    fn zero_spread_stacks_obstacles_at_the_origin() {
        let obstacles = scatter_obstacles(&world_with(2, 0.0), &mut ChaCha8Rng::seed_from_u64(1));
        assert!(obstacles.iter().all(|o| o.center.x == 0.0 && o.center.y == 0.0));
    }

    #[test]
    fn enu_box_swaps_north_and_up_extents() {
        let (transform, size) =
            enu_box_to_bevy(&Vector3::new(10.0, 4.0, 1.0), &Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.translation, Vec3::new(10.0, 1.0, -4.0));
        assert_eq!(size, Vec3::new(2.0, 6.0, 4.0));
    }

    #[test]
    fn ground_top_face_is_at_zero() {
        let (center, half) = ground_box(&WorldConfig::default());
        assert_relative_eq!(center.z + half.z, 0.0);
        assert_relative_eq!(half.x, 100.0);
    }
}
