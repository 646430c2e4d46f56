// scanline_sim/src/simulation/plugins/sensors/lidar.rs

use std::sync::Arc;

use avian3d::prelude::*;
use scanline_core::lidar::strategy::ScanBackends;

use crate::prelude::*;
use crate::simulation::core::events::LidarScanMessage;
use crate::simulation::core::transforms::bevy_global_transform_to_enu_iso;
use crate::simulation::plugins::debugging::ShowDebugGizmos;
use crate::simulation::plugins::render_hooks::{FrameHooks, RenderDevices};
use crate::simulation::plugins::sensors::scene::{
    ray_tracing_scene, AgentBodyPose, AvianTraceableScene,
};
use crate::simulation::plugins::vehicles::kinematic::AgentBody;
use crate::simulation::plugins::world::spawner::WorldGeometry;

/// A LiDAR mounted on an agent. Always a child of the agent entity.
#[derive(Component, Debug)]
pub struct LidarSensor {
    pub controller: LidarSensorController,
}

pub struct LidarSensorPlugin;

impl Plugin for LidarSensorPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(AppState::SceneBuilding),
            spawn_lidar_sensors.in_set(SceneBuildSet::ProcessSensors),
        )
        .add_systems(
            FixedUpdate,
            (
                sync_ray_tracing_scenes
                    .in_set(SimulationSet::Sensors)
                    .before(lidar_sensor_system),
                lidar_sensor_system.in_set(SimulationSet::Sensors),
                log_lidar_scans.in_set(SimulationSet::Validation),
            )
                .run_if(in_state(AppState::Running)),
        );
    }
}

// =========================================================================
// == Spawning ==
// =========================================================================

fn spawn_lidar_sensors(
    mut commands: Commands,
    request_query: Query<(Entity, &SpawnAgentConfigRequest)>,
    geometry: Option<Res<WorldGeometry>>,
    hooks: Res<FrameHooks>,
    mut devices: ResMut<RenderDevices>,
) {
    for (agent_entity, request) in &request_query {
        let agent_config = &request.0;

        for sensor_config in &agent_config.sensors {
            let SensorConfig::Lidar(lidar_config) = sensor_config;
            let label = format!("{}/{}", agent_config.name, lidar_config.name);

            // Every LiDAR gets its own device so a later switch to ray tracing works.
            let backends = match &geometry {
                Some(geometry) => {
                    let scene: Arc<dyn TraceableScene> = geometry.0.clone();
                    devices.create_ray_tracing_backend(
                        label.clone(),
                        agent_entity,
                        scene,
                        &lidar_config.ray_tracing.unwrap_or_default(),
                        &hooks,
                    )
                }
                None => {
                    warn!("[SPAWN] No world geometry; '{}' is limited to CPU scanning.", label);
                    ScanBackends::cpu_only()
                }
            };

            let mut controller = LidarSensorController::new(lidar_config.settings.clone(), backends);
            let listener_label = label.clone();
            controller.add_enabled_listener(Box::new(move |enabled| {
                info!(
                    "[LIDAR] '{}' {}",
                    listener_label,
                    if enabled { "enabled" } else { "disabled" }
                );
            }));

            info!(
                "[SPAWN] LiDAR '{}': {}x{} samples, {} requested, {:.1} Hz",
                label,
                controller.horizontal_samples(),
                controller.vertical_samples(),
                lidar_config.settings.scan_mode,
                controller.settings().scan_frequency,
            );

            let mut sensor_entity_commands = commands.spawn((
                Name::new(label),
                LidarSensor { controller },
                lidar_config.transform.to_bevy_transform(),
            ));
            if lidar_config.debug_visuals {
                sensor_entity_commands.insert(ShowDebugGizmos);
            }
            let sensor_entity = sensor_entity_commands.id();

            commands.entity(agent_entity).add_child(sensor_entity);
        }
    }
}

// =========================================================================
// == Runtime Systems ==
// =========================================================================

/// Rebuilds each emulated device's scene from the static world and the
/// current agent poses, so ray-traced scans see moving agents.
fn sync_ray_tracing_scenes(
    geometry: Option<Res<WorldGeometry>>,
    devices: Res<RenderDevices>,
    agent_query: Query<(Entity, &AgentBody, &GlobalTransform)>,
) {
    let Some(geometry) = geometry else {
        return;
    };
    if devices.is_empty() {
        return;
    }
    let bodies: Vec<AgentBodyPose> = agent_query
        .iter()
        .map(|(agent, body, transform)| AgentBodyPose {
            agent,
            pose: bevy_global_transform_to_enu_iso(transform),
            half_extents: body.half_extents,
        })
        .collect();

    for entry in devices.iter() {
        let scene = ray_tracing_scene(&geometry.0, &bodies, entry.owner);
        entry.device.rebuild_acceleration_structure(Arc::new(scene));
    }
}

/// Ticks every LiDAR against the physics scene and publishes completed scans.
///
/// Controllers are activated on their first tick, so their duty cycle starts
/// on the fixed-timestep clock.
fn lidar_sensor_system(
    mut scan_writer: EventWriter<LidarScanMessage>,
    time: Res<Time>,
    spatial_query: SpatialQuery,
    parent_query: Query<(Entity, &Children)>,
    mut sensor_query: Query<(Entity, &mut LidarSensor, &GlobalTransform)>,
) {
    let now = time.elapsed_secs_f64();

    for (agent_entity, children) in &parent_query {
        for &child_entity in children {
            let Ok((sensor_entity, mut sensor, sensor_transform)) =
                sensor_query.get_mut(child_entity)
            else {
                continue;
            };

            if !sensor.controller.is_activated() {
                sensor.controller.activate(now);
            }

            // The sensor's own agent is excluded from its view.
            let scene = AvianTraceableScene::new(&spatial_query, [agent_entity]);
            let context = SensorContext {
                time: now,
                pose: bevy_global_transform_to_enu_iso(sensor_transform),
                scene: Some(&scene),
            };

            if sensor.controller.tick(&context) {
                scan_writer.write(LidarScanMessage {
                    agent_handle: FrameHandle::from_entity(agent_entity),
                    sensor_handle: FrameHandle::from_entity(sensor_entity),
                    timestamp: sensor.controller.scan_data_time().unwrap_or(now),
                    points: sensor.controller.scan_data().to_vec(),
                });
            }
        }
    }
}

fn log_lidar_scans(mut scan_reader: EventReader<LidarScanMessage>, names: Query<&Name>) {
    for scan in scan_reader.read() {
        let sensor_name = names
            .get(scan.sensor_handle.to_entity())
            .map(|name| name.as_str())
            .unwrap_or("<unknown>");
        debug!(
            "[LIDAR] t={:.3}s '{}' published {} points",
            scan.timestamp,
            sensor_name,
            scan.points.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::RunSystemOnce;
    use nalgebra::{Isometry3, Point3, Vector3};
    use scanline_core::geometry::Plane;
    use scanline_core::lidar::sampling::AxisSamplingSpec;

    use crate::simulation::config::structs::RayTracingConfig;
    use crate::simulation::core::transforms::enu_iso_to_bevy_transform;

    fn agent_at(app: &mut App, x: f64) -> Entity {
        let pose = Isometry3::translation(x, 0.0, 0.0);
        app.world_mut()
            .spawn((
                AgentBody {
                    half_extents: Vector3::new(2.0, 1.0, 0.75),
                },
                GlobalTransform::from(enu_iso_to_bevy_transform(&pose)),
            ))
            .id()
    }

    #[test]
    fn ray_traced_scans_see_other_agents() {
        let mut app = App::new();
        let wall = PrimitiveScene::new().with(
            Plane::new(Point3::new(40.0, 0.0, 0.0), -Vector3::x_axis()),
            None,
        );
        let world = WorldGeometry(Arc::new(wall));
        let hooks = FrameHooks::default();
        let scout = agent_at(&mut app, 0.0);
        agent_at(&mut app, 15.0);

        let mut devices = RenderDevices::default();
        let backends = devices.create_ray_tracing_backend(
            "scout/roof",
            scout,
            world.0.clone(),
            &RayTracingConfig {
                readback_latency: 0,
                supported: true,
            },
            &hooks,
        );
        app.insert_resource(world).insert_resource(devices);
        app.world_mut()
            .run_system_once(sync_ray_tracing_scenes)
            .expect("scene sync runs");

        let settings = LidarSettings {
            horizontal: AxisSamplingSpec::from_sample_count(0.0, 1),
            vertical: AxisSamplingSpec::from_sample_count(0.0, 1),
            min_range: 0.1,
            max_range: 100.0,
            scan_mode: ScanMode::RayTracing,
            ..LidarSettings::default()
        };
        let mut controller = LidarSensorController::new(settings, backends);
        controller.activate(0.0);
        assert_eq!(controller.scan_mode(), ScanMode::RayTracing);

        let context = |time| SensorContext {
            time,
            pose: Isometry3::identity(),
            scene: None,
        };
        assert!(controller.tick(&context(1.0)));
        hooks.0.run_frame(0.016);
        hooks.0.run_frame(0.016);
        assert!(controller.tick(&context(2.0)));

        let points = controller.scan_data();
        assert_eq!(points.len(), 1);
        // Front face of the second agent, not the wall behind it.
        assert!((points[0].position.x - 13.0).abs() < 1e-3);
        assert_eq!(controller.scan_data_time(), Some(1.0));
    }
}
