// scanline_sim/src/simulation/plugins/vehicles/kinematic.rs

//! Agents that glide at a constant world-frame velocity.
//!
//! Bodies are avian kinematic rigid bodies: they carry a collider so other
//! sensors can see them, and are moved by their `LinearVelocity` alone.

use avian3d::prelude::*;
use nalgebra::Vector3;

use crate::prelude::*;
use crate::simulation::core::transforms::enu_vector_to_bevy_vector;

/// Commanded velocity in the ENU world frame, in m/s.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ConstantVelocity(pub Vector3<f64>);

/// Half extents of the agent's box body, in its ENU body frame.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct AgentBody {
    pub half_extents: Vector3<f64>,
}

pub struct VehicleMotionPlugin;

impl Plugin for VehicleMotionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(AppState::SceneBuilding),
            (
                process_kinematic_logic.in_set(SceneBuildSet::ProcessVehicle),
                attach_kinematic_physics.in_set(SceneBuildSet::Physics),
            ),
        )
        .add_systems(
            FixedUpdate,
            apply_constant_velocity
                .in_set(SimulationSet::Motion)
                .run_if(in_state(AppState::Running)),
        );
    }
}

/// Adds the logical motion components from each agent's request.
fn process_kinematic_logic(
    mut commands: Commands,
    request_query: Query<(Entity, &SpawnAgentConfigRequest)>,
) {
    for (entity, request) in &request_query {
        let agent_config = &request.0;
        commands.entity(entity).insert((
            ConstantVelocity(agent_config.velocity),
            AgentBody {
                half_extents: agent_config.body_half_extents,
            },
        ));
        debug!(
            "[SPAWN] Agent '{}' moves at {:?} m/s",
            agent_config.name,
            agent_config.velocity.as_slice()
        );
    }
}

/// Adds the kinematic body and collider once the logic is attached.
fn attach_kinematic_physics(
    mut commands: Commands,
    body_query: Query<(Entity, &AgentBody, &ConstantVelocity), With<SpawnAgentConfigRequest>>,
) {
    for (entity, body, velocity) in &body_query {
        let size = enu_vector_to_bevy_vector(&(body.half_extents * 2.0)).abs();
        commands.entity(entity).insert((
            RigidBody::Kinematic,
            Collider::cuboid(size.x, size.y, size.z),
            LinearVelocity(enu_vector_to_bevy_vector(&velocity.0)),
        ));
    }
}

/// Keeps each body's physics velocity in step with its commanded velocity.
fn apply_constant_velocity(mut query: Query<(&ConstantVelocity, &mut LinearVelocity)>) {
    for (commanded, mut linear_velocity) in &mut query {
        let target = enu_vector_to_bevy_vector(&commanded.0);
        if linear_velocity.0 != target {
            linear_velocity.0 = target;
        }
    }
}
