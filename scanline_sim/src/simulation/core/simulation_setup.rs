// scanline_sim/src/simulation/core/simulation_setup.rs

use std::time::Duration;

use crate::prelude::*;
use crate::simulation::core::events::LidarScanMessage;
use crate::simulation::core::prng::SimulationRng;

/// Rate of the `FixedUpdate` schedule in which agents move and sensors tick.
/// Must stay above `MAX_SCAN_RATE`.
pub const FIXED_UPDATE_RATE_HZ: f64 = 200.0;

/// Simulation time at which the run ends.
#[derive(Resource, Debug, Clone, Copy)]
pub struct RunDeadline(pub f64);

pub struct SimulationSetupPlugin;

impl Plugin for SimulationSetupPlugin {
    fn build(&self, app: &mut App) {
        let configured = app
            .world()
            .get_resource::<ScenarioConfig>()
            .map(|config| config.simulation.clone());
        let simulation = match configured {
            Some(simulation) => simulation,
            None => {
                warn!("No ScenarioConfig resource found; using default simulation settings.");
                app.init_resource::<ScenarioConfig>();
                Simulation::default()
            }
        };

        // --- 1. Add the Deterministic PRNG Resource ---
        app.insert_resource(SimulationRng::from_seed_or_entropy(simulation.seed));

        // --- 2. Events & Timestep ---
        app.add_event::<LidarScanMessage>().insert_resource(Time::<Fixed>::from_duration(
            Duration::from_secs_f64(1.0 / FIXED_UPDATE_RATE_HZ),
        ));

        // --- 3. Configure the spawning pipeline ---
        // This chain of SystemSets guarantees the correct spawning order.
        app.configure_sets(
            OnEnter(AppState::SceneBuilding),
            (
                SceneBuildSet::CreateRequests,
                SceneBuildSet::ProcessVehicle,
                SceneBuildSet::ProcessSensors,
                SceneBuildSet::Physics,
                SceneBuildSet::Cleanup,
            )
                .chain(),
        );

        app.add_systems(
            OnEnter(AppState::SceneBuilding),
            (
                spawn_agent_shells.in_set(SceneBuildSet::CreateRequests),
                cleanup_spawn_requests.in_set(SceneBuildSet::Cleanup),
                transition_to_running
                    .in_set(SceneBuildSet::Cleanup)
                    .after(cleanup_spawn_requests),
            ),
        );

        // --- 4. Configure the runtime schedule graph ---
        app.configure_sets(
            FixedUpdate,
            (
                SimulationSet::Motion,
                SimulationSet::Sensors,
                SimulationSet::Validation,
            )
                .chain(),
        );

        let duration = f64::from(simulation.duration_seconds);
        app.add_systems(
            OnEnter(AppState::Running),
            move |mut commands: Commands, time: Res<Time>| {
                let deadline = time.elapsed_secs_f64() + duration;
                info!("[RUN] Simulation running until t = {:.2}s", deadline);
                commands.insert_resource(RunDeadline(deadline));
            },
        )
        .add_systems(
            Update,
            exit_after_deadline.run_if(in_state(AppState::Running)),
        );
    }
}

fn spawn_agent_shells(mut commands: Commands, config: Res<ScenarioConfig>) {
    for agent_config in &config.agents {
        info!(
            "[SPAWN] Posting spawn request for agent: {}",
            &agent_config.name
        );

        commands.spawn((
            Name::new(agent_config.name.clone()),
            agent_config.starting_pose.to_bevy_transform(),
            // Sensor and vehicle passes read the config back from this component.
            SpawnAgentConfigRequest(agent_config.clone()),
        ));
    }
}

fn cleanup_spawn_requests(
    mut commands: Commands,
    query: Query<Entity, With<SpawnAgentConfigRequest>>,
) {
    info!("[CLEANUP] Removing spawn request components.");
    for entity in &query {
        commands.entity(entity).remove::<SpawnAgentConfigRequest>();
    }
}

/// Runs once at the end of the `OnEnter(SceneBuilding)` chain.
fn transition_to_running(mut next_state: ResMut<NextState<AppState>>) {
    info!("Scene building complete. Transitioning to Running state.");
    next_state.set(AppState::Running);
}

fn exit_after_deadline(
    time: Res<Time>,
    deadline: Option<Res<RunDeadline>>,
    mut exit: EventWriter<AppExit>,
) {
    let Some(deadline) = deadline else {
        return;
    };
    if time.elapsed_secs_f64() >= deadline.0 {
        info!("[RUN] Scenario duration elapsed. Exiting.");
        exit.write(AppExit::Success);
    }
}
