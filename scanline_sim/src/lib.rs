// scanline_sim/src/lib.rs

use bevy::prelude::*;

// Import the plugins defined within the simulation crate.
use crate::simulation::core::simulation_setup::SimulationSetupPlugin;
use crate::simulation::plugins::debugging::DebuggingPlugin;
use crate::simulation::plugins::render_hooks::RenderHooksPlugin;
use crate::simulation::plugins::sensors::lidar::LidarSensorPlugin;
use crate::simulation::plugins::vehicles::kinematic::VehicleMotionPlugin;
use crate::simulation::plugins::world::spawner::WorldSpawnerPlugin;

// This prelude is for convenience for other files WITHIN the scanline_sim crate.
pub mod prelude;

// This module contains all the simulation-specific logic.
pub mod cli;
pub mod simulation;

/// The main plugin that brings together all the simulation parts.
///
/// Expects a `ScenarioConfig` resource, avian's `PhysicsPlugins` and the
/// `AppState` state to be set up by the application.
pub struct ScanlineSimulationPlugin {
    /// Skip everything that needs a window: lights, camera, meshes, gizmos and hotkeys.
    pub headless: bool,
}

impl Plugin for ScanlineSimulationPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            // Core setup (states, sets, events, RNG, fixed timestep, agent shells).
            SimulationSetupPlugin,
            // Spawns the ground, obstacles and their traceable mirror.
            WorldSpawnerPlugin {
                visuals: !self.headless,
            },
            // Moves agents at their configured velocity.
            VehicleMotionPlugin,
            // Drives per-frame GPU pipeline hooks and owns the emulated devices.
            RenderHooksPlugin,
            LidarSensorPlugin,
            DebuggingPlugin {
                interactive: !self.headless,
            },
        ));
    }
}
