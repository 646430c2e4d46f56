// scanline_sim/src/simulation/core/app_state.rs

use bevy::{ecs::schedule::SystemSet, prelude::States};

/// Defines the major phases of the application's lifecycle.
#[derive(States, Debug, Clone, Eq, PartialEq, Hash, Default)]
pub enum AppState {
    /// The app starts here: the scenario is already loaded, and the scene is
    /// built from it by the `OnEnter` chain below.
    #[default]
    SceneBuilding,

    /// The scene is built. The main simulation loop is now running.
    Running,
}

/// System sets to control the order of execution during the SceneBuilding state.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SceneBuildSet {
    /// Pass 1: Create agent shells and the static world.
    CreateRequests,

    /// Pass 2: Attach vehicle motion to each agent.
    ProcessVehicle,

    /// Pass 3: Process all sensor requests and create sensor child entities.
    ProcessSensors,

    /// Pass 4: Attach all physical bodies (RigidBody, Collider).
    Physics,

    /// Pass 5: Remove all temporary request components.
    Cleanup,
}

// =========================================================================
// == Main Simulation Sets ==
// =========================================================================

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Systems that move agents before anything observes them.
    Motion,
    /// Systems that simulate sensors against the current scene.
    Sensors,
    /// Systems that consume sensor output (logging, recording).
    Validation,
}
