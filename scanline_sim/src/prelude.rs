// scanline_sim/src/prelude.rs

// Re-export the entire Bevy prelude for convenience.
pub use bevy::prelude::*;

// Pure scanning types. Listed explicitly: `Sphere` and `Plane` would clash
// with Bevy's math primitives.
pub use scanline_core::prelude::{
    FrameHandle, LidarPoint, LidarSensorController, LidarSettings, PointCloud, PointColor,
    PrimitiveScene, RayQuery, ScanMode, ScanningSensor, SensorContext, SurfaceHit,
    TraceableScene,
};

// Re-export common simulation-specific types for easy access in other plugins.
pub use crate::simulation::config::structs::{
    AgentConfig, LidarConfig, Pose, ScenarioConfig, SensorConfig, Simulation, WorldConfig,
};
pub use crate::simulation::core::app_state::{AppState, SceneBuildSet, SimulationSet};
pub use crate::simulation::core::events::LidarScanMessage;
pub use crate::simulation::core::spawn_requests::SpawnAgentConfigRequest;
pub use crate::simulation::plugins::sensors::lidar::LidarSensor;
