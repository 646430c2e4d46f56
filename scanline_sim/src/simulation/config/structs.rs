// scanline_sim/src/simulation/config/structs.rs

use bevy::prelude::{Resource, Transform};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use scanline_core::prelude::{LidarSettings, SurfaceMaterial};
use serde::{Deserialize, Serialize};

use crate::simulation::core::transforms::enu_iso_to_bevy_transform;
use crate::simulation::utils::serde_helpers;

// =========================================================================
// == Top-Level Configuration Resource ==
// =========================================================================

/// # ScenarioConfig
/// The root of a `scenario.toml` file, inserted as a Bevy resource.
///
/// All poses, positions and velocities are expressed in the ENU world frame
/// (X = East, Y = North, Z = Up).
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)] // Use default if the [simulation] section is missing
    pub simulation: Simulation,

    #[serde(default)]
    pub world: WorldConfig,

    // The TOML has `[[agents]]`, which becomes a Vec of AgentConfig structs.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Length of the run in simulated seconds. The app exits once it elapses.
    pub duration_seconds: f32,
    /// Frames per second. Paces the headless loop and the render-frame hooks.
    pub render_frame_rate: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            duration_seconds: 60.0,
            render_frame_rate: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorldConfig {
    /// Edge length of the square ground plate, in meters.
    pub ground_size: f32,
    /// Number of randomly scattered box obstacles (seeded by `simulation.seed`).
    pub obstacle_count: usize,
    /// Random obstacles are placed within `[-spread, spread]` on both ground axes.
    pub obstacle_spread: f32,
    /// Hand-placed obstacles, spawned in addition to the random ones.
    pub obstacles: Vec<ObstacleConfig>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            ground_size: 200.0,
            obstacle_count: 0,
            obstacle_spread: 50.0,
            obstacles: Vec::new(),
        }
    }
}

/// An axis-aligned box resting in the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObstacleConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub center: Vector3<f64>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub half_extents: Vector3<f64>,
    #[serde(default)]
    pub material: Option<MaterialConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialConfig {
    pub id: u32,
    pub reflectivity: f32,
}

impl From<MaterialConfig> for SurfaceMaterial {
    fn from(config: MaterialConfig) -> Self {
        SurfaceMaterial {
            id: config.id,
            reflectivity: config.reflectivity,
        }
    }
}

fn default_body_half_extents() -> Vector3<f64> {
    Vector3::new(2.0, 1.0, 0.75)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub starting_pose: Pose,
    /// Constant world-frame velocity in m/s.
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub velocity: Vector3<f64>,
    /// Half extents of the agent's box collider, in its body frame.
    #[serde(
        with = "serde_helpers::vec3_from_array",
        default = "default_body_half_extents"
    )]
    pub body_half_extents: Vector3<f64>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pose {
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub translation: Vector3<f64>,
    /// `[roll, pitch, yaw]` in degrees.
    #[serde(with = "serde_helpers::quat_from_euler_deg", default)]
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    pub fn to_bevy_transform(&self) -> Transform {
        enu_iso_to_bevy_transform(&self.to_isometry())
    }
}

// =========================================================================
// == Sensors ==
// =========================================================================

// This enum can represent ANY sensor that might appear in the config list.
// The `kind` field decides which variant to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SensorConfig {
    Lidar(LidarConfig),
}

// `flatten` cannot be combined with `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LidarConfig {
    pub name: String,
    /// Mounting pose relative to the agent body.
    #[serde(default)]
    pub transform: Pose,
    #[serde(default)]
    pub debug_visuals: bool,
    #[serde(default)]
    pub ray_tracing: Option<RayTracingConfig>,
    #[serde(flatten)]
    pub settings: LidarSettings,
}

/// Tunes the emulated ray-tracing device a LiDAR gets when it scans in
/// `RayTracing` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RayTracingConfig {
    /// Render frames between a readback request and its data becoming readable.
    pub readback_latency: u32,
    /// Set to `false` to emulate hardware without ray-tracing support.
    pub supported: bool,
}

impl Default for RayTracingConfig {
    fn default() -> Self {
        Self {
            readback_latency: 2,
            supported: true,
        }
    }
}
