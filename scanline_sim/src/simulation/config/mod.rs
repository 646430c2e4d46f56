// scanline_sim/src/simulation/config/mod.rs

//! Loading and validating scenario files.
//!
//! A scenario is read from TOML and then overlaid with `SCANLINE_`-prefixed
//! environment variables, where `__` separates nesting levels
//! (`SCANLINE_SIMULATION__SEED=7` sets `simulation.seed`).

pub mod structs;

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use scanline_core::prelude::ScanMode;
use thiserror::Error;

pub use structs::{AgentConfig, LidarConfig, ScenarioConfig, SensorConfig};

pub const ENV_PREFIX: &str = "SCANLINE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scenario file not found: {0}")]
    MissingFile(PathBuf),
    #[error("failed to parse scenario: {0}")]
    Figment(Box<figment::Error>),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidRange { field: String, reason: String },
    #[error("scenario defines no agents")]
    EmptyScenario,
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Figment(Box::new(error))
    }
}

/// Reads, overlays and validates the scenario at `path`.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }
    let figment = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    scenario_from_figment(&figment)
}

/// Extracts and validates a scenario from an already assembled figment.
pub fn scenario_from_figment(figment: &Figment) -> Result<ScenarioConfig, ConfigError> {
    let config: ScenarioConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidRange {
        field: field.into(),
        reason: reason.into(),
    }
}

impl ScenarioConfig {
    /// Rejects values no part of the simulation can recover from.
    ///
    /// LiDAR settings are not checked here; the controller clamps them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::EmptyScenario);
        }
        if self.simulation.duration_seconds <= 0.0 {
            return Err(invalid("simulation.duration_seconds", "must be positive"));
        }
        if self.simulation.render_frame_rate <= 0.0 {
            return Err(invalid("simulation.render_frame_rate", "must be positive"));
        }
        if self.world.ground_size <= 0.0 {
            return Err(invalid("world.ground_size", "must be positive"));
        }
        if self.world.obstacle_spread < 0.0 {
            return Err(invalid("world.obstacle_spread", "must not be negative"));
        }
        for (index, obstacle) in self.world.obstacles.iter().enumerate() {
            if obstacle.half_extents.iter().any(|extent| *extent <= 0.0) {
                return Err(invalid(
                    format!("world.obstacles[{index}].half_extents"),
                    "every extent must be positive",
                ));
            }
        }
        for agent in &self.agents {
            if agent.body_half_extents.iter().any(|extent| *extent <= 0.0) {
                return Err(invalid(
                    format!("agents.{}.body_half_extents", agent.name),
                    "every extent must be positive",
                ));
            }
        }
        Ok(())
    }

    /// Forces every LiDAR in the scenario to request `mode`.
    pub fn override_scan_mode(&mut self, mode: ScanMode) {
        for agent in &mut self.agents {
            for SensorConfig::Lidar(lidar) in &mut agent.sensors {
                lidar.settings.scan_mode = mode;
            }
        }
    }

    pub fn lidar_count(&self) -> usize {
        self.agents.iter().map(|agent| agent.sensors.len()).sum()
    }

    /// The scenario as it will run, after overlays and overrides.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
