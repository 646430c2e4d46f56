// scanline_sim/src/cli.rs

use bevy::prelude::Resource;
use clap::{Parser, ValueEnum};
use scanline_core::prelude::ScanMode;
use std::path::PathBuf;

use crate::simulation::config::ScenarioConfig;

/// Scanline: simulated LiDAR scanning in a Bevy + avian3d world.
///
/// This struct defines the command-line arguments that can be passed to any
/// binary application that uses the Scanline simulation library.
#[derive(Parser, Debug, Resource, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/01_single_lidar.toml")]
    pub scenario: PathBuf,

    /// Run the simulation in headless mode (without a graphical window).
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Print the resolved scenario as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,

    /// Force every LiDAR in the scenario to request this scan mode.
    #[arg(long, value_enum)]
    pub scan_mode: Option<ScanModeArg>,
}

/// Command-line spelling of [`ScanMode`].
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanModeArg {
    ParallelFor,
    ComputeShader,
    RayTracing,
}

impl From<ScanModeArg> for ScanMode {
    fn from(arg: ScanModeArg) -> Self {
        match arg {
            ScanModeArg::ParallelFor => ScanMode::ParallelFor,
            ScanModeArg::ComputeShader => ScanMode::ComputeShader,
            ScanModeArg::RayTracing => ScanMode::RayTracing,
        }
    }
}

impl Cli {
    /// Applies command-line overrides on top of a loaded scenario.
    pub fn apply_overrides(&self, config: &mut ScenarioConfig) {
        if let Some(mode) = self.scan_mode {
            config.override_scan_mode(mode.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_the_bundled_scenario_windowed() {
        let cli = Cli::try_parse_from(["scanline"]).expect("no arguments are required");
        assert_eq!(
            cli.scenario,
            PathBuf::from("assets/scenarios/01_single_lidar.toml")
        );
        assert!(!cli.headless);
        assert!(!cli.print_config);
        assert_eq!(cli.scan_mode, None);
    }

    #[test]
    fn scan_mode_values_use_kebab_case_and_match_display() {
        for mode in [
            ScanMode::ParallelFor,
            ScanMode::ComputeShader,
            ScanMode::RayTracing,
        ] {
            let flag = mode.to_string();
            let cli = Cli::try_parse_from(["scanline", "--scan-mode", flag.as_str()])
                .expect("every scan mode has a flag value");
            assert_eq!(cli.scan_mode.map(ScanMode::from), Some(mode));
        }
        assert!(Cli::try_parse_from(["scanline", "--scan-mode", "RayTracing"]).is_err());
    }

    #[test]
    fn override_is_applied_only_when_given() {
        let mut config: ScenarioConfig = toml::from_str(
            r#"
            [[agents]]
            name = "scout"
            sensors = [{ kind = "Lidar", name = "roof", scan_mode = "ComputeShader" }]
        "#,
        )
        .expect("valid scenario");

        let lidar_mode = |config: &ScenarioConfig| {
            let crate::simulation::config::SensorConfig::Lidar(lidar) = &config.agents[0].sensors[0];
            lidar.settings.scan_mode
        };

        Cli::try_parse_from(["scanline"])
            .expect("valid arguments")
            .apply_overrides(&mut config);
        assert_eq!(lidar_mode(&config), ScanMode::ComputeShader);

        Cli::try_parse_from(["scanline", "--scan-mode", "parallel-for", "--headless"])
            .expect("valid arguments")
            .apply_overrides(&mut config);
        assert_eq!(lidar_mode(&config), ScanMode::ParallelFor);
    }
}
