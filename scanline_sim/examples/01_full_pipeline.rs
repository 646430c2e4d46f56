// scanline_sim/examples/01_full_pipeline.rs

//! A full end-to-end run of the Scanline LiDAR simulation.
//!
//! This example:
//! 1. Loads a scenario from TOML (plus `SCANLINE_` environment overrides).
//! 2. Sets up Bevy either windowed or headless.
//! 3. Adds the `ScanlineSimulationPlugin`, which spawns the world, the agents
//!    and their LiDARs and runs the scans until the scenario's duration ends.
//!
//! To run this example:
//! `cargo run --example 01_full_pipeline -- --scenario assets/scenarios/02_ray_tracing_fleet.toml --headless`

use std::time::Duration;

// --- Bevy Imports ---
use avian3d::prelude::*;
use bevy::{
    app::ScheduleRunnerPlugin, asset::AssetPlugin, log::LogPlugin, scene::ScenePlugin,
    state::app::StatesPlugin, transform::TransformPlugin,
};
use clap::Parser;

// --- Project-Specific Imports ---
use scanline_sim::cli::Cli;
use scanline_sim::prelude::*;
use scanline_sim::simulation::config::load_scenario;
use scanline_sim::ScanlineSimulationPlugin;

const LOG_FILTER: &str = "info,wgpu_core=error,wgpu_hal=error,scanline_sim=debug,scanline_core=debug";

fn log_plugin() -> LogPlugin {
    LogPlugin {
        level: bevy::log::Level::INFO,
        filter: LOG_FILTER.to_string(),
        ..default()
    }
}

fn main() -> AppExit {
    let cli = Cli::parse();

    // --- 1. Load Simulation Configuration ---
    let mut config = match load_scenario(&cli.scenario) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Could not load scenario '{}': {}", cli.scenario.display(), err);
            return AppExit::error();
        }
    };
    cli.apply_overrides(&mut config);

    if cli.print_config {
        return match config.to_toml_string() {
            Ok(toml) => {
                println!("{toml}");
                AppExit::Success
            }
            Err(err) => {
                eprintln!("Could not print scenario: {err}");
                AppExit::error()
            }
        };
    }

    let mut app = App::new();

    // --- 2. Add Core Bevy Plugins ---
    if cli.headless {
        let frame_period = Duration::from_secs_f64(1.0 / config.simulation.render_frame_rate);
        app.add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame_period)),
            log_plugin(),
            TransformPlugin,
            AssetPlugin::default(),
            ScenePlugin,
            StatesPlugin,
        ))
        // Avian registers mesh-based collider constructors.
        .init_asset::<Mesh>();
    } else {
        app.add_plugins(DefaultPlugins.set(log_plugin()))
            // An Avian3D plugin to visualize colliders for debugging.
            .add_plugins(PhysicsDebugPlugin::default());
    }

    app.add_plugins(PhysicsPlugins::default())
        // Insert the loaded configuration as a resource so all systems can access it.
        .insert_resource(config)
        .insert_resource(cli.clone())
        .init_state::<AppState>();

    // --- 3. Add the Main Scanline Simulation Plugin ---
    app.add_plugins(ScanlineSimulationPlugin {
        headless: cli.headless,
    });

    // --- 4. Run the App ---
    info!("Starting Scanline simulation...");
    app.run()
}
