// scanline_sim/src/simulation/plugins/debugging/mod.rs

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::common_conditions::on_timer;

// --- Sub-modules for organization ---
mod components;
mod systems;

// Re-export the public component for use in other plugins (like sensor spawners).
pub use components::ShowDebugGizmos;
pub use systems::{debug_ray_stride, MAX_DEBUG_RAYS};

use crate::prelude::AppState;

/// Seconds between LiDAR status summaries.
const STATUS_REPORT_PERIOD: Duration = Duration::from_secs(5);

/// Debug visualization and status reporting.
///
/// Hotkeys (F3 ray visuals, F4 sensor enable) and gizmo drawing need a window
/// and are only added when `interactive` is set.
pub struct DebuggingPlugin {
    pub interactive: bool,
}

impl Plugin for DebuggingPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            systems::report_lidar_status
                .run_if(in_state(AppState::Running))
                .run_if(on_timer(STATUS_REPORT_PERIOD)),
        );

        if self.interactive {
            app.add_systems(
                Update,
                (
                    // Systems for global hotkey toggles
                    systems::toggle_lidar_visuals,
                    systems::toggle_lidar_enabled,
                    // The actual drawing systems
                    systems::draw_lidar_rays,
                    systems::draw_lidar_hits,
                )
                    .run_if(in_state(AppState::Running)),
            );
        }
    }
}
