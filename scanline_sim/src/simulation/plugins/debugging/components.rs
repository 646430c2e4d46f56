// scanline_sim/src/simulation/plugins/debugging/components.rs

use bevy::prelude::Component;

/// Enables debug drawing for the LiDAR it is attached to.
///
/// Inserted at spawn when a sensor sets `debug_visuals`, and toggled for all
/// sensors at once with F3.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct ShowDebugGizmos;
