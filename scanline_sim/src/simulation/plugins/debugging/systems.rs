// scanline_sim/src/simulation/plugins/debugging/systems.rs

use super::components::ShowDebugGizmos;
use crate::prelude::*;
use crate::simulation::core::transforms::{enu_point_f32_to_bevy_point, enu_vector_to_bevy_vector};
use crate::simulation::plugins::render_hooks::RenderDevices;
use crate::simulation::plugins::sensors::lidar::LidarSensor;

/// Upper bound on sample rays drawn per sensor per frame.
pub const MAX_DEBUG_RAYS: usize = 256;

/// Step between drawn samples so that at most `max` of `total` are drawn.
pub fn debug_ray_stride(total: usize, max: usize) -> usize {
    if max == 0 {
        return usize::MAX;
    }
    total.div_ceil(max).max(1)
}

// =========================================================================
// == Toggle Systems (Hotkeys) ==
// =========================================================================

/// Toggles the `ShowDebugGizmos` component on all LiDAR sensors with the F3 key.
pub fn toggle_lidar_visuals(
    mut commands: Commands,
    keyboard: Res<ButtonInput<KeyCode>>,
    query: Query<(Entity, Has<ShowDebugGizmos>), With<LidarSensor>>,
) {
    if !keyboard.just_pressed(KeyCode::F3) {
        return;
    }
    // If any were on, turn them all off.
    let are_any_on = query.iter().any(|(_, shown)| shown);
    for (entity, shown) in &query {
        match (are_any_on, shown) {
            (true, true) => {
                commands.entity(entity).remove::<ShowDebugGizmos>();
            }
            (false, false) => {
                commands.entity(entity).insert(ShowDebugGizmos);
            }
            _ => {}
        }
    }
    info!(
        "[Debug] Toggled LiDAR ray visuals {}",
        if are_any_on { "OFF" } else { "ON" }
    );
}

/// Enables or disables every LiDAR with the F4 key.
pub fn toggle_lidar_enabled(
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time<Fixed>>,
    mut query: Query<&mut LidarSensor>,
) {
    if !keyboard.just_pressed(KeyCode::F4) {
        return;
    }
    let now = time.elapsed_secs_f64();
    let any_enabled = query
        .iter()
        .any(|sensor| sensor.controller.is_sensor_enabled());
    for mut sensor in &mut query {
        sensor.controller.set_sensor_enabled(now, !any_enabled);
    }
}

// =========================================================================
// == Drawing and Logging Systems ==
// =========================================================================

/// Draws a bounded subset of sample rays for sensors with `ShowDebugGizmos`.
pub fn draw_lidar_rays(
    mut gizmos: Gizmos,
    sensor_query: Query<(&LidarSensor, &GlobalTransform), With<ShowDebugGizmos>>,
) {
    for (sensor, transform) in &sensor_query {
        let controller = &sensor.controller;
        let directions = controller.sample_directions();
        let stride = debug_ray_stride(directions.len(), MAX_DEBUG_RAYS);
        let origin = transform.translation();
        let max_range = controller.max_range();

        for direction in directions.iter().step_by(stride) {
            let local = enu_vector_to_bevy_vector(&direction.cast::<f64>());
            let end_point = origin + transform.rotation() * local * max_range;
            gizmos.line(origin, end_point, Color::srgba(1.0, 0.5, 0.0, 0.1));
        }
    }
}

/// Marks every point of the latest cloud of sensors with `ShowDebugGizmos`.
pub fn draw_lidar_hits(
    mut gizmos: Gizmos,
    sensor_query: Query<&LidarSensor, With<ShowDebugGizmos>>,
) {
    for sensor in &sensor_query {
        for point in sensor.controller.scan_data() {
            let position = enu_point_f32_to_bevy_point(&point.position);
            let color = point.color;
            gizmos.sphere(
                Isometry3d::from_translation(position),
                0.05,
                Color::srgba_u8(color.r, color.g, color.b, color.a),
            );
        }
    }
}

/// Periodic one-line summary per LiDAR and per emulated device.
pub fn report_lidar_status(
    sensor_query: Query<(&Name, &LidarSensor)>,
    devices: Res<RenderDevices>,
) {
    for (name, sensor) in &sensor_query {
        let controller = &sensor.controller;
        info!(
            "[LIDAR] '{}' mode={} enabled={} scans={} points={}",
            name,
            controller.scan_mode(),
            controller.is_sensor_enabled(),
            controller.scans_performed(),
            controller.scan_data().len()
        );
    }
    for entry in devices.iter().filter(|entry| entry.device.dispatch_count() > 0) {
        debug!(
            "[LIDAR] device '{}' dispatches={} readbacks={} buffers={}",
            entry.label,
            entry.device.dispatch_count(),
            entry.device.readback_request_count(),
            entry.device.live_buffer_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_caps_the_number_of_drawn_rays() {
        assert_eq!(debug_ray_stride(100, 256), 1);
        assert_eq!(debug_ray_stride(2025, 256), 8);
        assert!(2025_usize.div_ceil(debug_ray_stride(2025, 256)) <= 256);
        assert_eq!(debug_ray_stride(0, 256), 1);
        assert_eq!(debug_ray_stride(10, 0), usize::MAX);
    }
}
