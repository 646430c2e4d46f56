// scanline_core/src/lidar/controller.rs

use crate::lidar::sampling::{AxisSamplingSpec, SampleDirectionGrid, MAX_FIELD_OF_VIEW};
use crate::lidar::strategy::{build_strategy, ScanBackends, ScanMode, ScanParameters, ScanStrategy};
use crate::messages::LidarPoint;
use crate::scheduling::{ScanScheduler, ScanningSensor, SensorContext};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest angular resolution (degrees) accepted by the resolution setters.
pub const MIN_ANGULAR_RESOLUTION: f32 = 0.01;

/// Editable LiDAR configuration. Ranges are in meters, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidarSettings {
    pub horizontal: AxisSamplingSpec,
    pub vertical: AxisSamplingSpec,
    /// Additional sensor-local directions appended after the grid.
    pub extra_directions: Vec<Vector3<f32>>,
    pub min_range: f32,
    pub max_range: f32,
    pub scan_mode: ScanMode,
    /// Scans per second.
    pub scan_frequency: f64,
    pub enabled: bool,
}

impl Default for LidarSettings {
    fn default() -> Self {
        Self {
            horizontal: AxisSamplingSpec::from_resolution(90.0, 2.0),
            vertical: AxisSamplingSpec::from_resolution(45.0, 1.0),
            extra_directions: Vec::new(),
            min_range: 1.5,
            max_range: 5000.0,
            scan_mode: ScanMode::ParallelFor,
            scan_frequency: 1.0,
            enabled: true,
        }
    }
}

impl LidarSettings {
    /// Clamps every field into its valid domain and re-derives the axis pairs.
    pub fn sanitized(mut self) -> Self {
        for axis in [&mut self.horizontal, &mut self.vertical] {
            axis.set_field_of_view(axis.field_of_view());
            axis.set_field_of_view_offset(axis.field_of_view_offset());
            if axis.use_angular_resolution() {
                axis.set_angular_resolution(axis.angular_resolution().max(MIN_ANGULAR_RESOLUTION));
            }
        }
        self.min_range = self.min_range.max(0.0);
        self.max_range = self.max_range.max(self.min_range);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

pub type EnabledListener = Box<dyn FnMut(bool) + Send + Sync>;

/// Owns a LiDAR's configuration, its active scan strategy and its latest cloud.
pub struct LidarSensorController {
    settings: LidarSettings,
    scheduler: ScanScheduler,
    backends: ScanBackends,
    sample_directions: Arc<[Vector3<f32>]>,
    /// `None` until activation.
    strategy: Option<Box<dyn ScanStrategy>>,
    scan_data: Vec<LidarPoint>,
    activated: bool,
    enabled_listeners: Vec<EnabledListener>,
    scans_performed: u64,
    last_scan_time: Option<f64>,
    scan_data_time: Option<f64>,
}

impl std::fmt::Debug for LidarSensorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LidarSensorController")
            .field("settings", &self.settings)
            .field("strategy", &self.strategy)
            .field("samples", &self.sample_directions.len())
            .field("points", &self.scan_data.len())
            .field("activated", &self.activated)
            .finish()
    }
}

impl LidarSensorController {
    pub fn new(settings: LidarSettings, backends: ScanBackends) -> Self {
        let settings = settings.sanitized();
        let mut scheduler = ScanScheduler::with_frequency(settings.scan_frequency);
        if !settings.enabled {
            scheduler.disable();
        }
        Self {
            settings: LidarSettings {
                scan_frequency: scheduler.scan_frequency(),
                ..settings
            },
            scheduler,
            backends,
            sample_directions: Arc::from(Vec::new()),
            strategy: None,
            scan_data: Vec::new(),
            activated: false,
            enabled_listeners: Vec::new(),
            scans_performed: 0,
            last_scan_time: None,
            scan_data_time: None,
        }
    }

    /// Builds the direction set and strategy, then starts the duty cycle at `now`.
    pub fn activate(&mut self, now: f64) {
        if self.activated {
            return;
        }
        self.rebuild_sample_directions();
        self.initialize_strategy();
        self.activated = true;
        self.begin(now);
        info!(
            samples = self.sample_directions.len(),
            mode = %self.scan_mode(),
            frequency = self.scheduler.scan_frequency(),
            "LiDAR activated"
        );
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    // --- Derived state ---

    fn rebuild_sample_directions(&mut self) {
        self.sample_directions = Arc::from(SampleDirectionGrid::build(
            &self.settings.horizontal,
            &self.settings.vertical,
            &self.settings.extra_directions,
        ));
        debug!(samples = self.sample_directions.len(), "Rebuilt LiDAR sample directions");
    }

    fn initialize_strategy(&mut self) {
        // Release the old backend before the new one claims its resources.
        self.strategy = None;
        let requested = self.settings.scan_mode;
        let (strategy, actual) = build_strategy(requested, &self.backends);
        if actual != requested {
            warn!(requested = %requested, actual = %actual, "LiDAR scan mode fell back");
        }
        self.settings.scan_mode = actual;
        self.strategy = Some(strategy);
    }

    fn on_sampling_changed(&mut self) {
        if self.activated {
            self.rebuild_sample_directions();
        }
    }

    fn edit_axis(&mut self, axis: Axis, edit: impl FnOnce(&mut AxisSamplingSpec)) {
        let spec = match axis {
            Axis::Horizontal => &mut self.settings.horizontal,
            Axis::Vertical => &mut self.settings.vertical,
        };
        let before = *spec;
        edit(spec);
        if *spec != before {
            self.on_sampling_changed();
        }
    }

    // --- Sampling setters ---

    pub fn set_horizontal_field_of_view(&mut self, fov: f32) {
        self.edit_axis(Axis::Horizontal, |spec| {
            spec.set_field_of_view(fov.clamp(0.0, MAX_FIELD_OF_VIEW))
        });
    }

    pub fn set_vertical_field_of_view(&mut self, fov: f32) {
        self.edit_axis(Axis::Vertical, |spec| {
            spec.set_field_of_view(fov.clamp(0.0, MAX_FIELD_OF_VIEW))
        });
    }

    pub fn set_horizontal_field_of_view_offset(&mut self, offset: f32) {
        self.edit_axis(Axis::Horizontal, |spec| spec.set_field_of_view_offset(offset));
    }

    pub fn set_vertical_field_of_view_offset(&mut self, offset: f32) {
        self.edit_axis(Axis::Vertical, |spec| spec.set_field_of_view_offset(offset));
    }

    pub fn set_horizontal_resolution(&mut self, resolution: f32) {
        self.edit_axis(Axis::Horizontal, |spec| {
            spec.set_angular_resolution(resolution.max(MIN_ANGULAR_RESOLUTION))
        });
    }

    pub fn set_vertical_resolution(&mut self, resolution: f32) {
        self.edit_axis(Axis::Vertical, |spec| {
            spec.set_angular_resolution(resolution.max(MIN_ANGULAR_RESOLUTION))
        });
    }

    pub fn set_horizontal_sample_count(&mut self, count: u32) {
        self.edit_axis(Axis::Horizontal, |spec| spec.set_sample_count(count));
    }

    pub fn set_vertical_sample_count(&mut self, count: u32) {
        self.edit_axis(Axis::Vertical, |spec| spec.set_sample_count(count));
    }

    pub fn set_extra_directions(&mut self, directions: Vec<Vector3<f32>>) {
        if self.settings.extra_directions == directions {
            return;
        }
        self.settings.extra_directions = directions;
        self.on_sampling_changed();
    }

    // --- Strategy & range setters ---

    pub fn set_scan_mode(&mut self, mode: ScanMode) {
        if self.settings.scan_mode == mode {
            return;
        }
        self.settings.scan_mode = mode;
        if self.activated {
            self.initialize_strategy();
        }
    }

    /// Replaces the available capabilities; an active strategy is rebuilt against them.
    pub fn set_backends(&mut self, backends: ScanBackends) {
        self.backends = backends;
        if self.activated {
            self.initialize_strategy();
        }
    }

    pub fn set_min_range(&mut self, min_range: f32) {
        let min_range = min_range.max(0.0);
        if self.settings.min_range == min_range {
            return;
        }
        self.settings.min_range = min_range;
        self.settings.max_range = self.settings.max_range.max(min_range);
    }

    pub fn set_max_range(&mut self, max_range: f32) {
        let max_range = max_range.max(self.settings.min_range);
        if self.settings.max_range == max_range {
            return;
        }
        self.settings.max_range = max_range;
    }

    pub fn set_scan_frequency(&mut self, frequency: f64) {
        self.scheduler.set_scan_frequency(frequency);
        self.settings.scan_frequency = self.scheduler.scan_frequency();
    }

    pub fn set_scan_period(&mut self, period: f64) {
        self.scheduler.set_scan_period(period);
        self.settings.scan_frequency = self.scheduler.scan_frequency();
    }

    pub fn add_enabled_listener(&mut self, listener: EnabledListener) {
        self.enabled_listeners.push(listener);
    }

    // --- Getters ---

    pub fn settings(&self) -> &LidarSettings {
        &self.settings
    }

    pub fn sample_directions(&self) -> &[Vector3<f32>] {
        &self.sample_directions
    }

    /// The latest published cloud: hits only, world frame.
    pub fn scan_data(&self) -> &[LidarPoint] {
        &self.scan_data
    }

    /// The mode actually in use, after any fallback.
    pub fn scan_mode(&self) -> ScanMode {
        self.strategy
            .as_ref()
            .map_or(self.settings.scan_mode, |strategy| strategy.mode())
    }

    pub fn horizontal_samples(&self) -> usize {
        self.settings.horizontal.grid_samples()
    }

    pub fn vertical_samples(&self) -> usize {
        self.settings.vertical.grid_samples()
    }

    pub fn horizontal_field_of_view(&self) -> f32 {
        self.settings.horizontal.field_of_view()
    }

    pub fn vertical_field_of_view(&self) -> f32 {
        self.settings.vertical.field_of_view()
    }

    pub fn horizontal_resolution(&self) -> f32 {
        self.settings.horizontal.angular_resolution()
    }

    pub fn vertical_resolution(&self) -> f32 {
        self.settings.vertical.angular_resolution()
    }

    pub fn min_range(&self) -> f32 {
        self.settings.min_range
    }

    pub fn max_range(&self) -> f32 {
        self.settings.max_range
    }

    pub fn scans_performed(&self) -> u64 {
        self.scans_performed
    }

    pub fn last_scan_time(&self) -> Option<f64> {
        self.last_scan_time
    }

    /// Time of the request that produced [`Self::scan_data`]. Earlier than
    /// [`Self::last_scan_time`] when the strategy returns results late.
    pub fn scan_data_time(&self) -> Option<f64> {
        self.scan_data_time
    }
}

impl ScanningSensor for LidarSensorController {
    fn scheduler(&self) -> &ScanScheduler {
        &self.scheduler
    }

    fn scheduler_mut(&mut self) -> &mut ScanScheduler {
        &mut self.scheduler
    }

    fn on_enable_sensor(&mut self) {
        debug!("LiDAR enabled");
    }

    fn on_disable_sensor(&mut self) {
        debug!("LiDAR disabled");
    }

    fn on_sensor_enabled_changed(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        for listener in &mut self.enabled_listeners {
            listener(enabled);
        }
    }

    fn perform_scan(&mut self, context: &SensorContext) {
        let Some(strategy) = self.strategy.as_mut() else {
            warn!("LiDAR scan requested before activation; skipping");
            return;
        };
        let params = ScanParameters {
            sensor_location: Point3::from(context.pose.translation.vector),
            sensor_rotation: context.pose.rotation,
            sample_directions: Arc::clone(&self.sample_directions),
            min_range: self.settings.min_range,
            max_range: self.settings.max_range,
            requested_at: context.time,
        };
        self.scan_data = strategy.execute_scan(&params, context.scene);
        self.scan_data_time = Some(strategy.returned_request_time().unwrap_or(context.time));
        self.scans_performed += 1;
        self.last_scan_time = Some(context.time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Plane, PrimitiveScene};
    use crate::gpu::{FrameHookRegistry, SoftwareRayTracingDevice};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn narrow_settings() -> LidarSettings {
        LidarSettings {
            horizontal: AxisSamplingSpec::from_resolution(10.0, 1.0),
            vertical: AxisSamplingSpec::from_resolution(2.0, 1.0),
            min_range: 0.5,
            max_range: 100.0,
            ..LidarSettings::default()
        }
    }

    fn wall_at(x: f64) -> PrimitiveScene {
        PrimitiveScene::new().with(Plane::new(Point3::new(x, 0.0, 0.0), -Vector3::x_axis()), None)
    }

    #[test]
    fn default_grid_is_built_on_activation_only() {
        let mut lidar = LidarSensorController::new(LidarSettings::default(), ScanBackends::cpu_only());
        assert!(lidar.sample_directions().is_empty());
        assert_eq!((lidar.horizontal_samples(), lidar.vertical_samples()), (45, 45));

        lidar.activate(0.0);
        assert_eq!(lidar.sample_directions().len(), 45 * 45);
        assert_eq!(lidar.scan_mode(), ScanMode::ParallelFor);
    }

    #[test]
    fn edits_before_activation_do_not_build() {
        let mut lidar = LidarSensorController::new(narrow_settings(), ScanBackends::cpu_only());
        lidar.set_horizontal_field_of_view(20.0);
        assert!(lidar.sample_directions().is_empty());

        lidar.activate(0.0);
        assert_eq!(lidar.sample_directions().len(), 20 * 2);
    }

    #[test]
    fn edits_after_activation_rebuild_and_equal_values_are_ignored() {
        let mut lidar = LidarSensorController::new(narrow_settings(), ScanBackends::cpu_only());
        lidar.activate(0.0);
        let before = Arc::clone(&lidar.sample_directions);

        lidar.set_horizontal_field_of_view(10.0);
        lidar.set_vertical_resolution(1.0);
        lidar.set_extra_directions(Vec::new());
        assert!(Arc::ptr_eq(&before, &lidar.sample_directions));

        lidar.set_vertical_field_of_view(4.0);
        assert!(!Arc::ptr_eq(&before, &lidar.sample_directions));
        assert_eq!(lidar.sample_directions().len(), 10 * 4);

        lidar.set_extra_directions(vec![Vector3::z()]);
        assert_eq!(lidar.sample_directions().len(), 10 * 4 + 1);
    }

    #[test]
    fn setters_clamp_their_inputs() {
        let mut lidar = LidarSensorController::new(narrow_settings(), ScanBackends::cpu_only());
        lidar.set_horizontal_field_of_view(500.0);
        lidar.set_vertical_resolution(0.0);
        assert_eq!(lidar.horizontal_field_of_view(), 360.0);
        assert_relative_eq!(lidar.vertical_resolution(), MIN_ANGULAR_RESOLUTION);

        lidar.set_min_range(-2.0);
        assert_eq!(lidar.min_range(), 0.0);
        lidar.set_min_range(200.0);
        assert_eq!(lidar.max_range(), 200.0);
        lidar.set_max_range(50.0);
        assert_eq!(lidar.max_range(), 200.0);
    }

    #[test]
    fn unavailable_mode_is_recorded_as_fallback() {
        let mut lidar = LidarSensorController::new(narrow_settings(), ScanBackends::cpu_only());
        lidar.activate(0.0);
        lidar.set_scan_mode(ScanMode::RayTracing);
        assert_eq!(lidar.scan_mode(), ScanMode::ParallelFor);
        assert_eq!(lidar.settings().scan_mode, ScanMode::ParallelFor);

        lidar.set_scan_mode(ScanMode::ComputeShader);
        assert_eq!(lidar.settings().scan_mode, ScanMode::ParallelFor);
    }

    #[test]
    fn switching_modes_releases_the_previous_strategy() {
        let device = Arc::new(SoftwareRayTracingDevice::new(Arc::new(wall_at(20.0))));
        let hooks = Arc::new(FrameHookRegistry::new());
        let settings = LidarSettings {
            scan_mode: ScanMode::RayTracing,
            ..narrow_settings()
        };
        let mut lidar = LidarSensorController::new(
            settings,
            ScanBackends::with_ray_tracing(device, Arc::clone(&hooks)),
        );
        assert!(hooks.is_empty());

        lidar.activate(0.0);
        assert_eq!(lidar.scan_mode(), ScanMode::RayTracing);
        assert_eq!(hooks.len(), 1);

        lidar.set_scan_mode(ScanMode::ParallelFor);
        assert!(hooks.is_empty());
    }

    #[test]
    fn due_tick_scans_the_scene_from_the_sensor_pose() {
        let scene = wall_at(20.0);
        let mut lidar = LidarSensorController::new(narrow_settings(), ScanBackends::cpu_only());
        lidar.activate(0.0);

        let pose = Isometry3::from_parts(Translation3::new(5.0, 0.0, 0.0), UnitQuaternion::identity());
        let context = |time| SensorContext {
            time,
            pose,
            scene: Some(&scene),
        };

        assert!(!lidar.tick(&context(0.5)));
        assert!(lidar.scan_data().is_empty());

        assert!(lidar.tick(&context(1.0)));
        assert_eq!(lidar.scan_data().len(), 20);
        for point in lidar.scan_data() {
            assert!(point.hit);
            assert_relative_eq!(point.position.x, 20.0, epsilon = 1e-3);
        }
        assert_eq!(lidar.scans_performed(), 1);
        assert_eq!(lidar.last_scan_time(), Some(1.0));
        assert_eq!(lidar.scan_data_time(), Some(1.0));
    }

    #[test]
    fn ray_tracing_results_lag_behind_requests() {
        let device = Arc::new(SoftwareRayTracingDevice::new(Arc::new(wall_at(20.0))));
        let hooks = Arc::new(FrameHookRegistry::new());
        let settings = LidarSettings {
            scan_mode: ScanMode::RayTracing,
            ..narrow_settings()
        };
        let mut lidar = LidarSensorController::new(
            settings,
            ScanBackends::with_ray_tracing(device, Arc::clone(&hooks)),
        );
        lidar.activate(0.0);

        let context = |time| SensorContext {
            time,
            pose: Isometry3::identity(),
            scene: None,
        };
        assert!(lidar.tick(&context(1.0)));
        assert!(lidar.scan_data().is_empty());

        assert_eq!(lidar.scan_data_time(), Some(1.0));

        hooks.run_frame(0.016);
        hooks.run_frame(0.016);
        assert!(lidar.tick(&context(2.0)));
        assert_eq!(lidar.scan_data().len(), 20);
        // The cloud was requested at t=1 and published at t=2.
        assert_eq!(lidar.last_scan_time(), Some(2.0));
        assert_eq!(lidar.scan_data_time(), Some(1.0));
    }

    #[test]
    fn enable_listeners_fire_on_change_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut lidar = LidarSensorController::new(narrow_settings(), ScanBackends::cpu_only());
        let counter = Arc::clone(&calls);
        lidar.add_enabled_listener(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        lidar.activate(0.0);

        lidar.set_sensor_enabled(0.5, true);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        lidar.set_sensor_enabled(0.5, false);
        assert!(!lidar.settings().enabled);
        assert!(!lidar.tick(&SensorContext {
            time: 10.0,
            pose: Isometry3::identity(),
            scene: None,
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
