// scanline_core/src/scheduling.rs

//! The duty-cycle gate shared by every scanning sensor.

use crate::scene::TraceableScene;
use nalgebra::Isometry3;
use tracing::warn;

pub const MIN_SCAN_RATE: f64 = 0.01;
pub const MAX_SCAN_RATE: f64 = 100.0;

/// Decides when a sensor scans.
///
/// Frequency (Hz) and period (s) are reciprocal; whichever is set explicitly is
/// clamped to `[MIN_SCAN_RATE, MAX_SCAN_RATE]` and the other is derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanScheduler {
    enabled: bool,
    started: bool,
    scan_frequency: f64,
    scan_period: f64,
    next_scan_time: f64,
    last_time: f64,
}

impl Default for ScanScheduler {
    fn default() -> Self {
        Self::with_frequency(1.0)
    }
}

impl ScanScheduler {
    pub fn with_frequency(frequency: f64) -> Self {
        let mut scheduler = Self {
            enabled: true,
            started: false,
            scan_frequency: 1.0,
            scan_period: 1.0,
            next_scan_time: f64::INFINITY,
            last_time: 0.0,
        };
        scheduler.set_scan_frequency(frequency);
        scheduler
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn scan_frequency(&self) -> f64 {
        self.scan_frequency
    }

    pub fn scan_period(&self) -> f64 {
        self.scan_period
    }

    /// The next deadline, or `None` while the scheduler is not armed.
    pub fn next_scan_time(&self) -> Option<f64> {
        self.is_armed().then_some(self.next_scan_time)
    }

    fn is_armed(&self) -> bool {
        self.enabled && self.started
    }

    pub fn set_scan_frequency(&mut self, frequency: f64) {
        self.scan_frequency = frequency.clamp(MIN_SCAN_RATE, MAX_SCAN_RATE);
        self.scan_period = 1.0 / self.scan_frequency;
        self.reschedule();
    }

    pub fn set_scan_period(&mut self, period: f64) {
        self.scan_period = period.clamp(MIN_SCAN_RATE, MAX_SCAN_RATE);
        self.scan_frequency = 1.0 / self.scan_period;
        self.reschedule();
    }

    /// Arms the scheduler at `now`; the first scan is due one period later if enabled.
    pub fn start(&mut self, now: f64) {
        self.started = true;
        self.last_time = now;
        self.reschedule();
    }

    pub fn enable(&mut self, now: f64) {
        self.enabled = true;
        self.last_time = self.last_time.max(now);
        self.reschedule();
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    // Deadlines restart from the last observed time.
    fn reschedule(&mut self) {
        if self.is_armed() {
            self.next_scan_time = self.last_time + self.scan_period;
        }
    }

    /// Returns `true` at most once per call when the deadline has passed.
    ///
    /// Missed deadlines are skipped, not replayed: the deadline jumps by whole
    /// periods to the first one strictly after `now`.
    pub fn tick(&mut self, now: f64) -> bool {
        self.last_time = now;
        if !self.is_armed() || now < self.next_scan_time {
            return false;
        }

        let behind = ((now - self.next_scan_time) / self.scan_period).floor() + 1.0;
        self.next_scan_time += behind * self.scan_period;
        while self.next_scan_time <= now {
            self.next_scan_time += self.scan_period;
        }
        true
    }
}

/// The world a sensor observes during one tick.
#[derive(Clone, Copy)]
pub struct SensorContext<'a> {
    /// Simulation time in seconds.
    pub time: f64,
    /// Sensor pose in the world frame.
    pub pose: Isometry3<f64>,
    pub scene: Option<&'a dyn TraceableScene>,
}

/// Shared behavior of every sensor that scans on a duty cycle.
pub trait ScanningSensor {
    fn scheduler(&self) -> &ScanScheduler;
    fn scheduler_mut(&mut self) -> &mut ScanScheduler;

    /// Fired when the sensor transitions to enabled.
    fn on_enable_sensor(&mut self) {}

    /// Fired when the sensor transitions to disabled.
    fn on_disable_sensor(&mut self) {}

    /// Fired after either transition, once per actual change.
    fn on_sensor_enabled_changed(&mut self, _enabled: bool) {}

    fn perform_scan(&mut self, _context: &SensorContext) {
        warn!("perform_scan has not been implemented for this sensor");
    }

    fn is_sensor_enabled(&self) -> bool {
        self.scheduler().is_enabled()
    }

    fn set_sensor_enabled(&mut self, now: f64, enabled: bool) {
        if self.scheduler().is_enabled() == enabled {
            return;
        }
        if enabled {
            self.scheduler_mut().enable(now);
            self.on_enable_sensor();
        } else {
            self.scheduler_mut().disable();
            self.on_disable_sensor();
        }
        self.on_sensor_enabled_changed(enabled);
    }

    /// Starts the duty cycle at `now`.
    fn begin(&mut self, now: f64) {
        self.scheduler_mut().start(now);
        if self.scheduler().is_enabled() {
            self.on_enable_sensor();
        }
    }

    /// Runs one scan if the scheduler fires. Returns whether it did.
    fn tick(&mut self, context: &SensorContext) -> bool {
        if self.scheduler_mut().tick(context.time) {
            self.perform_scan(context);
            true
        } else {
            false
        }
    }
}
