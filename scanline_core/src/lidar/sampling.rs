// scanline_core/src/lidar/sampling.rs

use crate::utils::{ratio_or_zero, round_to_count};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Smallest angular resolution (degrees) used when building a grid.
pub const RESOLUTION_EPSILON: f32 = 1e-3;

pub const MAX_FIELD_OF_VIEW: f32 = 360.0;

/// Sampling along one sensor axis (horizontal or vertical), in degrees.
///
/// Either the sample count or the angular resolution is the edited field; the
/// other one is re-derived on every edit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisSamplingSpec {
    field_of_view: f32,
    field_of_view_offset: f32,
    sample_count: u32,
    angular_resolution: f32,
    use_angular_resolution: bool,
}

impl Default for AxisSamplingSpec {
    fn default() -> Self {
        Self::from_resolution(90.0, 2.0)
    }
}

impl AxisSamplingSpec {
    /// An axis edited by angular resolution.
    pub fn from_resolution(field_of_view: f32, angular_resolution: f32) -> Self {
        let mut spec = Self {
            field_of_view: field_of_view.clamp(0.0, MAX_FIELD_OF_VIEW),
            field_of_view_offset: 0.0,
            sample_count: 0,
            angular_resolution,
            use_angular_resolution: true,
        };
        spec.recompute();
        spec
    }

    /// An axis edited by sample count.
    pub fn from_sample_count(field_of_view: f32, sample_count: u32) -> Self {
        let mut spec = Self {
            field_of_view: field_of_view.clamp(0.0, MAX_FIELD_OF_VIEW),
            field_of_view_offset: 0.0,
            sample_count,
            angular_resolution: 0.0,
            use_angular_resolution: false,
        };
        spec.recompute();
        spec
    }

    pub fn with_offset(mut self, offset: f32) -> Self {
        self.set_field_of_view_offset(offset);
        self
    }

    // --- Getters ---

    pub fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    pub fn field_of_view_offset(&self) -> f32 {
        self.field_of_view_offset
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn angular_resolution(&self) -> f32 {
        self.angular_resolution
    }

    pub fn use_angular_resolution(&self) -> bool {
        self.use_angular_resolution
    }

    // --- Setters ---

    pub fn set_field_of_view(&mut self, field_of_view: f32) {
        self.field_of_view = field_of_view.clamp(0.0, MAX_FIELD_OF_VIEW);
        self.recompute();
    }

    pub fn set_field_of_view_offset(&mut self, offset: f32) {
        self.field_of_view_offset = offset.clamp(-MAX_FIELD_OF_VIEW, MAX_FIELD_OF_VIEW);
    }

    /// Makes the sample count the edited field.
    pub fn set_sample_count(&mut self, sample_count: u32) {
        self.sample_count = sample_count;
        self.use_angular_resolution = false;
        self.recompute();
    }

    /// Makes the angular resolution the edited field.
    pub fn set_angular_resolution(&mut self, angular_resolution: f32) {
        self.angular_resolution = angular_resolution;
        self.use_angular_resolution = true;
        self.recompute();
    }

    pub fn set_use_angular_resolution(&mut self, use_angular_resolution: bool) {
        self.use_angular_resolution = use_angular_resolution;
        self.recompute();
    }

    /// Re-derives the dependent field. A zero divisor yields zero.
    pub fn recompute(&mut self) {
        if self.use_angular_resolution {
            let count = round_to_count(ratio_or_zero(self.field_of_view, self.angular_resolution));
            self.sample_count = u32::try_from(count).unwrap_or(u32::MAX);
        } else {
            self.angular_resolution = ratio_or_zero(self.field_of_view, self.sample_count as f32);
        }
    }

    /// The angular step used when building a grid, never below [`RESOLUTION_EPSILON`].
    pub fn grid_resolution(&self) -> f32 {
        self.angular_resolution.max(RESOLUTION_EPSILON)
    }

    /// Number of samples the grid emits along this axis, at least one.
    pub fn grid_samples(&self) -> usize {
        let count = if self.use_angular_resolution {
            round_to_count(self.field_of_view / self.grid_resolution())
        } else {
            self.sample_count as usize
        };
        count.max(1)
    }

    /// Angle (degrees) of sample `index`, centered on the axis offset.
    pub fn sample_angle(&self, index: usize) -> f32 {
        self.field_of_view_offset - 0.5 * self.field_of_view
            + (index as f32 + 0.5) * self.grid_resolution()
    }
}

/// Builds the ordered ray directions of a scan.
pub struct SampleDirectionGrid;

impl SampleDirectionGrid {
    /// Row-major over (vertical, horizontal), followed by the normalized extras.
    ///
    /// Directions are sensor-local with X forward, Y left and Z up.
    pub fn build(
        horizontal: &AxisSamplingSpec,
        vertical: &AxisSamplingSpec,
        extra_directions: &[Vector3<f32>],
    ) -> Vec<Vector3<f32>> {
        let horizontal_samples = horizontal.grid_samples();
        let vertical_samples = vertical.grid_samples();

        let mut directions =
            Vec::with_capacity(horizontal_samples * vertical_samples + extra_directions.len());

        for v in 0..vertical_samples {
            let pitch = vertical.sample_angle(v);
            for h in 0..horizontal_samples {
                let yaw = horizontal.sample_angle(h);
                directions.push(direction_from_angles(yaw, pitch));
            }
        }

        directions.extend(
            extra_directions
                .iter()
                .map(|d| d.try_normalize(0.0).unwrap_or_else(Vector3::zeros)),
        );
        directions
    }
}

/// Unit vector for a yaw/pitch pair in degrees.
pub fn direction_from_angles(yaw_deg: f32, pitch_deg: f32) -> Vector3<f32> {
    let (sin_yaw, cos_yaw) = yaw_deg.to_radians().sin_cos();
    let (sin_pitch, cos_pitch) = pitch_deg.to_radians().sin_cos();
    Vector3::new(cos_pitch * cos_yaw, cos_pitch * sin_yaw, sin_pitch)
}
