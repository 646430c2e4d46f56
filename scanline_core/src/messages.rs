// scanline_core/src/messages.rs

use crate::types::FrameHandle;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

// =========================================================================
// == Perception-Specific Data Structures ==
// =========================================================================

/// An 8-bit RGBA color attached to a LiDAR return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PointColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl PointColor {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const RED: Self = Self::new(255, 0, 0, 255);
    pub const BLUE: Self = Self::new(0, 0, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Packs the color as `0xAARRGGBB`, the layout written by the ray-tracing stages.
    pub fn to_packed_argb(self) -> u32 {
        (u32::from(self.a) << 24)
            | (u32::from(self.r) << 16)
            | (u32::from(self.g) << 8)
            | u32::from(self.b)
    }

    pub fn from_packed_argb(packed: u32) -> Self {
        let [a, r, g, b] = packed.to_be_bytes();
        Self { r, g, b, a }
    }
}

/// A single return from a LiDAR scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    /// The 3D position of the return in the WORLD frame.
    pub position: Point3<f32>,
    /// The intensity of the laser return. Not yet modeled; always zero.
    pub intensity: f32,
    pub color: PointColor,
    /// Whether the ray registered a hit. Published clouds only contain hits.
    pub hit: bool,
}

impl Default for LidarPoint {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            intensity: 0.0,
            color: PointColor::BLACK,
            hit: false,
        }
    }
}

impl LidarPoint {
    /// A hit whose intensity and color are placeholders until material-aware
    /// shading exists.
    pub fn placeholder_hit(position: Point3<f32>) -> Self {
        Self {
            position,
            intensity: 0.0,
            color: PointColor::RED,
            hit: true,
        }
    }
}

/// A structured representation of a point cloud from a sensor.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    /// The handle of the agent carrying the sensor.
    pub agent_handle: FrameHandle,
    /// The handle of the sensor that generated this point cloud.
    pub sensor_handle: FrameHandle,
    /// The simulation time at which the scan was published.
    pub timestamp: f64,
    /// The collection of points that make up the scan.
    pub points: Vec<LidarPoint>,
}
