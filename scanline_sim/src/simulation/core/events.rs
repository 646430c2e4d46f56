// scanline_sim/src/simulation/core/events.rs

use bevy::prelude::Event;
use scanline_core::prelude::{FrameHandle, LidarPoint, PointCloud};

/// Published once per completed LiDAR scan.
///
/// `points` holds only the hits of that scan, in sample order, in the ENU
/// world frame. A ray-tracing sensor publishes the latest cloud its pipeline
/// has read back, which may be empty during warm-up.
#[derive(Event, Debug, Clone)]
pub struct LidarScanMessage {
    pub agent_handle: FrameHandle,
    pub sensor_handle: FrameHandle,
    /// Simulation time at which `points` were requested, in seconds. On the
    /// ray-tracing path this precedes the tick that published them.
    pub timestamp: f64,
    pub points: Vec<LidarPoint>,
}

impl From<LidarScanMessage> for PointCloud {
    fn from(message: LidarScanMessage) -> Self {
        PointCloud {
            agent_handle: message.agent_handle,
            sensor_handle: message.sensor_handle,
            timestamp: message.timestamp,
            points: message.points,
        }
    }
}
