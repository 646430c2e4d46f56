// scanline_core/src/lidar/mod.rs

pub mod compute_shader;
pub mod controller;
pub mod parallel_for;
pub mod ray_tracing;
pub mod sampling;
pub mod strategy;

pub use controller::{LidarSensorController, LidarSettings};
pub use sampling::{AxisSamplingSpec, SampleDirectionGrid};
pub use strategy::{build_strategy, ScanBackends, ScanMode, ScanParameters, ScanStrategy};
