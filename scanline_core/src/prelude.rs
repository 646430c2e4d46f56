// scanline_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::gpu::RayTracingDevice;
pub use crate::lidar::strategy::ScanStrategy;
pub use crate::scene::TraceableScene;
pub use crate::scheduling::{ScanningSensor, SensorContext};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::lidar::sampling::AxisSamplingSpec;
pub use crate::lidar::strategy::{ScanBackends, ScanMode, ScanParameters};
pub use crate::messages::{LidarPoint, PointCloud, PointColor};
pub use crate::scene::{RayQuery, SurfaceHit, SurfaceMaterial};
pub use crate::types::FrameHandle;

// --- Concrete Implementations (Export common ones for convenience) ---
pub use crate::geometry::{Aabb, LayeredScene, OrientedBox, Plane, PrimitiveScene, Sphere};
pub use crate::gpu::{FrameHookRegistry, SoftwareRayTracingDevice};
pub use crate::lidar::controller::{LidarSensorController, LidarSettings};
pub use crate::scheduling::ScanScheduler;
