// scanline_core/src/gpu/layout.rs

use crate::error::{GpuError, GpuResult};
use crate::messages::{LidarPoint, PointColor};
use bytemuck::{Pod, Zeroable};
use nalgebra::Point3;

/// One ray result as written by the closest-hit and miss stages.
///
/// Must stay bit-compatible with the device output buffer: 32 bytes, no implicit padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuLidarPoint {
    pub xyz: [f32; 3],
    pub intensity: f32,
    /// Packed `0xAARRGGBB`.
    pub rgb: u32,
    /// Non-zero when the ray hit geometry.
    pub hit: u32,
    pub padding: [u32; 2],
}

const _: () = assert!(std::mem::size_of::<GpuLidarPoint>() == 32);

impl GpuLidarPoint {
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    pub fn miss() -> Self {
        Self::default()
    }

    /// Bytes needed for an output buffer holding `count` records.
    pub fn buffer_size(count: usize) -> usize {
        count * Self::STRIDE
    }

    pub fn to_lidar_point(self) -> LidarPoint {
        LidarPoint {
            position: Point3::from(self.xyz),
            intensity: self.intensity,
            color: PointColor::from_packed_argb(self.rgb),
            hit: self.hit != 0,
        }
    }

    /// Decodes raw readback bytes, keeping only hits in record order.
    ///
    /// Mapped readback memory carries no alignment guarantee, so records are
    /// copied out rather than cast in place.
    pub fn decode_hits(bytes: &[u8]) -> GpuResult<Vec<LidarPoint>> {
        if bytes.len() % Self::STRIDE != 0 {
            return Err(GpuError::MisalignedData {
                len: bytes.len(),
                stride: Self::STRIDE,
            });
        }
        Ok(bytes
            .chunks_exact(Self::STRIDE)
            .map(bytemuck::pod_read_unaligned::<GpuLidarPoint>)
            .filter(|record| record.hit != 0)
            .map(GpuLidarPoint::to_lidar_point)
            .collect())
    }
}

impl From<&LidarPoint> for GpuLidarPoint {
    fn from(point: &LidarPoint) -> Self {
        Self {
            xyz: [point.position.x, point.position.y, point.position.z],
            intensity: point.intensity,
            rgb: point.color.to_packed_argb(),
            hit: u32::from(point.hit),
            padding: [0; 2],
        }
    }
}
