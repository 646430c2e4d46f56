// scanline_core/src/lib.rs

// This file defines the public modules of the library.
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod lidar;
pub mod messages;
pub mod prelude;
pub mod scene;
pub mod scheduling;
pub mod types;
pub mod utils;
