// scanline_sim/src/simulation/plugins/mod.rs

pub mod debugging;
pub mod render_hooks;
pub mod sensors;
pub mod vehicles;
pub mod world;
