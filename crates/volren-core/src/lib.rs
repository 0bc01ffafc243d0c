//! Core types and math for the volume rendering samples.
//!
//! This crate provides the foundational pieces shared by the other crates:
//! - Ray and bounding box math
//! - Common error types
//! - Volume and marching constants

pub mod error;
pub mod math;

pub use error::{Error, Result};
pub use math::{Aabb, Ray};

/// Sample-wide constants.
pub mod constants {
    /// Default edge length of the generated volume in voxels.
    pub const DEFAULT_VOLUME_SIZE: u32 = 128;
    /// Default number of ray marching steps in the compositing pass.
    pub const DEFAULT_MARCH_STEPS: u32 = 128;
    /// Largest volume edge accepted on the CPU side. No Vulkan driver
    /// reports a larger `maxImageDimension3D`.
    pub const MAX_VOLUME_DIMENSION: u32 = 16384;
}
