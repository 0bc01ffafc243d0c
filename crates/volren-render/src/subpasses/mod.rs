//! Subpasses of the ray-direction volume renderer.

mod lighting;
mod raydir;

pub use lighting::{LightingPushConstants, LightingSubpass};
pub use raydir::{FaceDirection, RayDirSubpass};
