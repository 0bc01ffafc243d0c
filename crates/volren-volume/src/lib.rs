//! Synthetic volume data for the volume rendering samples.
//!
//! This crate provides:
//! - Dense 3D density grids in the layout uploaded to `R8_UNORM` textures
//! - Procedural density patterns (cross-hair, sphere shell)
//! - A CPU reference of the ray-direction compositing pass

pub mod composite;
pub mod grid;
pub mod pattern;

pub use composite::{march, ray_segment, CompositeOrder, CompositeParams, RaySegment};
pub use grid::{VolumeData, VolumeExtent};
pub use pattern::{CrossHair, PatternKind, SphereShell, VolumePattern};
