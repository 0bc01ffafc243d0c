//! Ray-direction volume rendering.
//!
//! This crate provides:
//! - Render targets with the fixed attachment layout (swapchain, depth, albedo,
//!   exit position, ray direction)
//! - A pass planner that validates subpass wiring and derives load/store ops
//!   and layout transitions
//! - The back-face, front-face and lighting subpasses
//! - Staged upload of the density volume into a 3D texture
//! - Camera and debug view modes

pub mod camera;
pub mod debug;
pub mod error;
pub mod gbuffer;
pub mod pass_plan;
pub mod proxy;
pub mod render_pipeline;
pub mod render_target;
pub mod subpasses;
pub mod volume_texture;

pub use camera::{Camera, GeometryPushConstants};
pub use debug::DebugMode;
pub use error::PipelineError;
pub use gbuffer::{clear_all_store_swapchain, clear_values, LoadStoreInfo};
pub use pass_plan::{PassPlan, PlannedPass, SubpassDesc};
pub use proxy::{ProxyCube, ProxyGeometry};
pub use render_pipeline::{DrawContext, FrameParams, RenderPipeline, Subpass};
pub use render_target::{create_render_target, AttachmentKind, GBufferFormats, RenderTarget};
pub use subpasses::{FaceDirection, LightingPushConstants, LightingSubpass, RayDirSubpass};
pub use volume_texture::{check_extent_limit, UploadPhase, VolumeDescriptor, VolumeTexture, VolumeUpload};
