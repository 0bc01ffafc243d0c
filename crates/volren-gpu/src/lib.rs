//! Thin Vulkan 1.3 layer under the volume renderer.
//!
//! Wraps device setup, memory, pipelines and presentation in safe-ish helpers.
//! Rendering uses dynamic rendering and synchronization2 throughout, so there
//! are no render pass or framebuffer objects.

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod format;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod sampler;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{submit, CommandPool, SemaphoreWait};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use format::{
    full_aspect_mask, is_depth_format, select_depth_format, suitable_depth_format,
    DEPTH_FORMAT_CANDIDATES,
};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{DepthState, GraphicsPipeline, GraphicsPipelineConfig};
pub use sampler::{create_sampler, SamplerFilter};
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::{Swapchain, SwapchainDesc};
pub use sync::{create_fence, create_semaphore, fence_signaled, reset_fence, wait_for_fence};
