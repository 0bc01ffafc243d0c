use ash::vk;
use thiserror::Error;

/// Failures of the Vulkan layer.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan library could not be loaded.
    #[error("Vulkan loader unavailable: {0}")]
    Loader(String),

    #[error("No device supports Vulkan 1.3 with dynamic rendering and synchronization2")]
    NoSuitableDevice,

    /// None of the candidate formats supports the requested usage.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A resource would exceed a device limit.
    #[error("Device limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("GPU allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Cannot create surface: {0}")]
    SurfaceCreation(String),

    #[error("Cannot create swapchain: {0}")]
    SwapchainCreation(String),

    #[error("Invalid SPIR-V for {0}")]
    ShaderModule(String),

    #[error("Cannot create pipeline: {0}")]
    PipelineCreation(String),

    /// An operation was called out of order, e.g. finishing an upload that
    /// has not completed.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, GpuError>;
