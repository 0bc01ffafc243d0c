//! Render pipeline wiring errors.

use thiserror::Error;
use volren_gpu::GpuError;

/// Invalid subpass wiring detected while planning a render pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline has nothing to record.
    #[error("Render pipeline has no subpasses")]
    NoSubpasses,

    /// A subpass references an attachment index the render target lacks.
    #[error("Subpass '{subpass}' references unknown attachment {attachment}")]
    UnknownAttachment { subpass: String, attachment: usize },

    /// An input was not produced by any earlier subpass.
    #[error("Subpass '{subpass}' reads attachment {attachment} before any subpass writes it")]
    InputNotWritten { subpass: String, attachment: usize },

    /// A subpass samples the attachment it renders to.
    #[error("Subpass '{subpass}' both reads and writes attachment {attachment}")]
    ReadWriteConflict { subpass: String, attachment: usize },

    /// Depth bound as color, or color bound as depth.
    #[error("Subpass '{subpass}' binds attachment {attachment} with the wrong aspect")]
    AspectMismatch { subpass: String, attachment: usize },

    /// The swapchain image cannot be sampled.
    #[error("Subpass '{subpass}' reads the swapchain attachment {attachment}")]
    SwapchainInput { subpass: String, attachment: usize },

    /// The same attachment appears twice in a subpass's outputs.
    #[error("Subpass '{subpass}' writes attachment {attachment} more than once")]
    DuplicateOutput { subpass: String, attachment: usize },
}

impl From<PipelineError> for GpuError {
    fn from(err: PipelineError) -> Self {
        Self::PipelineCreation(err.to_string())
    }
}
