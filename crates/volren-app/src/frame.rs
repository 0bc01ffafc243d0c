use ash::vk;

/// What [`crate::Sample::render`] records into.
///
/// The command buffer is already begun and will be ended and submitted by the
/// runner, waiting on the image-acquire semaphore at colour output.
pub struct FrameContext {
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
    pub swapchain_image: vk::Image,
    /// Seconds since the previous frame.
    pub dt: f32,
    pub frame_number: u64,
    /// Frame-in-flight slot, distinct from `image_index`.
    pub frame_index: usize,
}
