//! Command pools, recording and queue submission.

use crate::error::{GpuError, Result};
use ash::vk;

/// Command pool bound to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let pool = device.create_command_pool(
            &vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(flags),
            None,
        )?;
        Ok(Self { pool })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate one primary command buffer.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn allocate_primary(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        device
            .allocate_command_buffers(&alloc_info)?
            .pop()
            .ok_or_else(|| GpuError::InvalidState("Driver returned no command buffer".to_string()))
    }

    /// Allocate a primary command buffer already recording for a single
    /// submission.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn begin_one_time(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let cmd = self.allocate_primary(device)?;
        if let Err(e) = begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT) {
            device.free_command_buffers(self.pool, &[cmd]);
            return Err(e);
        }
        Ok(cmd)
    }

    /// # Safety
    /// No command buffer from this pool may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// # Safety
/// The command buffer must be in the initial state.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(flags))?;
    Ok(())
}

/// # Safety
/// The command buffer must be recording.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// A semaphore a submission waits on before `stage`.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreWait {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// Submit command buffers with `vkQueueSubmit2`.
///
/// Signal semaphores are signalled once all commands complete. `fence` may be
/// null.
///
/// # Safety
/// All handles must be valid and the command buffers must be executable.
pub unsafe fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    waits: &[SemaphoreWait],
    signals: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let command_infos: Vec<_> = command_buffers
        .iter()
        .map(|&cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd))
        .collect();
    let wait_infos: Vec<_> = waits
        .iter()
        .map(|wait| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(wait.semaphore)
                .stage_mask(wait.stage)
        })
        .collect();
    let signal_infos: Vec<_> = signals
        .iter()
        .map(|&semaphore| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        })
        .collect();

    let submit_info = vk::SubmitInfo2::default()
        .command_buffer_infos(&command_infos)
        .wait_semaphore_infos(&wait_infos)
        .signal_semaphore_infos(&signal_infos);

    device.queue_submit2(queue, std::slice::from_ref(&submit_info), fence)?;
    Ok(())
}
