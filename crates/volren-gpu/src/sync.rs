//! Fences and semaphores.

use crate::error::Result;
use ash::vk;

/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    Ok(device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?)
}

/// Create a fence, optionally already signalled so the first wait returns
/// immediately.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let mut create_info = vk::FenceCreateInfo::default();
    if signaled {
        create_info = create_info.flags(vk::FenceCreateFlags::SIGNALED);
    }
    Ok(device.create_fence(&create_info, None)?)
}

/// Block until `fence` signals. Returns `false` if `timeout_ns` passed first.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<bool> {
    match device.wait_for_fences(&[fence], true, timeout_ns) {
        Ok(()) => Ok(true),
        Err(vk::Result::TIMEOUT) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Non-blocking fence status.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn fence_signaled(device: &ash::Device, fence: vk::Fence) -> Result<bool> {
    Ok(device.get_fence_status(fence)?)
}

/// # Safety
/// The fence must not be associated with a pending submission.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}
