//! Buffers and images backed by `gpu-allocator`.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};
use std::sync::Arc;

/// Sub-allocating memory manager for the device.
///
/// `shutdown` must run before the device is destroyed; [`crate::GpuContext`]
/// takes care of that.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

fn allocation_error(name: &str, e: impl std::fmt::Display) -> GpuError {
    GpuError::AllocationFailed(format!("{name}: {e}"))
}

impl GpuAllocator {
    /// # Safety
    /// The handles must be valid and `device` must come from
    /// `physical_device`.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let debug_settings = AllocatorDebugSettings {
            log_memory_information: cfg!(debug_assertions),
            log_leaks_on_shutdown: true,
            ..AllocatorDebugSettings::default()
        };
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| allocation_error("allocator", e))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let allocator = self
            .allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| allocation_error(name, e))
    }

    /// Allocate and bind through `bind`, freeing the allocation again when
    /// binding fails.
    fn allocate_bound(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
        bind: impl FnOnce(&ash::Device, &Allocation) -> ash::prelude::VkResult<()>,
    ) -> Result<Allocation> {
        let allocation = self.allocate(name, requirements, location, linear)?;
        match bind(&self.device, &allocation) {
            Ok(()) => Ok(allocation),
            Err(e) => {
                self.release(Some(allocation))?;
                Err(e.into())
            }
        }
    }

    fn release(&mut self, allocation: Option<Allocation>) -> Result<()> {
        match (allocation, self.allocator.as_mut()) {
            (Some(allocation), Some(allocator)) => {
                allocator.free(allocation).map_err(|e| allocation_error("free", e))
            }
            // After shutdown the memory is already gone
            _ => Ok(()),
        }
    }

    /// Create a buffer bound to fresh memory. Host-visible locations come
    /// back persistently mapped.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        // SAFETY: The device outlives the allocator
        let buffer = unsafe { self.device.create_buffer(&info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let bound = self.allocate_bound(name, requirements, location, true, |device, allocation| {
            // SAFETY: The allocation satisfies the buffer's requirements
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        });
        match bound {
            Ok(allocation) => {
                tracing::debug!("Buffer '{name}': {size} bytes in {location:?}");
                Ok(GpuBuffer {
                    buffer,
                    allocation: Some(allocation),
                    size,
                })
            }
            Err(e) => {
                // SAFETY: The buffer was never used
                unsafe { self.device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        let allocation = buffer.allocation.take();
        // SAFETY: Callers only free buffers no pending work uses
        unsafe { self.device.destroy_buffer(std::mem::take(&mut buffer.buffer), None) };
        self.release(allocation)
    }

    /// Create an optimally tiled image bound to fresh memory.
    pub fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        // SAFETY: The device outlives the allocator
        let image = unsafe { self.device.create_image(info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let bound = self.allocate_bound(name, requirements, location, false, |device, allocation| {
            // SAFETY: The allocation satisfies the image's requirements
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        });
        match bound {
            Ok(allocation) => {
                let extent = info.extent;
                tracing::debug!(
                    "Image '{name}': {:?} {}x{}x{}",
                    info.format,
                    extent.width,
                    extent.height,
                    extent.depth
                );
                Ok(GpuImage {
                    image,
                    allocation: Some(allocation),
                    format: info.format,
                    extent,
                })
            }
            Err(e) => {
                // SAFETY: The image was never used
                unsafe { self.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        let allocation = image.allocation.take();
        // SAFETY: Callers only free images no pending work uses
        unsafe { self.device.destroy_image(std::mem::take(&mut image.image), None) };
        self.release(allocation)
    }

    /// Drop the underlying allocator. Allocations still alive are reported as
    /// leaks.
    pub fn shutdown(&mut self) {
        self.allocator = None;
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Copy `data` to the start of a host-visible buffer.
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Copy `data` to `offset` of a host-visible buffer.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.saturating_add(data.len() as u64);
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Write of {offset}..{end} past end of {}-byte buffer",
                self.size
            )));
        }
        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| GpuError::InvalidState("Buffer is not host-visible".to_string()))?;

        // SAFETY: The range was checked against the buffer size and the
        // mapping covers the whole allocation
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }
}

pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl GpuImage {
    /// # Safety
    /// The device must own the image.
    pub unsafe fn create_view(
        &self,
        device: &ash::Device,
        view_type: vk::ImageViewType,
        aspect_mask: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        create_image_view(device, self.image, self.format, view_type, aspect_mask)
    }
}

/// View over mip 0, layer 0 of `image`.
///
/// # Safety
/// The device must own the image.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    view_type: vk::ImageViewType,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(full_subresource_range(aspect_mask));
    Ok(device.create_image_view(&info, None)?)
}

/// Every image here has one mip level and one layer.
pub fn full_subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .level_count(1)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unmapped(size: u64) -> GpuBuffer {
        GpuBuffer {
            buffer: vk::Buffer::null(),
            allocation: None,
            size,
        }
    }

    #[test]
    fn write_past_end_is_rejected() {
        let result = unmapped(4).write_bytes(2, &[0; 4]);
        assert!(matches!(result, Err(GpuError::InvalidState(msg)) if msg.contains("past end")));
    }

    #[test]
    fn write_to_unmapped_buffer_fails() {
        let result = unmapped(16).write(&[1u32, 2]);
        assert!(matches!(result, Err(GpuError::InvalidState(msg)) if msg.contains("host-visible")));
    }

    #[test]
    fn subresource_range_covers_one_level_and_layer() {
        let range = full_subresource_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.base_array_layer, 0);
        assert_eq!(range.layer_count, 1);
    }
}
