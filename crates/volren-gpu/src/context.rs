//! Device selection and the shared GPU context.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Instance, device and allocator shared by every pass.
///
/// Rendering, presentation and uploads all use one graphics queue.
pub struct GpuContext {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Mutex<GpuAllocator>,
    queue_family: u32,
    queue: vk::Queue,
}

impl GpuContext {
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: The device is alive for as long as the context
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: Dropping the context ends all use of the device
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::warn!("device_wait_idle failed during shutdown: {e}");
            }
            // gpu-allocator frees its memory blocks through the device
            self.allocator.lock().shutdown();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Configures instance creation for [`GpuContext`].
pub struct GpuContextBuilder {
    app_name: String,
    validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Volren".to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Validation layers default to on in debug builds.
    pub fn validation(mut self, enable: bool) -> Self {
        self.validation = enable;
        self
    }

    pub fn build(self) -> Result<GpuContext> {
        // SAFETY: Loading the Vulkan library has no preconditions beyond the
        // library itself being well formed
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loader(e.to_string()))?;
        // SAFETY: `entry` outlives the instance since both move into the
        // context
        let instance = unsafe { create_instance(&entry, &self.app_name, self.validation)? };

        // SAFETY: `instance` was just created
        match unsafe { open_device(&instance) } {
            Ok((physical_device, capabilities, queue_family, device)) => {
                tracing::info!("Selected GPU: {}", capabilities.summary());
                // SAFETY: The queue was requested at device creation
                let queue = unsafe { device.get_device_queue(queue_family, 0) };
                let device = Arc::new(device);
                // SAFETY: All handles are valid
                let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device)? };
                Ok(GpuContext {
                    entry,
                    instance,
                    physical_device,
                    device,
                    capabilities,
                    allocator: Mutex::new(allocator),
                    queue_family,
                    queue,
                })
            }
            Err(e) => {
                // SAFETY: Nothing else was created from the instance
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }
}

/// Pick a device, check it and create the logical device on its first
/// graphics family.
unsafe fn open_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, GpuCapabilities, u32, ash::Device)> {
    let physical_device = select_physical_device(instance)?;

    let capabilities = GpuCapabilities::query(instance, physical_device);
    if !capabilities.meets_requirements() {
        tracing::error!(
            "{} lacks: {}",
            capabilities.device_name,
            capabilities.missing_requirements().join(", ")
        );
        return Err(GpuError::NoSuitableDevice);
    }

    let queue_family = instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .ok_or(GpuError::NoSuitableDevice)? as u32;

    let priorities = [1.0_f32];
    let queues = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&priorities)];
    let extensions = [ash::khr::swapchain::NAME.as_ptr()];
    let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queues)
        .enabled_extension_names(&extensions)
        .push_next(&mut vulkan13);

    let device = instance.create_device(physical_device, &create_info, None)?;
    Ok((physical_device, capabilities, queue_family, device))
}
