//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

const ENGINE_NAME: &CStr = c"Volren";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance extensions needed to present to a window on this platform.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ]
}

/// Create a Vulkan 1.3 instance.
///
/// A missing validation layer is logged and skipped rather than failing.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let extension_names: Vec<*const i8> = required_instance_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let mut layer_names: Vec<*const i8> = Vec::new();
    if enable_validation {
        let available = entry.enumerate_instance_layer_properties()?;
        let found = available
            .iter()
            .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == VALIDATION_LAYER);
        if found {
            tracing::debug!("Enabling {:?}", VALIDATION_LAYER);
            layer_names.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!("Validation layer {:?} not available", VALIDATION_LAYER);
        }
    }

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    Ok(entry.create_instance(&create_info, None)?)
}

/// Select the highest scoring physical device that supports Vulkan 1.3.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    instance
        .enumerate_physical_devices()?
        .into_iter()
        .filter_map(|device| {
            let properties = instance.get_physical_device_properties(device);
            let vram_mb = device_local_memory_mb(instance, device);
            score_device(properties.api_version, properties.device_type, vram_mb)
                .map(|score| (score, device))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

unsafe fn device_local_memory_mb(instance: &ash::Instance, device: vk::PhysicalDevice) -> u64 {
    let memory = instance.get_physical_device_memory_properties(device);
    memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024))
        .sum()
}

/// Score a device, or `None` when it cannot run Vulkan 1.3.
fn score_device(api_version: u32, device_type: vk::PhysicalDeviceType, vram_mb: u64) -> Option<u64> {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    if major < 1 || (major == 1 && minor < 3) {
        return None;
    }

    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 1,
    };

    // +1 per GB of device-local memory
    Some(type_score + vram_mb / 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pre_1_3_devices() {
        assert_eq!(
            score_device(vk::API_VERSION_1_2, vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
            None
        );
    }

    #[test]
    fn prefers_discrete_gpus() {
        let discrete =
            score_device(vk::API_VERSION_1_3, vk::PhysicalDeviceType::DISCRETE_GPU, 2048);
        let integrated =
            score_device(vk::API_VERSION_1_3, vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        assert!(discrete > integrated);
    }

    #[test]
    fn cpu_devices_still_qualify() {
        assert_eq!(
            score_device(vk::API_VERSION_1_3, vk::PhysicalDeviceType::CPU, 0),
            Some(1)
        );
    }
}
