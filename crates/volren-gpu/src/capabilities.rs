//! What the selected device can do, and whether that is enough.

use ash::vk;
use std::ffi::CStr;
use std::fmt;

/// Largest push constant block of any pass (the geometry constants).
pub const REQUIRED_PUSH_CONSTANT_BYTES: u32 = 128;

/// Colour attachments written by the front ray-direction pass.
pub const REQUIRED_COLOR_ATTACHMENTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Other(u32),
}

impl GpuVendor {
    /// From the PCI vendor ID in the device properties.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,
    pub supports_swapchain: bool,
    /// Sum of device-local heaps.
    pub device_local_memory_mb: u64,
    /// Bounds the volume texture edge length.
    pub max_image_dimension_3d: u32,
    pub max_push_constants_size: u32,
    pub max_color_attachments: u32,
}

impl GpuCapabilities {
    /// # Safety
    /// The physical device must come from `instance`.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory = instance.get_physical_device_memory_properties(physical_device);
        let limits = properties.limits;

        let supports_swapchain = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));

        let heaps = &memory.memory_heaps[..memory.memory_heap_count as usize];
        let device_local_memory_mb = heaps
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size >> 20)
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned(),
            api_version: properties.api_version,
            supports_swapchain,
            device_local_memory_mb,
            max_image_dimension_3d: limits.max_image_dimension3_d,
            max_push_constants_size: limits.max_push_constants_size,
            max_color_attachments: limits.max_color_attachments,
        }
    }

    /// Requirements this device fails, empty when it can run the renderer.
    ///
    /// Vulkan 1.3 brings dynamic rendering and synchronization2 as core
    /// features.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let checks = [
            (
                vk::api_version_major(self.api_version) > 1
                    || vk::api_version_minor(self.api_version) >= 3,
                "Vulkan 1.3",
            ),
            (self.supports_swapchain, "VK_KHR_swapchain"),
            (
                self.max_push_constants_size >= REQUIRED_PUSH_CONSTANT_BYTES,
                "128 bytes of push constants",
            ),
            (
                self.max_color_attachments >= REQUIRED_COLOR_ATTACHMENTS,
                "2 colour attachments",
            ),
        ];
        checks
            .into_iter()
            .filter_map(|(met, name)| (!met).then_some(name))
            .collect()
    }

    pub fn meets_requirements(&self) -> bool {
        self.missing_requirements().is_empty()
    }

    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GpuCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}), Vulkan {}.{}.{}, {} MB device-local, 3D images up to {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.max_image_dimension_3d
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: u32) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "Test GPU".to_string(),
            api_version,
            supports_swapchain: true,
            device_local_memory_mb: 512,
            max_image_dimension_3d: 2048,
            max_push_constants_size: 128,
            max_color_attachments: 8,
        }
    }

    #[test]
    fn vendor_from_pci_id() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn vulkan_1_2_is_not_enough() {
        assert!(caps(vk::API_VERSION_1_3).meets_requirements());
        assert_eq!(caps(vk::API_VERSION_1_2).missing_requirements(), ["Vulkan 1.3"]);
    }

    #[test]
    fn lists_every_missing_requirement() {
        let mut caps = caps(vk::API_VERSION_1_3);
        caps.supports_swapchain = false;
        caps.max_push_constants_size = 64;
        assert_eq!(
            caps.missing_requirements(),
            ["VK_KHR_swapchain", "128 bytes of push constants"]
        );
    }

    #[test]
    fn summary_names_device_and_version() {
        let summary = caps(vk::API_VERSION_1_3).summary();
        assert!(summary.starts_with("Test GPU (Amd), Vulkan 1.3.0"));
    }
}
