//! Swapchain images the lighting pass renders into directly.

use crate::error::{GpuError, Result};
use crate::memory::create_image_view;
use ash::vk;

/// Choices made from the surface's support before creating a swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainDesc {
    /// Prefer sRGB BGRA8, FIFO when `vsync`, and one image above the minimum.
    pub fn choose(
        surface: vk::SurfaceKHR,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        size: (u32, u32),
        vsync: bool,
    ) -> Result<Self> {
        Ok(Self {
            surface,
            format: select_surface_format(formats)?,
            present_mode: select_present_mode(present_modes, vsync),
            extent: calculate_extent(capabilities, size.0, size.1),
            min_image_count: desired_image_count(capabilities),
            transform: capabilities.current_transform,
        })
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// # Safety
    /// `old_swapchain` must be null or a swapchain of the same surface.
    pub unsafe fn new(
        device: &ash::Device,
        loader: &ash::khr::swapchain::Device,
        desc: &SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut this = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: desc.format.format,
            extent: desc.extent,
        };
        if let Err(e) = this.create_views(device, loader) {
            this.destroy(device, loader);
            return Err(e);
        }

        tracing::debug!(
            "Swapchain {}x{}: {} images, {:?}, {:?}",
            desc.extent.width,
            desc.extent.height,
            this.images.len(),
            desc.format.format,
            desc.present_mode
        );
        Ok(this)
    }

    unsafe fn create_views(&mut self, device: &ash::Device, loader: &ash::khr::swapchain::Device) -> Result<()> {
        self.images = loader.get_swapchain_images(self.swapchain)?;
        for &image in &self.images {
            self.image_views.push(create_image_view(
                device,
                image,
                self.format,
                vk::ImageViewType::TYPE_2D,
                vk::ImageAspectFlags::COLOR,
            )?);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns the image index and whether the swapchain is suboptimal.
    /// An out-of-date swapchain comes back as
    /// `GpuError::Vulkan(ERROR_OUT_OF_DATE_KHR)` with no image acquired.
    ///
    /// # Safety
    /// `semaphore` must be unsignalled with no pending signal.
    pub unsafe fn acquire_next_image(
        &self,
        loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool)> {
        Ok(loader.acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())?)
    }

    /// Queue `image_index` for presentation. Returns `true` when the
    /// swapchain is out of date or suboptimal and should be rebuilt.
    ///
    /// # Safety
    /// The image must have been acquired and transitioned to
    /// `PRESENT_SRC_KHR` by work that signals `wait_semaphores`.
    pub unsafe fn present(
        &self,
        loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match loader.queue_present(queue, &info) {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// # Safety
    /// No pending work may use the images.
    pub unsafe fn destroy(&self, device: &ash::Device, loader: &ash::khr::swapchain::Device) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        loader.destroy_swapchain(self.swapchain, None);
    }
}

fn desired_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}

pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    let preferred = available.iter().find(|candidate| {
        candidate.format == vk::Format::B8G8R8A8_SRGB
            && candidate.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    preferred
        .or(available.first())
        .copied()
        .ok_or_else(|| GpuError::UnsupportedFormat("surface reports no formats".to_string()))
}

/// FIFO with vsync, otherwise the first of MAILBOX and IMMEDIATE the surface
/// offers. FIFO is always available.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    let uncapped = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
    uncapped
        .into_iter()
        .filter(|_| !vsync)
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's fixed extent, or the window size clamped to its limits when
/// the surface leaves it to the swapchain (`u32::MAX`).
pub fn calculate_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: width.clamp(min.width, max.width),
        height: height.clamp(min.height, max.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn flexible_surface() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            min_image_count: 2,
            ..Default::default()
        }
    }

    #[test]
    fn srgb_bgra_wins_over_earlier_formats() {
        let formats = [srgb(vk::Format::R8G8B8A8_UNORM), srgb(vk::Format::B8G8R8A8_SRGB)];
        assert_eq!(select_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [srgb(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(select_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(matches!(select_surface_format(&[]), Err(GpuError::UnsupportedFormat(_))));
    }

    #[test]
    fn vsync_forces_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(select_present_mode(&[vk::PresentModeKHR::FIFO], false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn flexible_extent_is_clamped() {
        let extent = calculate_extent(&flexible_surface(), 4096, 0);
        assert_eq!((extent.width, extent.height), (1024, 1));
    }

    #[test]
    fn fixed_extent_wins() {
        let mut caps = flexible_surface();
        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        let extent = calculate_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn image_count_is_one_above_minimum_within_maximum() {
        let mut caps = flexible_surface();
        assert_eq!(desired_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(desired_image_count(&caps), 2);
    }

    #[test]
    fn desc_combines_choices() {
        let desc = SwapchainDesc::choose(
            vk::SurfaceKHR::null(),
            &flexible_surface(),
            &[srgb(vk::Format::B8G8R8A8_SRGB)],
            &[vk::PresentModeKHR::MAILBOX],
            (640, 480),
            false,
        )
        .unwrap();
        assert_eq!(desc.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((desc.extent.width, desc.extent.height), (640, 480));
        assert_eq!(desc.min_image_count, 3);
    }
}
