//! Presentation surface of a window.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{Swapchain, SwapchainDesc};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A window surface the graphics queue can present to, with the loaders for
/// the surface and swapchain extensions.
pub struct SurfaceContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
}

/// What the surface supports on the selected device.
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceContext {
    /// Fails with [`GpuError::SurfaceCreation`] when the graphics queue
    /// cannot present to the window.
    ///
    /// # Safety
    /// The window handles must stay valid for the surface's lifetime.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let handle_error = |e: raw_window_handle::HandleError| GpuError::SurfaceCreation(e.to_string());
        let display = window.display_handle().map_err(handle_error)?;
        let window = window.window_handle().map_err(handle_error)?;

        let surface = ash_window::create_surface(
            gpu.entry(),
            gpu.instance(),
            display.as_raw(),
            window.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());

        let presentable = surface_loader
            .get_physical_device_surface_support(gpu.physical_device(), gpu.graphics_queue_family(), surface);
        if presentable != Ok(true) {
            surface_loader.destroy_surface(surface, None);
            return Err(match presentable {
                Err(e) => e.into(),
                _ => GpuError::SurfaceCreation(format!(
                    "queue family {} cannot present",
                    gpu.graphics_queue_family()
                )),
            });
        }

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader: ash::khr::swapchain::Device::new(gpu.instance(), gpu.device()),
        })
    }

    pub fn support(&self, gpu: &GpuContext) -> Result<SurfaceSupport> {
        let device = gpu.physical_device();
        let loader = &self.surface_loader;
        // SAFETY: The surface was created on this instance
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader.get_physical_device_surface_capabilities(device, self.surface)?,
                formats: loader.get_physical_device_surface_formats(device, self.surface)?,
                present_modes: loader.get_physical_device_surface_present_modes(device, self.surface)?,
            })
        }
    }

    /// # Safety
    /// `old_swapchain`, when given, must belong to this surface.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let support = self.support(gpu)?;
        let desc = SwapchainDesc::choose(
            self.surface,
            &support.capabilities,
            &support.formats,
            &support.present_modes,
            (width, height),
            vsync,
        )?;
        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            &desc,
            old_swapchain.unwrap_or_default(),
        )
    }

    /// Build a replacement for `old`, then destroy `old`. On failure `old` is
    /// left for the caller to destroy.
    ///
    /// # Safety
    /// `old` must not be in use.
    pub unsafe fn recreate_swapchain(
        &self,
        gpu: &GpuContext,
        old: &mut Swapchain,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Swapchain> {
        let replacement = self.create_swapchain(gpu, width, height, vsync, Some(old.swapchain))?;
        old.destroy(gpu.device(), &self.swapchain_loader);
        Ok(replacement)
    }

    /// # Safety
    /// Every swapchain of the surface must already be destroyed.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}
