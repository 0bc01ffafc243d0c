//! Window, device and swapchain state shared with the sample.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use volren_gpu::sync::{create_fence, create_semaphore};
use volren_gpu::{CommandPool, GpuContext, Result as GpuResult, SurfaceContext, Swapchain};
use winit::window::Window;

/// Everything a [`crate::Sample`] needs to create and draw GPU resources.
pub struct AppContext {
    pub window: Arc<Window>,
    pub gpu: GpuContext,
    pub surface: SurfaceContext,
    pub swapchain: Swapchain,
    /// Resettable pool; per-frame command buffers and one-shot uploads both
    /// come from it.
    pub command_pool: CommandPool,
    pub(crate) slots: Vec<FrameSlot>,
    /// Indexed by swapchain image, not by frame slot.
    pub(crate) present_semaphores: Vec<vk::Semaphore>,
    pub(crate) slot_index: usize,
    pub frame_count: u64,
    pub(crate) last_frame_time: Instant,
    pub vsync: bool,
}

/// Resources owned by one frame in flight.
pub(crate) struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// The fence starts signalled so the first wait on the slot passes.
    unsafe fn new(device: &ash::Device, pool: &CommandPool) -> GpuResult<Self> {
        Ok(Self {
            image_available: create_semaphore(device)?,
            in_flight: create_fence(device, true)?,
            command_buffer: pool.allocate_primary(device)?,
        })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_fence(self.in_flight, None);
    }
}

unsafe fn create_semaphores(device: &ash::Device, count: usize) -> GpuResult<Vec<vk::Semaphore>> {
    (0..count).map(|_| create_semaphore(device)).collect()
}

unsafe fn destroy_semaphores(device: &ash::Device, semaphores: &mut Vec<vk::Semaphore>) {
    for semaphore in semaphores.drain(..) {
        device.destroy_semaphore(semaphore, None);
    }
}

impl AppContext {
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let surface = SurfaceContext::from_window(&gpu, window.as_ref())?;

        let size = window.inner_size();
        let swapchain =
            surface.create_swapchain(&gpu, size.width.max(1), size.height.max(1), vsync, None)?;
        tracing::info!(
            "Swapchain {}x{} with {} images ({:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count(),
            swapchain.format
        );

        let device = gpu.device();
        let command_pool = CommandPool::new(
            device,
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let slots = (0..swapchain.image_count())
            .map(|_| FrameSlot::new(device, &command_pool))
            .collect::<GpuResult<Vec<_>>>()?;
        let present_semaphores = create_semaphores(device, swapchain.image_count())?;

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            command_pool,
            slots,
            present_semaphores,
            slot_index: 0,
            frame_count: 0,
            last_frame_time: Instant::now(),
            vsync,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    pub fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32
    }

    /// Rebuild the swapchain at the given size.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn recreate_swapchain(
        &mut self,
        width: u32,
        height: u32,
    ) -> anyhow::Result<()> {
        self.swapchain =
            self.surface
                .recreate_swapchain(&self.gpu, &mut self.swapchain, width, height, self.vsync)?;

        let count = self.swapchain.image_count();
        if self.present_semaphores.len() != count {
            let device = self.gpu.device();
            destroy_semaphores(device, &mut self.present_semaphores);
            self.present_semaphores = create_semaphores(device, count)?;
        }

        tracing::info!(
            "Swapchain recreated at {}x{} ({} images)",
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            count
        );
        Ok(())
    }

    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn cleanup(&mut self) {
        let device = self.gpu.device();
        for slot in self.slots.drain(..) {
            slot.destroy(device);
        }
        destroy_semaphores(device, &mut self.present_semaphores);
        self.command_pool.destroy(device);
        self.swapchain.destroy(device, &self.surface.swapchain_loader);
        self.surface.destroy();
    }
}
