//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use volren_gpu::command::{begin_command_buffer, end_command_buffer, submit, SemaphoreWait};
use volren_gpu::memory::full_subresource_range;
use volren_gpu::sync::{reset_fence, wait_for_fence};
use volren_gpu::{GpuContextBuilder, GpuError};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::Sample;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Window and device settings for [`run_app`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate cap, `None` for unlimited.
    pub target_fps: Option<u32>,
    pub vsync: bool,
    /// Vulkan validation layers, on by default in debug builds.
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Volume Render".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Install the global `tracing` subscriber, honouring `RUST_LOG` and
/// defaulting to `info`. Does nothing if a subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Run a sample until its window is closed.
pub fn run_app<S: Sample + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = Runner::<S> {
        config,
        state: None,
        init_error: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.init_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct Runner<S: Sample> {
    config: AppConfig,
    state: Option<Running<S>>,
    init_error: Option<anyhow::Error>,
}

struct Running<S: Sample> {
    ctx: AppContext,
    sample: S,
    target_frame_time: Option<Duration>,
    stats: FrameStats,
    /// Set when the window is minimized; rendering pauses until it is restored.
    minimized: bool,
}

impl<S: Sample + 'static> ApplicationHandler for Runner<S> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Sample ready");
            }
            Err(e) => {
                error!("Failed to initialize sample: {e:#}");
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.sample.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e:#}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.sample.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
    }
}

impl<S: Sample + 'static> Runner<S> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Running<S>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: The window was just created and outlives the context
        let mut ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };

        let sample = match S::prepare(&mut ctx) {
            Ok(sample) => sample,
            Err(e) => {
                // SAFETY: Nothing has been submitted yet
                unsafe { ctx.cleanup() };
                return Err(e);
            }
        };

        Ok(Running {
            ctx,
            sample,
            target_frame_time: self.config.target_frame_time(),
            stats: FrameStats::default(),
            minimized: false,
        })
    }
}

impl<S: Sample> Running<S> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        if self.minimized {
            return Ok(());
        }

        let frame_start = Instant::now();
        let dt = frame_start.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = frame_start;
        self.stats.record(dt);

        self.sample.update(&self.ctx, dt);

        let slot_index = self.ctx.slot_index;
        let slot = &self.ctx.slots[slot_index];
        let (image_available, in_flight, command_buffer) =
            (slot.image_available, slot.in_flight, slot.command_buffer);
        let device = self.ctx.gpu.device();
        let queue = self.ctx.gpu.graphics_queue();

        // SAFETY: The slot's fence and semaphore belong to this device and
        // swapchain
        let acquired = unsafe {
            wait_for_fence(device, in_flight, u64::MAX)?;
            self.ctx.swapchain.acquire_next_image(
                &self.ctx.surface.swapchain_loader,
                image_available,
                u64::MAX,
            )
        };
        let image_index = match acquired {
            Ok((image_index, _suboptimal)) => image_index,
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                // Nothing was submitted, so the fence is still signalled
                let size = self.ctx.window.inner_size();
                return self.handle_resize(size.width, size.height);
            }
            Err(e) => return Err(e.into()),
        };

        // SAFETY: The fence wait above guarantees the command buffer is idle
        unsafe {
            reset_fence(device, in_flight)?;
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }

        let mut frame = FrameContext {
            command_buffer,
            image_index,
            swapchain_image: self.ctx.swapchain.images[image_index as usize],
            dt,
            frame_number: self.ctx.frame_count,
            frame_index: slot_index,
        };
        let recorded = self.sample.render(&self.ctx, &mut frame);

        let acquire_wait = SemaphoreWait {
            semaphore: image_available,
            stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        };
        let render_finished = self.ctx.present_semaphores[image_index as usize];

        if let Err(e) = recorded {
            // The acquired image still has to go back to the swapchain, or
            // every later acquire eventually blocks
            // SAFETY: The command buffer is not pending and the semaphores
            // belong to this frame
            unsafe {
                device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
                begin_command_buffer(device, command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
                let barriers = [discard_barrier(frame.swapchain_image)];
                device.cmd_pipeline_barrier2(
                    command_buffer,
                    &vk::DependencyInfo::default().image_memory_barriers(&barriers),
                );
                end_command_buffer(device, command_buffer)?;
                submit(
                    device,
                    queue,
                    &[command_buffer],
                    &[acquire_wait],
                    &[render_finished],
                    in_flight,
                )?;
                if let Err(present_error) = self.ctx.swapchain.present(
                    &self.ctx.surface.swapchain_loader,
                    queue,
                    image_index,
                    &[render_finished],
                ) {
                    warn!("Failed to present after a failed frame: {present_error}");
                }
            }
            self.ctx.slot_index = (slot_index + 1) % self.ctx.slots.len();
            return Err(e);
        }

        // SAFETY: The command buffer is recording on this device
        unsafe { end_command_buffer(device, command_buffer)? };

        // SAFETY: The command buffer was fully recorded above
        let needs_recreate = unsafe {
            submit(
                device,
                queue,
                &[command_buffer],
                &[acquire_wait],
                &[render_finished],
                in_flight,
            )?;
            self.ctx.swapchain.present(
                &self.ctx.surface.swapchain_loader,
                queue,
                image_index,
                &[render_finished],
            )?
        };

        self.ctx.slot_index = (slot_index + 1) % self.ctx.slots.len();
        self.ctx.frame_count += 1;

        if needs_recreate {
            let size = self.ctx.window.inner_size();
            self.handle_resize(size.width, size.height)?;
        }

        if let Some(remaining) = self
            .target_frame_time
            .and_then(|target| target.checked_sub(frame_start.elapsed()))
        {
            thread::sleep(remaining);
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;

        self.ctx.gpu.wait_idle()?;
        // SAFETY: The device is idle
        unsafe { self.ctx.recreate_swapchain(width, height)? };

        let extent = self.ctx.extent();
        self.sample
            .on_resize(&mut self.ctx, extent.width, extent.height)?;

        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(summary) = self.stats.summary() {
            info!("{summary}");
        }

        if let Err(e) = self.ctx.gpu.wait_idle() {
            warn!("Failed to wait idle: {e}");
        }

        self.sample.cleanup(&mut self.ctx);

        // SAFETY: The device is idle
        unsafe {
            self.ctx.cleanup();
        }

        info!("Cleanup complete");
    }
}

/// Frame rate extremes and mean over a run.
#[derive(Debug, Default)]
struct FrameStats {
    frames: u64,
    min_fps: Option<f64>,
    max_fps: f64,
    total_seconds: f64,
}

impl FrameStats {
    fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.frames += 1;
        self.min_fps = Some(self.min_fps.map_or(fps, |min| min.min(fps)));
        self.max_fps = self.max_fps.max(fps);
        self.total_seconds += f64::from(dt);
    }

    /// Mean over wall time, so long frames weigh more than in a plain mean of
    /// per-frame rates.
    fn average_fps(&self) -> Option<f64> {
        (self.total_seconds > 0.0).then(|| self.frames as f64 / self.total_seconds)
    }

    fn summary(&self) -> Option<String> {
        let (min, avg) = (self.min_fps?, self.average_fps()?);
        Some(format!(
            "{} frames, fps min {min:.1} / avg {avg:.1} / max {:.1}",
            self.frames, self.max_fps
        ))
    }
}

/// Transition for a swapchain image whose frame failed to record. The
/// contents are undefined but the image is presentable.
fn discard_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(vk::PipelineStageFlags2::NONE)
        .dst_access_mask(vk::AccessFlags2::NONE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .image(image)
        .subresource_range(full_subresource_range(vk::ImageAspectFlags::COLOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn failed_frame_image_becomes_presentable() {
        use ash::vk::Handle;

        let image = vk::Image::from_raw(0x42);
        let barrier = discard_barrier(image);
        assert_eq!(barrier.image, image);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        // Must sit behind the acquire semaphore wait
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.layer_count, 1);
    }

    #[test]
    fn stats_ignore_zero_length_frames() {
        let mut stats = FrameStats::default();
        stats.record(0.0);
        assert!(stats.summary().is_none());
    }

    #[test]
    fn stats_track_extremes_and_wall_time_mean() {
        let mut stats = FrameStats::default();
        stats.record(0.01);
        stats.record(0.03);
        assert_relative_eq!(stats.min_fps.unwrap(), 1.0 / 0.03, epsilon = 1e-3);
        assert_relative_eq!(stats.max_fps, 100.0, epsilon = 1e-3);
        assert_relative_eq!(stats.average_fps().unwrap(), 50.0, epsilon = 1e-3);
        assert!(stats.summary().unwrap().starts_with("2 frames"));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = AppConfig::new("Volume")
            .with_size(640, 480)
            .with_vsync(true)
            .with_validation(false)
            .with_target_fps(60);
        assert_eq!(config.title, "Volume");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.target_fps, Some(60));
    }

    #[test]
    fn frame_time_from_target_fps() {
        let config = AppConfig::default().with_target_fps(50);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
        assert_eq!(AppConfig::default().target_frame_time(), None);
        assert_eq!(AppConfig::default().with_target_fps(0).target_frame_time(), None);
    }
}
