//! `Sample` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// A windowed rendering sample.
///
/// The runner creates the window, GPU context and swapchain, then drives the
/// sample through these hooks. Acquiring, submitting and presenting are
/// handled by the runner.
pub trait Sample: Sized {
    /// Create every resource the sample needs: render targets, pipelines and
    /// any uploads. Called once after the swapchain exists.
    fn prepare(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance state by `dt` seconds. Called every frame before `render`.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record the frame into `frame.command_buffer`.
    ///
    /// The sample must leave `frame.swapchain_image` in `PRESENT_SRC_KHR`.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// The swapchain was recreated. The GPU is idle, so size-dependent
    /// resources can be rebuilt here.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return `true` to stop the runner from handling `event`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Raw device input, used for mouse look.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Release GPU resources. The device is idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
