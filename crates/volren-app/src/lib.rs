//! Application framework for the volume rendering samples.
//!
//! The runner owns the window, GPU context, swapchain and frames in flight;
//! a [`Sample`] only prepares its resources and records each frame.
//!
//! # Example
//!
//! ```no_run
//! use volren_app::{run_app, AppConfig, AppContext, FrameContext, Sample};
//!
//! struct Blank;
//!
//! impl Sample for Blank {
//!     fn prepare(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Blank)
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Blank>(AppConfig::new("Blank"))
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::Sample;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{init_logging, run_app, AppConfig};

pub use volren_gpu::{GpuContext, GpuContextBuilder};
pub use volren_render::Camera;
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
