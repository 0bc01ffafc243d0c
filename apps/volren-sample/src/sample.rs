//! The ray-direction volume rendering sample.

use anyhow::anyhow;
use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::{error, info, warn};

use volren_app::{AppContext, Camera, DeviceEvent, DeviceId, FrameContext, Sample, WindowEvent};
use volren_gpu::format::suitable_depth_format;
use volren_gpu::memory::GpuAllocator;
use volren_gpu::sampler::{create_sampler, SamplerFilter};
use volren_gpu::Result as GpuResult;
use volren_render::{
    check_extent_limit, create_render_target, DebugMode, DrawContext, FaceDirection, FrameParams, GBufferFormats,
    GeometryPushConstants, LightingPushConstants, LightingSubpass, ProxyCube, ProxyGeometry,
    RayDirSubpass, RenderPipeline, RenderTarget, Subpass, VolumeDescriptor, VolumeTexture,
    VolumeUpload,
};
use volren_volume::VolumeData;

use crate::controls::CameraControls;
use crate::params::SampleParams;

/// World-space edge length of the proxy cube.
const CUBE_SCALE: f32 = 4.0;

/// Albedo written by the front pass.
const PROXY_TINT: Vec4 = Vec4::new(1.0, 0.85, 0.6, 1.0);

/// Renders the generated volume through a proxy cube.
pub struct VolumeRender {
    params: SampleParams,
    camera: Camera,
    controls: CameraControls,
    debug_mode: DebugMode,
    model: Mat4,
    formats: GBufferFormats,
    proxy: ProxyCube,
    targets: Vec<RenderTarget>,
    pipeline: RenderPipeline,
    volume_descriptor: VolumeDescriptor,
    volume_sampler: vk::Sampler,
    /// In-flight upload; `None` once the texture is resident.
    upload: Option<VolumeUpload>,
    volume: Option<VolumeTexture>,
}

impl Sample for VolumeRender {
    fn prepare(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let params = SampleParams::from_args()?;
        info!("Sample parameters: {params:?}");

        let extent = params.extent();
        // Reject sizes the device cannot hold before allocating the voxels
        check_extent_limit(extent.max_dimension(), ctx.gpu.capabilities().max_image_dimension_3d)?;
        let pattern = params.pattern.build(extent, params.half_width);
        let volume = VolumeData::generate(extent, &*pattern)?;
        info!(
            "Generated {:?} volume {}x{}x{} ({} bytes)",
            params.pattern,
            extent.width,
            extent.height,
            extent.depth,
            volume.byte_len()
        );

        let formats = GBufferFormats {
            swapchain: ctx.swapchain.format,
            depth: suitable_depth_format(&ctx.gpu)?,
        };
        info!("Depth format: {:?}", formats.depth);

        let device = ctx.gpu.device();
        let proxy = ProxyCube::upload(&mut ctx.gpu.allocator().lock())?;

        // SAFETY: The device is valid and nothing has been submitted yet
        let (volume_descriptor, volume_sampler, mut pipeline, targets) = unsafe {
            let volume_descriptor = VolumeDescriptor::new(device)?;
            let volume_sampler = create_sampler(device, SamplerFilter::Linear)?;
            let pipeline = build_pipeline(
                device,
                &formats,
                proxy.geometry(),
                volume_descriptor.layout(),
                params.lighting,
            )?;
            let targets = create_targets(ctx, formats)?;
            (volume_descriptor, volume_sampler, pipeline, targets)
        };

        // SAFETY: The targets were just created and are not in use
        let upload = unsafe {
            pipeline.prepare_targets(device, &targets)?;
            VolumeTexture::begin_upload(&ctx.gpu, &ctx.command_pool, &volume)?
        };

        let mut camera = Camera::looking_at_origin(ctx.aspect_ratio());
        camera.set_viewport(ctx.width(), ctx.height());

        info!("Controls: WASD/QE move, right mouse look, Shift sprint, F3 debug view, R reset");

        Ok(Self {
            params,
            camera,
            controls: CameraControls::new(),
            debug_mode: DebugMode::None,
            model: Mat4::from_scale(Vec3::splat(CUBE_SCALE)),
            formats,
            proxy,
            targets,
            pipeline,
            volume_descriptor,
            volume_sampler,
            upload: Some(upload),
            volume: None,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        let requests = self.controls.take_requests();
        if requests.cycle_debug_mode {
            self.debug_mode = self.debug_mode.next();
            info!("Debug mode: {:?}", self.debug_mode);
            if !self.params.lighting {
                warn!("Debug views are drawn by the lighting pass, which is disabled");
            }
        }
        if requests.reset_camera {
            self.camera = Camera::looking_at_origin(ctx.aspect_ratio());
        }
        self.controls.apply(&mut self.camera, dt);

        if let Err(e) = self.poll_upload(ctx) {
            error!("Volume upload failed: {e:#}");
        }
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let index = frame.image_index as usize;
        let target = self
            .targets
            .get(index)
            .ok_or_else(|| anyhow!("No render target for swapchain image {index}"))?;

        let params = FrameParams {
            geometry: GeometryPushConstants::new(&self.camera, self.model, PROXY_TINT),
            lighting: LightingPushConstants::new(&self.params.composite, self.debug_mode),
            volume_set: self.volume_descriptor.set(),
        };
        let draw_ctx = DrawContext {
            target_index: index,
            extent: target.extent,
            params: &params,
        };

        // SAFETY: The runner began the command buffer and this image's
        // previous frame has completed
        unsafe {
            self.pipeline
                .draw(ctx.gpu.device(), frame.command_buffer, target, &draw_ctx)?;
        }
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        self.camera.set_viewport(width, height);

        let device = ctx.gpu.device();
        // SAFETY: The runner waited for the device to go idle
        unsafe {
            destroy_targets(device, &mut ctx.gpu.allocator().lock(), &mut self.targets);

            if ctx.swapchain.format != self.formats.swapchain {
                info!(
                    "Swapchain format changed to {:?}, rebuilding pipeline",
                    ctx.swapchain.format
                );
                let formats = GBufferFormats {
                    swapchain: ctx.swapchain.format,
                    ..self.formats
                };
                replace_built(
                    &mut self.pipeline,
                    || {
                        build_pipeline(
                            device,
                            &formats,
                            self.proxy.geometry(),
                            self.volume_descriptor.layout(),
                            self.params.lighting,
                        )
                    },
                    |mut old| old.destroy(device),
                )?;
                self.formats = formats;
            }

            self.targets = create_targets(ctx, self.formats)?;
            self.pipeline.prepare_targets(device, &self.targets)?;
        }
        Ok(())
    }

    fn on_event(&mut self, event: &WindowEvent) -> bool {
        self.controls.handle_window_event(event)
    }

    fn on_device_event(&mut self, _device_id: DeviceId, event: &DeviceEvent) {
        self.controls.handle_device_event(event);
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let device = ctx.gpu.device();

        // SAFETY: The runner waited for the device to go idle
        unsafe {
            if let Some(mut upload) = self.upload.take() {
                if let Err(e) = upload.destroy(&ctx.gpu) {
                    error!("Failed to destroy volume upload: {e}");
                }
            }

            self.pipeline.destroy(device);

            let mut allocator = ctx.gpu.allocator().lock();
            destroy_targets(device, &mut allocator, &mut self.targets);

            if let Some(mut volume) = self.volume.take() {
                if let Err(e) = volume.destroy(device, &mut allocator) {
                    error!("Failed to destroy volume texture: {e}");
                }
            }
            if let Err(e) = self.proxy.destroy(&mut allocator) {
                error!("Failed to destroy proxy cube: {e}");
            }

            self.volume_descriptor.destroy(device);
            device.destroy_sampler(self.volume_sampler, None);
        }
    }
}

impl VolumeRender {
    /// Poll the upload and bind the texture once it completes.
    fn poll_upload(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        let Some(upload) = self.upload.as_mut() else {
            return Ok(());
        };

        let device = ctx.gpu.device();
        // SAFETY: The upload was submitted on this device
        let phase = unsafe { upload.poll(device)? };
        if !phase.is_resident() {
            return Ok(());
        }

        let texture = {
            let mut allocator = ctx.gpu.allocator().lock();
            // SAFETY: The fence has signalled
            unsafe { upload.finish(device, &mut allocator)? }
        };
        self.upload = None;

        let texture = self.volume.insert(texture);
        // SAFETY: The set is not referenced by any submitted frame yet
        unsafe {
            self.volume_descriptor
                .bind(device, texture, self.volume_sampler)?;
        }

        let extent = texture.extent();
        info!(
            "Volume resident ({}x{}x{}), compositing enabled",
            extent.width, extent.height, extent.depth
        );
        Ok(())
    }
}

/// Back and front ray-direction passes, then lighting when enabled.
///
/// # Safety
/// The device must be valid and `geometry` must outlive the pipeline.
unsafe fn build_pipeline(
    device: &ash::Device,
    formats: &GBufferFormats,
    geometry: ProxyGeometry,
    volume_layout: vk::DescriptorSetLayout,
    lighting: bool,
) -> GpuResult<RenderPipeline> {
    let mut subpasses: Vec<Box<dyn Subpass>> = vec![
        Box::new(RayDirSubpass::new(device, FaceDirection::Back, geometry, formats)?),
        Box::new(RayDirSubpass::new(device, FaceDirection::Front, geometry, formats)?),
    ];
    if lighting {
        subpasses.push(Box::new(LightingSubpass::new(device, formats, volume_layout)?));
    }
    RenderPipeline::new(subpasses, formats)
}

/// Build a replacement for `current` and retire the old value only once the
/// build succeeded. On failure `current` is left untouched.
fn replace_built<T, E>(
    current: &mut T,
    build: impl FnOnce() -> Result<T, E>,
    retire: impl FnOnce(T),
) -> Result<(), E> {
    let fresh = build()?;
    retire(std::mem::replace(current, fresh));
    Ok(())
}

/// One render target per swapchain image.
///
/// # Safety
/// The swapchain images must not be in use.
unsafe fn create_targets(
    ctx: &AppContext,
    formats: GBufferFormats,
) -> GpuResult<Vec<RenderTarget>> {
    let device = ctx.gpu.device();
    let mut allocator = ctx.gpu.allocator().lock();
    let mut targets = Vec::with_capacity(ctx.swapchain.image_count());

    for (&image, &view) in ctx.swapchain.images.iter().zip(&ctx.swapchain.image_views) {
        match create_render_target(device, &mut allocator, image, view, ctx.extent(), formats) {
            Ok(target) => targets.push(target),
            Err(e) => {
                destroy_targets(device, &mut allocator, &mut targets);
                return Err(e);
            }
        }
    }

    tracing::debug!(
        "Created {} render targets at {}x{}",
        targets.len(),
        ctx.width(),
        ctx.height()
    );
    Ok(targets)
}

/// # Safety
/// The targets must not be in use.
unsafe fn destroy_targets(
    device: &ash::Device,
    allocator: &mut GpuAllocator,
    targets: &mut Vec<RenderTarget>,
) {
    for mut target in targets.drain(..) {
        if let Err(e) = target.destroy(device, allocator) {
            error!("Failed to destroy render target: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_rebuild_keeps_the_old_value() {
        let mut current = String::from("old");
        let mut retired = Vec::new();
        let result = replace_built(&mut current, || Err("no pipeline"), |old| retired.push(old));
        assert_eq!(result, Err("no pipeline"));
        assert_eq!(current, "old");
        assert!(retired.is_empty());
    }

    #[test]
    fn successful_rebuild_retires_the_old_value() {
        let mut current = String::from("old");
        let mut retired = Vec::new();
        let result = replace_built(
            &mut current,
            || Ok::<_, &str>(String::from("new")),
            |old| retired.push(old),
        );
        assert_eq!(result, Ok(()));
        assert_eq!(current, "new");
        assert_eq!(retired, ["old"]);
    }
}
