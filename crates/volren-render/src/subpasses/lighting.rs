//! Lighting pass: marches each pixel's ray segment through the volume.

use crate::debug::DebugMode;
use crate::pass_plan::SubpassDesc;
use crate::render_pipeline::{DrawContext, Subpass};
use crate::render_target::{GBufferFormats, RenderTarget, ALBEDO, DEPTH, DIRECTION, POSITION, SWAPCHAIN};
use ash::vk;
use volren_gpu::descriptors::{write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder};
use volren_gpu::error::{GpuError, Result};
use volren_gpu::pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
use volren_gpu::sampler::{create_sampler, SamplerFilter};
use volren_volume::CompositeParams;

/// G-buffer inputs in binding order.
const INPUTS: [usize; 4] = [DEPTH, ALBEDO, POSITION, DIRECTION];

/// Push constants of the lighting pass.
///
/// Must match `lighting.frag`:
/// ```glsl
/// layout(push_constant) uniform LightingPush {
///     vec4 tint_density;      // 16 bytes
///     uint steps;             // 4 bytes
///     uint order;             // 4 bytes
///     uint debug_mode;        // 4 bytes
///     float early_exit_alpha; // 4 bytes
/// } pc;
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingPushConstants {
    /// RGB tint, extinction scale in `w`.
    pub tint_density: [f32; 4],
    pub steps: u32,
    /// 0 front-to-back, 1 back-to-front.
    pub order: u32,
    pub debug_mode: u32,
    /// Above 1.0 disables early termination.
    pub early_exit_alpha: f32,
}

impl LightingPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(params: &CompositeParams, debug_mode: DebugMode) -> Self {
        Self {
            tint_density: params.tint.extend(params.density_scale).to_array(),
            steps: params.steps.max(1),
            order: params.order.as_u32(),
            debug_mode: debug_mode.as_u32(),
            early_exit_alpha: params.early_exit_alpha.unwrap_or(2.0),
        }
    }
}

/// Composites the volume into the swapchain image.
pub struct LightingSubpass {
    desc: SubpassDesc,
    pipeline: GraphicsPipeline,
    gbuffer_layout: vk::DescriptorSetLayout,
    sampler: vk::Sampler,
    pool: Option<DescriptorPool>,
    sets: Vec<vk::DescriptorSet>,
}

impl LightingSubpass {
    /// Build the pipeline. `volume_layout` describes set 1.
    ///
    /// # Safety
    /// The device must be valid and `volume_layout` must outlive the subpass.
    pub unsafe fn new(
        device: &ash::Device,
        formats: &GBufferFormats,
        volume_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let gbuffer_layout = DescriptorSetLayoutBuilder::new()
            .sampled_images(0, INPUTS.len() as u32, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let sampler = match create_sampler(device, SamplerFilter::Nearest) {
            Ok(sampler) => sampler,
            Err(e) => {
                device.destroy_descriptor_set_layout(gbuffer_layout, None);
                return Err(e);
            }
        };

        let config = GraphicsPipelineConfig::fullscreen(
            volren_shaders::lighting_vertex_shader(),
            volren_shaders::lighting_fragment_shader(),
            vec![formats.swapchain],
        );
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(LightingPushConstants::SIZE);

        let pipeline = match GraphicsPipeline::new(
            device,
            &config,
            &[gbuffer_layout, volume_layout],
            &[push_constant_range],
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_sampler(sampler, None);
                device.destroy_descriptor_set_layout(gbuffer_layout, None);
                return Err(e);
            }
        };

        Ok(Self {
            desc: SubpassDesc {
                name: "lighting".to_string(),
                inputs: INPUTS.to_vec(),
                color_outputs: vec![SWAPCHAIN],
                depth_output: None,
            },
            pipeline,
            gbuffer_layout,
            sampler,
            pool: None,
            sets: Vec::new(),
        })
    }
}

impl Subpass for LightingSubpass {
    fn desc(&self) -> &SubpassDesc {
        &self.desc
    }

    unsafe fn prepare_targets(&mut self, device: &ash::Device, targets: &[RenderTarget]) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.destroy(device);
        }
        self.sets.clear();

        let pool =
            DescriptorPool::for_sampled_images(device, targets.len() as u32, INPUTS.len() as u32)?;
        let layouts = vec![self.gbuffer_layout; targets.len()];
        let sets = pool.allocate(device, &layouts)?;
        self.pool = Some(pool);

        for (target, &set) in targets.iter().zip(&sets) {
            for (binding, &index) in INPUTS.iter().enumerate() {
                let attachment = target.attachment(index).ok_or_else(|| {
                    GpuError::InvalidState(format!("Render target lacks attachment {index}"))
                })?;
                write_combined_image_sampler(
                    device,
                    set,
                    binding as u32,
                    self.sampler,
                    attachment.view,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
        }
        self.sets = sets;

        Ok(())
    }

    unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer, ctx: &DrawContext<'_>) -> Result<()> {
        // Until the volume is resident the scope only clears the swapchain
        let Some(volume_set) = ctx.params.volume_set else {
            return Ok(());
        };

        let gbuffer_set = self.sets.get(ctx.target_index).copied().ok_or_else(|| {
            GpuError::InvalidState(format!("No G-buffer set for target {}", ctx.target_index))
        })?;

        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline.layout,
            0,
            &[gbuffer_set, volume_set],
            &[],
        );
        device.cmd_push_constants(
            cmd,
            self.pipeline.layout,
            vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(&ctx.params.lighting),
        );
        device.cmd_draw(cmd, 3, 1, 0, 0);
        Ok(())
    }

    unsafe fn destroy(&mut self, device: &ash::Device) {
        self.pipeline.destroy(device);
        if let Some(pool) = self.pool.take() {
            pool.destroy(device);
        }
        device.destroy_sampler(self.sampler, None);
        device.destroy_descriptor_set_layout(self.gbuffer_layout, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use volren_volume::CompositeOrder;

    #[test]
    fn push_constant_layout() {
        assert_eq!(LightingPushConstants::SIZE, 32);
        assert_eq!(std::mem::offset_of!(LightingPushConstants, steps), 16);
        assert_eq!(std::mem::offset_of!(LightingPushConstants, early_exit_alpha), 28);
    }

    #[test]
    fn push_constants_from_params() {
        let params = CompositeParams {
            steps: 64,
            order: CompositeOrder::BackToFront,
            density_scale: 4.0,
            tint: Vec3::new(1.0, 0.5, 0.25),
            early_exit_alpha: None,
        };
        let push = LightingPushConstants::new(&params, DebugMode::Directions);
        assert_eq!(push.tint_density, [1.0, 0.5, 0.25, 4.0]);
        assert_eq!(push.steps, 64);
        assert_eq!(push.order, 1);
        assert_eq!(push.debug_mode, 3);
        assert!(push.early_exit_alpha > 1.0);
    }

    #[test]
    fn zero_steps_are_clamped() {
        let params = CompositeParams {
            steps: 0,
            ..CompositeParams::default()
        };
        let push = LightingPushConstants::new(&params, DebugMode::None);
        assert_eq!(push.steps, 1);
        assert!((push.early_exit_alpha - 0.99).abs() < 1e-6);
    }
}
