//! Back-face and front-face passes over the proxy cube.

use crate::camera::GeometryPushConstants;
use crate::pass_plan::SubpassDesc;
use crate::proxy::ProxyGeometry;
use crate::render_pipeline::{DrawContext, Subpass};
use crate::render_target::{
    GBufferFormats, RenderTarget, ALBEDO, ALBEDO_FORMAT, DEPTH, DIRECTION, DIRECTION_FORMAT,
    POSITION, POSITION_FORMAT,
};
use ash::vk;
use volren_gpu::descriptors::{write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder};
use volren_gpu::error::{GpuError, Result};
use volren_gpu::pipeline::{DepthState, GraphicsPipeline, GraphicsPipelineConfig};
use volren_gpu::sampler::{create_sampler, SamplerFilter};

/// Which faces of the proxy cube a [`RayDirSubpass`] rasterizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceDirection {
    /// Back faces: the exit point of each view ray.
    Back,
    /// Front faces: the entry point, depth and direction towards the exit.
    Front,
}

impl FaceDirection {
    fn desc(self) -> SubpassDesc {
        match self {
            Self::Back => SubpassDesc {
                name: "raydir_back".to_string(),
                inputs: Vec::new(),
                color_outputs: vec![POSITION],
                depth_output: None,
            },
            Self::Front => SubpassDesc {
                name: "raydir_front".to_string(),
                inputs: vec![POSITION],
                color_outputs: vec![ALBEDO, DIRECTION],
                depth_output: Some(DEPTH),
            },
        }
    }

    /// Faces removed by the rasterizer.
    pub fn cull_mode(self) -> vk::CullModeFlags {
        match self {
            Self::Back => vk::CullModeFlags::FRONT,
            Self::Front => vk::CullModeFlags::BACK,
        }
    }

    fn push_stages(self) -> vk::ShaderStageFlags {
        match self {
            Self::Back => vk::ShaderStageFlags::VERTEX,
            // The front pass writes the tint as albedo
            Self::Front => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Exit positions sampled by the front pass, one set per render target.
struct ExitPositionInput {
    layout: vk::DescriptorSetLayout,
    sampler: vk::Sampler,
    pool: Option<DescriptorPool>,
    sets: Vec<vk::DescriptorSet>,
}

/// Rasterizes one side of the proxy cube into the ray attachments.
pub struct RayDirSubpass {
    face: FaceDirection,
    desc: SubpassDesc,
    pipeline: GraphicsPipeline,
    geometry: ProxyGeometry,
    input: Option<ExitPositionInput>,
}

impl RayDirSubpass {
    /// Build the pipeline for `face`.
    ///
    /// # Safety
    /// The device must be valid and `geometry` must outlive the subpass.
    pub unsafe fn new(
        device: &ash::Device,
        face: FaceDirection,
        geometry: ProxyGeometry,
        formats: &GBufferFormats,
    ) -> Result<Self> {
        let input = match face {
            FaceDirection::Back => None,
            FaceDirection::Front => {
                let layout = DescriptorSetLayoutBuilder::new()
                    .sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
                    .build(device)?;
                let sampler = match create_sampler(device, SamplerFilter::Nearest) {
                    Ok(sampler) => sampler,
                    Err(e) => {
                        device.destroy_descriptor_set_layout(layout, None);
                        return Err(e);
                    }
                };
                Some(ExitPositionInput {
                    layout,
                    sampler,
                    pool: None,
                    sets: Vec::new(),
                })
            }
        };

        let (fragment_shader, color_formats, depth_format) = match face {
            FaceDirection::Back => (
                volren_shaders::raydir_back_fragment_shader(),
                vec![POSITION_FORMAT],
                None,
            ),
            FaceDirection::Front => (
                volren_shaders::raydir_front_fragment_shader(),
                vec![ALBEDO_FORMAT, DIRECTION_FORMAT],
                Some(formats.depth),
            ),
        };
        let config = GraphicsPipelineConfig {
            vertex_shader: volren_shaders::geometry_vertex_shader(),
            fragment_shader,
            vertex_bindings: ProxyGeometry::vertex_bindings(),
            vertex_attributes: ProxyGeometry::vertex_attributes(),
            cull_mode: face.cull_mode(),
            color_formats,
            depth: depth_format.map(|format| DepthState {
                format,
                compare_op: vk::CompareOp::LESS,
                write: true,
            }),
        };

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(face.push_stages())
            .offset(0)
            .size(GeometryPushConstants::SIZE);

        let set_layouts: Vec<_> = input.iter().map(|i| i.layout).collect();
        let pipeline = match GraphicsPipeline::new(device, &config, &set_layouts, &[push_constant_range]) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                if let Some(input) = input {
                    device.destroy_sampler(input.sampler, None);
                    device.destroy_descriptor_set_layout(input.layout, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            face,
            desc: face.desc(),
            pipeline,
            geometry,
            input,
        })
    }

    pub fn face(&self) -> FaceDirection {
        self.face
    }
}

impl Subpass for RayDirSubpass {
    fn desc(&self) -> &SubpassDesc {
        &self.desc
    }

    unsafe fn prepare_targets(&mut self, device: &ash::Device, targets: &[RenderTarget]) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };

        if let Some(pool) = input.pool.take() {
            pool.destroy(device);
        }
        input.sets.clear();

        let pool = DescriptorPool::for_sampled_images(device, targets.len() as u32, 1)?;
        let layouts = vec![input.layout; targets.len()];
        let sets = pool.allocate(device, &layouts)?;
        input.pool = Some(pool);

        for (target, &set) in targets.iter().zip(&sets) {
            let position = target.attachment(POSITION).ok_or_else(|| {
                GpuError::InvalidState("Render target lacks the position attachment".to_string())
            })?;
            write_combined_image_sampler(
                device,
                set,
                0,
                input.sampler,
                position.view,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        input.sets = sets;

        Ok(())
    }

    unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer, ctx: &DrawContext<'_>) -> Result<()> {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);

        if let Some(input) = &self.input {
            let set = input.sets.get(ctx.target_index).copied().ok_or_else(|| {
                GpuError::InvalidState(format!("No exit position set for target {}", ctx.target_index))
            })?;
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[set],
                &[],
            );
        }

        device.cmd_push_constants(
            cmd,
            self.pipeline.layout,
            self.face.push_stages(),
            0,
            bytemuck::bytes_of(&ctx.params.geometry),
        );

        self.geometry.draw(device, cmd);
        Ok(())
    }

    unsafe fn destroy(&mut self, device: &ash::Device) {
        self.pipeline.destroy(device);
        if let Some(input) = self.input.take() {
            if let Some(pool) = input.pool {
                pool.destroy(device);
            }
            device.destroy_sampler(input.sampler, None);
            device.destroy_descriptor_set_layout(input.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbuffer::clear_all_store_swapchain;
    use crate::pass_plan::PassPlan;
    use crate::render_target::AttachmentKind;

    #[test]
    fn faces_cull_opposite_sides() {
        assert_eq!(FaceDirection::Back.cull_mode(), vk::CullModeFlags::FRONT);
        assert_eq!(FaceDirection::Front.cull_mode(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn front_pass_consumes_back_pass() {
        let kinds = [
            AttachmentKind::Swapchain,
            AttachmentKind::Depth,
            AttachmentKind::Color,
            AttachmentKind::Color,
            AttachmentKind::Color,
        ];
        let attachments: Vec<_> = kinds.into_iter().zip(clear_all_store_swapchain()).collect();

        let descs = [FaceDirection::Back.desc(), FaceDirection::Front.desc()];
        assert!(PassPlan::build(&attachments, &descs).is_ok());

        let reversed = [FaceDirection::Front.desc(), FaceDirection::Back.desc()];
        assert!(PassPlan::build(&attachments, &reversed).is_err());
    }
}
