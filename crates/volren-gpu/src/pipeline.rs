//! Graphics pipelines for dynamic rendering.
//!
//! Every pipeline draws triangle lists with fill rasterization, counter
//! clockwise front faces, no blending and dynamic viewport and scissor.

use crate::error::{GpuError, Result};
use ash::vk;

/// Depth attachment state of a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    pub format: vk::Format,
    pub compare_op: vk::CompareOp,
    pub write: bool,
}

/// Shaders, vertex layout and attachment formats of one pipeline.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: &'static [u32],
    pub fragment_shader: &'static [u32],
    /// Empty when the vertex shader generates its vertices.
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub cull_mode: vk::CullModeFlags,
    pub color_formats: Vec<vk::Format>,
    /// `None` renders without a depth attachment.
    pub depth: Option<DepthState>,
}

impl GraphicsPipelineConfig {
    /// Pipeline drawing `gl_VertexIndex`-generated geometry without depth.
    pub fn fullscreen(
        vertex_shader: &'static [u32],
        fragment_shader: &'static [u32],
        color_formats: Vec<vk::Format>,
    ) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::NONE,
            color_formats,
            depth: None,
        }
    }

    fn validate(&self) -> Result<()> {
        let problem = if self.vertex_shader.is_empty() || self.fragment_shader.is_empty() {
            "missing shader code"
        } else if self.color_formats.is_empty() && self.depth.is_none() {
            "no attachments"
        } else if self.vertex_attributes.is_empty() != self.vertex_bindings.is_empty() {
            "vertex attributes without bindings"
        } else {
            return Ok(());
        };
        Err(GpuError::PipelineCreation(problem.to_string()))
    }
}

/// Pipeline and its layout, destroyed together.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// # Safety
    /// The shader code must be valid SPIR-V with `main` entry points.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        config.validate()?;

        let layout = device
            .create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default()
                    .set_layouts(set_layouts)
                    .push_constant_ranges(push_constant_ranges),
                None,
            )
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        let mut modules = Vec::with_capacity(2);
        let result = (|| {
            for (code, stage) in [(config.vertex_shader, "vertex"), (config.fragment_shader, "fragment")] {
                let module = device
                    .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(code), None)
                    .map_err(|e| GpuError::ShaderModule(format!("{stage} shader: {e}")))?;
                modules.push(module);
            }
            create_pipeline(device, config, layout, modules[0], modules[1])
        })();

        for module in modules {
            device.destroy_shader_module(module, None);
        }
        match result {
            Ok(pipeline) => Ok(Self { pipeline, layout }),
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                Err(e)
            }
        }
    }

    /// # Safety
    /// No pending command buffer may use the pipeline.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

unsafe fn create_pipeline(
    device: &ash::Device,
    config: &GraphicsPipelineConfig,
    layout: vk::PipelineLayout,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment)
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&config.vertex_bindings)
        .vertex_attribute_descriptions(&config.vertex_attributes);
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(config.cull_mode)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = match config.depth {
        Some(depth) => vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(depth.write)
            .depth_compare_op(depth.compare_op),
        None => vk::PipelineDepthStencilStateCreateInfo::default(),
    };

    let blend_attachments =
        vec![
            vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
            config.color_formats.len()
        ];
    let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut rendering = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&config.color_formats)
        .depth_attachment_format(config.depth.map_or(vk::Format::UNDEFINED, |d| d.format));

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&blend)
        .dynamic_state(&dynamic)
        .layout(layout)
        .push_next(&mut rendering);

    let pipelines = device
        .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
        .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    static SPIRV: [u32; 1] = [0x0723_0203];

    #[test]
    fn fullscreen_config_is_valid_without_depth() {
        let config = GraphicsPipelineConfig::fullscreen(&SPIRV, &SPIRV, vec![vk::Format::B8G8R8A8_SRGB]);
        assert!(config.depth.is_none());
        assert!(config.vertex_bindings.is_empty());
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn depth_only_pipeline_is_valid() {
        let mut config = GraphicsPipelineConfig::fullscreen(&SPIRV, &SPIRV, Vec::new());
        assert!(config.validate().is_err());

        config.depth = Some(DepthState {
            format: vk::Format::D32_SFLOAT,
            compare_op: vk::CompareOp::LESS,
            write: true,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn attributes_need_bindings() {
        let mut config = GraphicsPipelineConfig::fullscreen(&SPIRV, &SPIRV, vec![vk::Format::R8G8B8A8_UNORM]);
        config.vertex_attributes.push(vk::VertexInputAttributeDescription::default());
        assert!(matches!(config.validate(), Err(GpuError::PipelineCreation(msg)) if msg.contains("bindings")));
    }

    #[test]
    fn missing_shader_code_is_rejected() {
        let config = GraphicsPipelineConfig::fullscreen(&[], &SPIRV, vec![vk::Format::R8G8B8A8_UNORM]);
        assert!(config.validate().is_err());
    }
}
