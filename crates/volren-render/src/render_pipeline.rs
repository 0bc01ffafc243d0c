//! Sequencing of subpasses into dynamic rendering scopes.

use crate::camera::GeometryPushConstants;
use crate::gbuffer::clear_values;
use crate::pass_plan::{LayoutTransition, PassPlan, PlannedAttachment, SubpassDesc};
use crate::render_target::{GBufferFormats, RenderTarget};
use crate::subpasses::LightingPushConstants;
use ash::vk;
use volren_gpu::error::{GpuError, Result};
use volren_gpu::format::full_aspect_mask;
use volren_gpu::memory::full_subresource_range;

/// Per-frame values shared by all subpasses.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
    pub geometry: GeometryPushConstants,
    pub lighting: LightingPushConstants,
    /// Volume descriptor set, `None` while the upload is in flight.
    pub volume_set: Option<vk::DescriptorSet>,
}

/// What a subpass needs to know while recording.
pub struct DrawContext<'a> {
    /// Index of the render target (and swapchain image) being drawn.
    pub target_index: usize,
    pub extent: vk::Extent2D,
    pub params: &'a FrameParams,
}

/// One stage of the frame, reading and writing attachments by index.
pub trait Subpass {
    /// Attachment wiring.
    fn desc(&self) -> &SubpassDesc;

    /// Rebuild anything that references render target images. Called after
    /// the targets are created and after every resize.
    ///
    /// # Safety
    /// The device must be valid and no previous descriptor may be in use.
    unsafe fn prepare_targets(&mut self, device: &ash::Device, targets: &[RenderTarget])
        -> Result<()>;

    /// Record draw commands inside an active rendering scope.
    ///
    /// # Safety
    /// The command buffer must be recording inside the scope the pass plan
    /// opened for this subpass.
    unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer, ctx: &DrawContext<'_>)
        -> Result<()>;

    /// Release pipelines and descriptors.
    ///
    /// # Safety
    /// Nothing recorded by this subpass may still be executing.
    unsafe fn destroy(&mut self, device: &ash::Device);
}

/// Validated sequence of subpasses and the plan used to record them.
pub struct RenderPipeline {
    subpasses: Vec<Box<dyn Subpass>>,
    plan: PassPlan,
    clear_values: Vec<vk::ClearValue>,
}

impl RenderPipeline {
    /// Validate the subpass wiring against the attachment layout.
    pub fn new(subpasses: Vec<Box<dyn Subpass>>, formats: &GBufferFormats) -> Result<Self> {
        let descs: Vec<SubpassDesc> = subpasses.iter().map(|s| s.desc().clone()).collect();
        let plan = PassPlan::build(&formats.plan_attachments(), &descs)?;

        tracing::debug!(
            "Render pipeline: {} ({} clear-only scopes)",
            descs
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> "),
            plan.clear_only_passes()
        );

        Ok(Self {
            subpasses,
            plan,
            clear_values: clear_values(),
        })
    }

    pub fn plan(&self) -> &PassPlan {
        &self.plan
    }

    /// Forward freshly created render targets to every subpass.
    ///
    /// # Safety
    /// The device must be idle with respect to the previous targets.
    pub unsafe fn prepare_targets(&mut self, device: &ash::Device, targets: &[RenderTarget]) -> Result<()> {
        for subpass in &mut self.subpasses {
            subpass.prepare_targets(device, targets)?;
        }
        Ok(())
    }

    /// Record the whole frame into `cmd`, leaving the swapchain image ready
    /// for presentation.
    ///
    /// # Safety
    /// The command buffer must be recording outside any rendering scope.
    pub unsafe fn draw(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &RenderTarget,
        ctx: &DrawContext<'_>,
    ) -> Result<()> {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: target.extent,
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        for pass in &self.plan.passes {
            record_transitions(device, cmd, target, &pass.transitions)?;

            let color_attachments = pass
                .color
                .iter()
                .map(|planned| {
                    self.rendering_attachment(target, planned, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                })
                .collect::<Result<Vec<_>>>()?;
            let depth_attachment = pass
                .depth
                .as_ref()
                .map(|planned| {
                    self.rendering_attachment(
                        target,
                        planned,
                        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    )
                })
                .transpose()?;

            let mut rendering_info = vk::RenderingInfo::default()
                .render_area(render_area)
                .layer_count(1)
                .color_attachments(&color_attachments);
            if let Some(depth) = depth_attachment.as_ref() {
                rendering_info = rendering_info.depth_attachment(depth);
            }

            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);

            let result = match pass.subpass {
                Some(index) => self.subpasses[index].draw(device, cmd, ctx),
                None => Ok(()),
            };

            device.cmd_end_rendering(cmd);
            result?;
        }

        record_transitions(device, cmd, target, &self.plan.final_transitions)
    }

    fn rendering_attachment(
        &self,
        target: &RenderTarget,
        planned: &PlannedAttachment,
        layout: vk::ImageLayout,
    ) -> Result<vk::RenderingAttachmentInfo<'static>> {
        let attachment = target
            .attachment(planned.index)
            .ok_or_else(|| missing_attachment(planned.index))?;
        let clear_value = self
            .clear_values
            .get(planned.index)
            .copied()
            .unwrap_or_default();

        Ok(vk::RenderingAttachmentInfo::default()
            .image_view(attachment.view)
            .image_layout(layout)
            .load_op(planned.load_store.load_op)
            .store_op(planned.load_store.store_op)
            .clear_value(clear_value))
    }

    /// Destroy every subpass.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for subpass in &mut self.subpasses {
            subpass.destroy(device);
        }
        self.subpasses.clear();
    }
}

fn missing_attachment(index: usize) -> GpuError {
    GpuError::InvalidState(format!("Render target has no attachment {index}"))
}

unsafe fn record_transitions(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &RenderTarget,
    transitions: &[LayoutTransition],
) -> Result<()> {
    if transitions.is_empty() {
        return Ok(());
    }

    let barriers = transitions
        .iter()
        .map(|t| {
            let attachment = target
                .attachment(t.attachment)
                .ok_or_else(|| missing_attachment(t.attachment))?;
            Ok(vk::ImageMemoryBarrier2::default()
                .src_stage_mask(t.src_stage)
                .src_access_mask(t.src_access)
                .dst_stage_mask(t.dst_stage)
                .dst_access_mask(t.dst_access)
                .old_layout(t.old_layout)
                .new_layout(t.new_layout)
                .image(attachment.image)
                .subresource_range(full_subresource_range(full_aspect_mask(
                    attachment.spec.format,
                ))))
        })
        .collect::<Result<Vec<_>>>()?;

    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    device.cmd_pipeline_barrier2(cmd, &dependency_info);
    Ok(())
}
