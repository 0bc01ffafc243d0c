//! Subpass wiring validation and per-pass attachment planning.
//!
//! Subpasses are recorded as consecutive dynamic rendering scopes. Reading an
//! attachment means sampling it, so every read is preceded by a transition to
//! `SHADER_READ_ONLY_OPTIMAL` and every write by a transition back to an
//! attachment layout.

use crate::error::PipelineError;
use crate::gbuffer::LoadStoreInfo;
use crate::render_target::AttachmentKind;
use ash::vk;

/// Attachments a subpass reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpassDesc {
    pub name: String,
    /// Attachments sampled by the fragment shader.
    pub inputs: Vec<usize>,
    /// Color attachments in fragment output location order.
    pub color_outputs: Vec<usize>,
    pub depth_output: Option<usize>,
}

impl SubpassDesc {
    /// All written attachments, colors first.
    pub fn outputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.color_outputs.iter().copied().chain(self.depth_output)
    }

    fn uses(&self, attachment: usize) -> bool {
        self.inputs.contains(&attachment) || self.outputs().any(|o| o == attachment)
    }
}

/// How an attachment is accessed at a point in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    Undefined,
    ColorWrite,
    DepthWrite,
    Sampled,
    Present,
}

impl Usage {
    fn layout(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::ColorWrite => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::Sampled => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    fn stage(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::Undefined => vk::PipelineStageFlags2::NONE,
            Self::ColorWrite => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthWrite => {
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
            }
            Self::Sampled => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            Self::Present => vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        }
    }

    fn access(self) -> vk::AccessFlags2 {
        match self {
            Self::Undefined | Self::Present => vk::AccessFlags2::NONE,
            Self::ColorWrite => {
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
            }
            Self::DepthWrite => {
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::Sampled => vk::AccessFlags2::SHADER_SAMPLED_READ,
        }
    }

    fn is_write(self) -> bool {
        matches!(self, Self::ColorWrite | Self::DepthWrite)
    }
}

/// Layout transition and dependency for one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub attachment: usize,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl LayoutTransition {
    fn between(attachment: usize, from: Usage, to: Usage) -> Self {
        // Nothing to wait on for discarded contents, but the barrier must
        // still chain with whatever last used the stage (acquire semaphore)
        let src_stage = if from == Usage::Undefined {
            to.stage()
        } else {
            from.stage()
        };
        Self {
            attachment,
            old_layout: from.layout(),
            new_layout: to.layout(),
            src_stage,
            src_access: if from.is_write() {
                from.access()
            } else {
                vk::AccessFlags2::NONE
            },
            dst_stage: to.stage(),
            dst_access: to.access(),
        }
    }
}

/// An attachment bound for rendering with its resolved load/store ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAttachment {
    pub index: usize,
    pub load_store: LoadStoreInfo,
}

/// One dynamic rendering scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPass {
    /// Subpass drawn inside the scope, `None` for a clear-only scope.
    pub subpass: Option<usize>,
    /// Barriers recorded before the scope begins.
    pub transitions: Vec<LayoutTransition>,
    pub color: Vec<PlannedAttachment>,
    pub depth: Option<PlannedAttachment>,
}

/// Validated recording plan for a sequence of subpasses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassPlan {
    pub passes: Vec<PlannedPass>,
    /// Barriers recorded after the last scope, ending with the swapchain
    /// image in `PRESENT_SRC_KHR`.
    pub final_transitions: Vec<LayoutTransition>,
}

impl PassPlan {
    /// Validate the wiring of `subpasses` against `attachments` (kind and
    /// default load/store per index) and derive the plan.
    pub fn build(
        attachments: &[(AttachmentKind, LoadStoreInfo)],
        subpasses: &[SubpassDesc],
    ) -> Result<Self, PipelineError> {
        validate(attachments, subpasses)?;

        let mut usage = vec![Usage::Undefined; attachments.len()];
        let mut passes = Vec::with_capacity(subpasses.len() + 1);

        if let Some(clear) = clear_only_pass(attachments, subpasses, &mut usage) {
            passes.push(clear);
        }

        let mut written = vec![false; attachments.len()];
        for (i, desc) in subpasses.iter().enumerate() {
            let mut transitions = Vec::new();

            for &input in &desc.inputs {
                if usage[input] != Usage::Sampled {
                    transitions.push(LayoutTransition::between(
                        input,
                        usage[input],
                        Usage::Sampled,
                    ));
                    usage[input] = Usage::Sampled;
                }
            }

            let used_later = |attachment: usize| {
                subpasses[i + 1..]
                    .iter()
                    .any(|later| later.uses(attachment))
            };

            let mut bind = |attachment: usize, target: Usage| -> PlannedAttachment {
                // Consecutive writes still need a write-after-write barrier
                if usage[attachment] != target || usage[attachment].is_write() {
                    transitions.push(LayoutTransition::between(
                        attachment,
                        usage[attachment],
                        target,
                    ));
                }
                usage[attachment] = target;

                let defaults = attachments[attachment].1;
                let load_op = if written[attachment] {
                    vk::AttachmentLoadOp::LOAD
                } else {
                    defaults.load_op
                };
                let store_op = if defaults.stores() || used_later(attachment) {
                    vk::AttachmentStoreOp::STORE
                } else {
                    vk::AttachmentStoreOp::DONT_CARE
                };
                written[attachment] = true;

                PlannedAttachment {
                    index: attachment,
                    load_store: LoadStoreInfo { load_op, store_op },
                }
            };

            let color: Vec<_> = desc
                .color_outputs
                .iter()
                .map(|&attachment| bind(attachment, Usage::ColorWrite))
                .collect();
            let depth = desc
                .depth_output
                .map(|attachment| bind(attachment, Usage::DepthWrite));

            passes.push(PlannedPass {
                subpass: Some(i),
                transitions,
                color,
                depth,
            });
        }

        let final_transitions = attachments
            .iter()
            .enumerate()
            .filter(|(_, (kind, _))| *kind == AttachmentKind::Swapchain)
            .map(|(index, _)| LayoutTransition::between(index, usage[index], Usage::Present))
            .collect();

        Ok(Self {
            passes,
            final_transitions,
        })
    }

    /// Number of clear-only scopes in the plan.
    pub fn clear_only_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.subpass.is_none()).count()
    }
}

/// Stored attachments no subpass writes still need defined contents.
fn clear_only_pass(
    attachments: &[(AttachmentKind, LoadStoreInfo)],
    subpasses: &[SubpassDesc],
    usage: &mut [Usage],
) -> Option<PlannedPass> {
    let mut pass = PlannedPass {
        subpass: None,
        transitions: Vec::new(),
        color: Vec::new(),
        depth: None,
    };

    for (index, (kind, defaults)) in attachments.iter().enumerate() {
        let written = subpasses.iter().any(|s| s.outputs().any(|o| o == index));
        if written || !defaults.stores() {
            continue;
        }

        let target = if *kind == AttachmentKind::Depth {
            Usage::DepthWrite
        } else {
            Usage::ColorWrite
        };
        pass.transitions
            .push(LayoutTransition::between(index, usage[index], target));
        usage[index] = target;

        let planned = PlannedAttachment {
            index,
            load_store: LoadStoreInfo {
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
            },
        };
        if target == Usage::DepthWrite {
            pass.depth = Some(planned);
        } else {
            pass.color.push(planned);
        }
    }

    (!pass.transitions.is_empty()).then_some(pass)
}

fn validate(
    attachments: &[(AttachmentKind, LoadStoreInfo)],
    subpasses: &[SubpassDesc],
) -> Result<(), PipelineError> {
    if subpasses.is_empty() {
        return Err(PipelineError::NoSubpasses);
    }

    let mut written = vec![false; attachments.len()];

    for desc in subpasses {
        let subpass = || desc.name.clone();

        for attachment in desc.inputs.iter().copied().chain(desc.outputs()) {
            if attachment >= attachments.len() {
                return Err(PipelineError::UnknownAttachment {
                    subpass: subpass(),
                    attachment,
                });
            }
        }

        for &attachment in &desc.color_outputs {
            if attachments[attachment].0 == AttachmentKind::Depth {
                return Err(PipelineError::AspectMismatch {
                    subpass: subpass(),
                    attachment,
                });
            }
        }
        if let Some(attachment) = desc.depth_output {
            if attachments[attachment].0 != AttachmentKind::Depth {
                return Err(PipelineError::AspectMismatch {
                    subpass: subpass(),
                    attachment,
                });
            }
        }

        let outputs: Vec<usize> = desc.outputs().collect();
        for (n, attachment) in outputs.iter().enumerate() {
            if outputs[..n].contains(attachment) {
                return Err(PipelineError::DuplicateOutput {
                    subpass: subpass(),
                    attachment: *attachment,
                });
            }
        }

        for &attachment in &desc.inputs {
            if attachments[attachment].0 == AttachmentKind::Swapchain {
                return Err(PipelineError::SwapchainInput {
                    subpass: subpass(),
                    attachment,
                });
            }
            if outputs.contains(&attachment) {
                return Err(PipelineError::ReadWriteConflict {
                    subpass: subpass(),
                    attachment,
                });
            }
            if !written[attachment] {
                return Err(PipelineError::InputNotWritten {
                    subpass: subpass(),
                    attachment,
                });
            }
        }

        for attachment in outputs {
            written[attachment] = true;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbuffer::clear_all_store_swapchain;
    use crate::render_target::{ALBEDO, DEPTH, DIRECTION, POSITION, SWAPCHAIN};

    fn attachments() -> Vec<(AttachmentKind, LoadStoreInfo)> {
        let kinds = [
            AttachmentKind::Swapchain,
            AttachmentKind::Depth,
            AttachmentKind::Color,
            AttachmentKind::Color,
            AttachmentKind::Color,
        ];
        kinds.into_iter().zip(clear_all_store_swapchain()).collect()
    }

    fn desc(name: &str, inputs: &[usize], colors: &[usize], depth: Option<usize>) -> SubpassDesc {
        SubpassDesc {
            name: name.to_string(),
            inputs: inputs.to_vec(),
            color_outputs: colors.to_vec(),
            depth_output: depth,
        }
    }

    fn back() -> SubpassDesc {
        desc("back", &[], &[POSITION], None)
    }

    fn front() -> SubpassDesc {
        desc("front", &[POSITION], &[ALBEDO, DIRECTION], Some(DEPTH))
    }

    fn lighting() -> SubpassDesc {
        desc("lighting", &[DEPTH, ALBEDO, POSITION, DIRECTION], &[SWAPCHAIN], None)
    }

    fn find<'a>(attachments: &'a [PlannedAttachment], index: usize) -> &'a PlannedAttachment {
        attachments.iter().find(|a| a.index == index).unwrap()
    }

    #[test]
    fn full_pipeline_plan() {
        let plan = PassPlan::build(&attachments(), &[back(), front(), lighting()]).unwrap();
        assert_eq!(plan.passes.len(), 3);
        assert_eq!(plan.clear_only_passes(), 0);

        let back = &plan.passes[0];
        let position = find(&back.color, POSITION);
        assert_eq!(position.load_store.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(position.load_store.store_op, vk::AttachmentStoreOp::STORE);

        let front = &plan.passes[1];
        assert_eq!(
            front.color.iter().map(|a| a.index).collect::<Vec<_>>(),
            vec![ALBEDO, DIRECTION]
        );
        let depth = front.depth.unwrap();
        assert_eq!(depth.index, DEPTH);
        assert_eq!(depth.load_store.store_op, vk::AttachmentStoreOp::STORE);
        assert!(front.transitions.iter().any(|t| t.attachment == POSITION
            && t.old_layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            && t.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));

        let lighting = &plan.passes[2];
        let swapchain = find(&lighting.color, SWAPCHAIN);
        assert_eq!(swapchain.load_store, LoadStoreInfo::CLEAR_STORE);
        // Position is already sampled by the front pass
        assert!(lighting.transitions.iter().all(|t| t.attachment != POSITION));
        for attachment in [DEPTH, ALBEDO, DIRECTION] {
            assert!(lighting
                .transitions
                .iter()
                .any(|t| t.attachment == attachment
                    && t.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        }

        assert_eq!(plan.final_transitions.len(), 1);
        let present = plan.final_transitions[0];
        assert_eq!(present.attachment, SWAPCHAIN);
        assert_eq!(present.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(present
            .src_access
            .contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn first_transitions_discard_contents() {
        let plan = PassPlan::build(&attachments(), &[back(), front(), lighting()]).unwrap();
        let first = plan.passes[0].transitions[0];
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.src_access, vk::AccessFlags2::NONE);
        assert_eq!(first.src_stage, first.dst_stage);
    }

    #[test]
    fn without_lighting_swapchain_is_cleared() {
        let plan = PassPlan::build(&attachments(), &[back(), front()]).unwrap();
        assert_eq!(plan.clear_only_passes(), 1);

        let clear = &plan.passes[0];
        assert_eq!(clear.subpass, None);
        assert_eq!(clear.color.len(), 1);
        assert_eq!(clear.color[0].index, SWAPCHAIN);
        assert_eq!(clear.color[0].load_store, LoadStoreInfo::CLEAR_STORE);

        // Nothing samples the front pass outputs any more
        let front = &plan.passes[2];
        assert_eq!(
            front.depth.unwrap().load_store.store_op,
            vk::AttachmentStoreOp::DONT_CARE
        );
        assert_eq!(
            find(&front.color, ALBEDO).load_store.store_op,
            vk::AttachmentStoreOp::DONT_CARE
        );

        assert_eq!(
            plan.final_transitions[0].old_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn later_writes_load() {
        let plan = PassPlan::build(
            &attachments(),
            &[
                desc("a", &[], &[ALBEDO], None),
                desc("b", &[], &[ALBEDO], None),
                desc("c", &[ALBEDO], &[SWAPCHAIN], None),
            ],
        )
        .unwrap();

        let a = find(&plan.passes[0].color, ALBEDO).load_store;
        let b = find(&plan.passes[1].color, ALBEDO).load_store;
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(b.load_op, vk::AttachmentLoadOp::LOAD);

        // Write after write keeps the layout but still gets a barrier
        let waw = plan.passes[1].transitions[0];
        assert_eq!(waw.old_layout, waw.new_layout);
        assert_ne!(waw.src_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn rejects_unwritten_input() {
        let err = PassPlan::build(&attachments(), &[front()]).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InputNotWritten {
                subpass: "front".to_string(),
                attachment: POSITION
            }
        );
    }

    #[test]
    fn rejects_input_written_later() {
        let err = PassPlan::build(&attachments(), &[front(), back()]).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotWritten { .. }));
    }

    #[test]
    fn rejects_unknown_attachment() {
        let err =
            PassPlan::build(&attachments(), &[desc("bad", &[], &[7], None)]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownAttachment { attachment: 7, .. }
        ));
    }

    #[test]
    fn rejects_feedback_loop() {
        let err = PassPlan::build(
            &attachments(),
            &[back(), desc("loop", &[POSITION], &[POSITION], None)],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ReadWriteConflict { .. }));
    }

    #[test]
    fn depth_binding_must_match_kind() {
        let as_color =
            PassPlan::build(&attachments(), &[desc("d", &[], &[DEPTH], None)]).unwrap_err();
        assert!(matches!(as_color, PipelineError::AspectMismatch { .. }));

        let as_depth =
            PassPlan::build(&attachments(), &[desc("d", &[], &[], Some(ALBEDO))]).unwrap_err();
        assert!(matches!(as_depth, PipelineError::AspectMismatch { .. }));
    }

    #[test]
    fn rejects_swapchain_input_and_duplicates() {
        let swapchain_read = PassPlan::build(
            &attachments(),
            &[present_only(), desc("post", &[SWAPCHAIN], &[ALBEDO], None)],
        );
        assert!(swapchain_read.is_err());

        let duplicate =
            PassPlan::build(&attachments(), &[desc("dup", &[], &[ALBEDO, ALBEDO], None)])
                .unwrap_err();
        assert!(matches!(duplicate, PipelineError::DuplicateOutput { .. }));
    }

    fn present_only() -> SubpassDesc {
        desc("write", &[], &[SWAPCHAIN], None)
    }

    #[test]
    fn rejects_empty_pipeline() {
        assert_eq!(
            PassPlan::build(&attachments(), &[]).unwrap_err(),
            PipelineError::NoSubpasses
        );
    }
}
