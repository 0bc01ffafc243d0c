//! Default load/store behaviour and clear values of the attachments.

use crate::render_target::{ATTACHMENT_COUNT, DEPTH, SWAPCHAIN};
use ash::vk;

/// Background color the swapchain is cleared to, also used by the lighting
/// shader for pixels the volume does not cover.
pub const BACKGROUND_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

/// Depth clear value; the geometry passes test with `LESS`.
pub const DEPTH_CLEAR: f32 = 1.0;

/// Load and store operation of one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStoreInfo {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl LoadStoreInfo {
    /// Clear on load, discard afterwards.
    pub const CLEAR_DISCARD: Self = Self {
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
    };

    /// Clear on load, keep the result.
    pub const CLEAR_STORE: Self = Self {
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
    };

    /// Whether the contents survive the end of the frame.
    pub fn stores(&self) -> bool {
        self.store_op == vk::AttachmentStoreOp::STORE
    }
}

/// Clear every attachment and keep only the swapchain image.
///
/// The pass planner upgrades the store op of intermediate attachments that a
/// later subpass samples.
pub fn clear_all_store_swapchain() -> Vec<LoadStoreInfo> {
    (0..ATTACHMENT_COUNT)
        .map(|index| {
            if index == SWAPCHAIN {
                LoadStoreInfo::CLEAR_STORE
            } else {
                LoadStoreInfo::CLEAR_DISCARD
            }
        })
        .collect()
}

/// Clear values indexed by attachment.
pub fn clear_values() -> Vec<vk::ClearValue> {
    (0..ATTACHMENT_COUNT)
        .map(|index| match index {
            SWAPCHAIN => vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: BACKGROUND_COLOR,
                },
            },
            DEPTH => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: DEPTH_CLEAR,
                    stencil: 0,
                },
            },
            // Alpha 0 marks pixels no geometry pass touched
            _ => vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 0.0],
                },
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_target::{ALBEDO, POSITION};

    #[test]
    fn only_swapchain_is_stored() {
        let infos = clear_all_store_swapchain();
        assert_eq!(infos.len(), ATTACHMENT_COUNT);
        assert!(infos.iter().all(|i| i.load_op == vk::AttachmentLoadOp::CLEAR));
        for (index, info) in infos.iter().enumerate() {
            assert_eq!(info.stores(), index == SWAPCHAIN, "attachment {index}");
        }
    }

    #[test]
    fn depth_clears_to_far_plane() {
        let values = clear_values();
        assert_eq!(values.len(), ATTACHMENT_COUNT);
        let depth = unsafe { values[DEPTH].depth_stencil.depth };
        assert!((depth - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn intermediate_attachments_clear_to_transparent() {
        let values = clear_values();
        for index in [ALBEDO, POSITION] {
            let color = unsafe { values[index].color.float32 };
            assert_eq!(color, [0.0; 4]);
        }
        let swapchain = unsafe { values[SWAPCHAIN].color.float32 };
        assert_eq!(swapchain, BACKGROUND_COLOR);
    }
}
