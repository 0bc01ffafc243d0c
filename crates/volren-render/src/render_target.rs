//! Per-swapchain-image render targets.
//!
//! Attachment indices are fixed:
//!
//! | index | attachment | format                     |
//! |-------|------------|----------------------------|
//! | 0     | swapchain  | swapchain format           |
//! | 1     | depth      | first suitable depth format|
//! | 2     | albedo     | `R8G8B8A8_UNORM`           |
//! | 3     | position   | `R32G32B32A32_SFLOAT`      |
//! | 4     | direction  | `R32G32B32A32_SFLOAT`      |

use crate::gbuffer::{clear_all_store_swapchain, LoadStoreInfo};
use ash::vk;
use gpu_allocator::MemoryLocation;
use volren_gpu::error::Result;
use volren_gpu::memory::{GpuAllocator, GpuImage};

pub const SWAPCHAIN: usize = 0;
pub const DEPTH: usize = 1;
pub const ALBEDO: usize = 2;
/// Exit position of the view ray, written by the back-face pass.
pub const POSITION: usize = 3;
/// Entry to exit vector with the segment length in `w`.
pub const DIRECTION: usize = 4;
pub const ATTACHMENT_COUNT: usize = 5;

pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const POSITION_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
pub const DIRECTION_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// How an attachment may be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Presentable image owned by the swapchain.
    Swapchain,
    /// Bindable only as the depth attachment.
    Depth,
    /// Intermediate color target that later passes sample.
    Color,
}

/// Formats that vary with the device and surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferFormats {
    pub swapchain: vk::Format,
    pub depth: vk::Format,
}

/// Static description of one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub name: &'static str,
    pub kind: AttachmentKind,
    pub format: vk::Format,
}

impl AttachmentSpec {
    /// Usage of the backing image. Every intermediate is sampled later.
    pub fn usage(&self) -> vk::ImageUsageFlags {
        match self.kind {
            AttachmentKind::Swapchain => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            AttachmentKind::Depth => {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            }
            AttachmentKind::Color => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            }
        }
    }

    /// Aspect used by image views. Stencil is never sampled.
    pub fn view_aspect(&self) -> vk::ImageAspectFlags {
        match self.kind {
            AttachmentKind::Depth => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

impl GBufferFormats {
    /// Specs of all attachments in index order.
    pub fn specs(&self) -> [AttachmentSpec; ATTACHMENT_COUNT] {
        [
            AttachmentSpec {
                name: "swapchain",
                kind: AttachmentKind::Swapchain,
                format: self.swapchain,
            },
            AttachmentSpec {
                name: "depth",
                kind: AttachmentKind::Depth,
                format: self.depth,
            },
            AttachmentSpec {
                name: "albedo",
                kind: AttachmentKind::Color,
                format: ALBEDO_FORMAT,
            },
            AttachmentSpec {
                name: "position",
                kind: AttachmentKind::Color,
                format: POSITION_FORMAT,
            },
            AttachmentSpec {
                name: "direction",
                kind: AttachmentKind::Color,
                format: DIRECTION_FORMAT,
            },
        ]
    }

    /// Kind and default load/store of every attachment, as the pass planner
    /// consumes them.
    pub fn plan_attachments(&self) -> Vec<(AttachmentKind, LoadStoreInfo)> {
        self.specs()
            .iter()
            .zip(clear_all_store_swapchain())
            .map(|(spec, load_store)| (spec.kind, load_store))
            .collect()
    }
}

/// One attachment of a render target.
pub struct RenderAttachment {
    pub spec: AttachmentSpec,
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// `None` for the swapchain image.
    allocation: Option<GpuImage>,
}

/// Images rendered to for a single swapchain image.
pub struct RenderTarget {
    pub extent: vk::Extent2D,
    pub formats: GBufferFormats,
    attachments: Vec<RenderAttachment>,
}

impl RenderTarget {
    /// Attachment by index.
    pub fn attachment(&self, index: usize) -> Option<&RenderAttachment> {
        self.attachments.get(index)
    }

    /// All attachments in index order.
    pub fn attachments(&self) -> &[RenderAttachment] {
        &self.attachments
    }

    /// Release every owned image and view. The swapchain image is untouched.
    ///
    /// # Safety
    /// The device must be valid and the images must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        for attachment in &mut self.attachments {
            if let Some(mut image) = attachment.allocation.take() {
                device.destroy_image_view(attachment.view, None);
                allocator.free_image(&mut image)?;
            }
        }
        self.attachments.clear();
        Ok(())
    }
}

/// Wrap a swapchain image and allocate the intermediate attachments at its size.
///
/// # Safety
/// The device and swapchain handles must be valid.
pub unsafe fn create_render_target(
    device: &ash::Device,
    allocator: &mut GpuAllocator,
    swapchain_image: vk::Image,
    swapchain_view: vk::ImageView,
    extent: vk::Extent2D,
    formats: GBufferFormats,
) -> Result<RenderTarget> {
    let mut target = RenderTarget {
        extent,
        formats,
        attachments: Vec::with_capacity(ATTACHMENT_COUNT),
    };

    for spec in formats.specs() {
        if spec.kind == AttachmentKind::Swapchain {
            target.attachments.push(RenderAttachment {
                spec,
                image: swapchain_image,
                view: swapchain_view,
                allocation: None,
            });
            continue;
        }

        match create_attachment(device, allocator, spec, extent) {
            Ok(attachment) => target.attachments.push(attachment),
            Err(e) => {
                target.destroy(device, allocator)?;
                return Err(e);
            }
        }
    }

    tracing::debug!(
        "Created render target {}x{} ({:?} / {:?})",
        extent.width,
        extent.height,
        formats.swapchain,
        formats.depth
    );

    Ok(target)
}

unsafe fn create_attachment(
    device: &ash::Device,
    allocator: &mut GpuAllocator,
    spec: AttachmentSpec,
    extent: vk::Extent2D,
) -> Result<RenderAttachment> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(spec.format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(spec.usage())
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let mut image = allocator.create_image(&image_info, MemoryLocation::GpuOnly, spec.name)?;

    let view = match image.create_view(device, vk::ImageViewType::TYPE_2D, spec.view_aspect()) {
        Ok(view) => view,
        Err(e) => {
            allocator.free_image(&mut image)?;
            return Err(e);
        }
    };

    Ok(RenderAttachment {
        spec,
        image: image.image,
        view,
        allocation: Some(image),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> GBufferFormats {
        GBufferFormats {
            swapchain: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
        }
    }

    #[test]
    fn attachment_table() {
        let specs = formats().specs();
        assert_eq!(specs[SWAPCHAIN].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(specs[DEPTH].kind, AttachmentKind::Depth);
        assert_eq!(specs[ALBEDO].format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(specs[POSITION].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(specs[DIRECTION].format, vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn intermediates_are_sampled() {
        for spec in &formats().specs()[1..] {
            assert!(spec.usage().contains(vk::ImageUsageFlags::SAMPLED), "{}", spec.name);
        }
        assert!(!formats().specs()[SWAPCHAIN]
            .usage()
            .contains(vk::ImageUsageFlags::SAMPLED));
    }

    #[test]
    fn depth_view_excludes_stencil() {
        let formats = GBufferFormats {
            depth: vk::Format::D24_UNORM_S8_UINT,
            ..formats()
        };
        assert_eq!(formats.specs()[DEPTH].view_aspect(), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn plan_attachments_follow_defaults() {
        let plan = formats().plan_attachments();
        assert_eq!(plan.len(), ATTACHMENT_COUNT);
        assert!(plan[SWAPCHAIN].1.stores());
        assert!(!plan[POSITION].1.stores());
    }
}
