//! Sampler creation.

use crate::error::Result;
use ash::vk;

/// Filtering used by a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerFilter {
    /// Texel-exact reads, used for G-buffer attachments.
    Nearest,
    /// Trilinear reads, used for the density volume.
    Linear,
}

impl SamplerFilter {
    fn vk_filter(self) -> vk::Filter {
        match self {
            Self::Nearest => vk::Filter::NEAREST,
            Self::Linear => vk::Filter::LINEAR,
        }
    }
}

/// Create a clamp-to-edge sampler without mipmapping.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_sampler(device: &ash::Device, filter: SamplerFilter) -> Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter.vk_filter())
        .min_filter(filter.vk_filter())
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .min_lod(0.0)
        .max_lod(0.0)
        .unnormalized_coordinates(false);

    Ok(device.create_sampler(&create_info, None)?)
}
