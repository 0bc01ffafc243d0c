//! Format selection.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 4] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Pick the first candidate whose optimal-tiling features contain `required`.
pub fn select_depth_format(
    candidates: &[vk::Format],
    required: vk::FormatFeatureFlags,
    optimal_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| optimal_features(format).contains(required))
        .ok_or_else(|| {
            GpuError::UnsupportedFormat(format!(
                "none of {candidates:?} supports {required:?}"
            ))
        })
}

/// Depth format usable as an attachment and sampled by later passes.
pub fn suitable_depth_format(gpu: &GpuContext) -> Result<vk::Format> {
    let required = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        | vk::FormatFeatureFlags::SAMPLED_IMAGE;
    let format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, required, |format| unsafe {
        gpu.instance()
            .get_physical_device_format_properties(gpu.physical_device(), format)
            .optimal_tiling_features
    })?;
    tracing::debug!("Selected depth format {:?}", format);
    Ok(format)
}

/// Whether a format carries a depth component.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Whether a format carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect mask covering every component of a format, as barriers require.
pub fn full_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match (is_depth_format(format), has_stencil_component(format)) {
        (true, true) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        (true, false) => vk::ImageAspectFlags::DEPTH,
        (false, true) => vk::ImageAspectFlags::STENCIL,
        (false, false) => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH_SAMPLED: vk::FormatFeatureFlags = vk::FormatFeatureFlags::from_raw(
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT.as_raw()
            | vk::FormatFeatureFlags::SAMPLED_IMAGE.as_raw(),
    );

    #[test]
    fn picks_first_supported_candidate() {
        let format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, DEPTH_SAMPLED, |f| {
            if f == vk::Format::D24_UNORM_S8_UINT || f == vk::Format::D16_UNORM {
                DEPTH_SAMPLED
            } else {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            }
        })
        .unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn prefers_d32() {
        let format =
            select_depth_format(&DEPTH_FORMAT_CANDIDATES, DEPTH_SAMPLED, |_| DEPTH_SAMPLED)
                .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn fails_without_support() {
        let result = select_depth_format(&DEPTH_FORMAT_CANDIDATES, DEPTH_SAMPLED, |_| {
            vk::FormatFeatureFlags::empty()
        });
        assert!(matches!(result, Err(GpuError::UnsupportedFormat(_))));
    }

    #[test]
    fn depth_format_detection() {
        assert!(is_depth_format(vk::Format::D32_SFLOAT));
        assert!(is_depth_format(vk::Format::D24_UNORM_S8_UINT));
        assert!(!is_depth_format(vk::Format::R8G8B8A8_UNORM));
        assert!(!is_depth_format(vk::Format::R32G32B32A32_SFLOAT));
    }

    #[test]
    fn barrier_aspects() {
        assert_eq!(
            full_aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(full_aspect_mask(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            full_aspect_mask(vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
    }
}
