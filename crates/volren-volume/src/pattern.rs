//! Procedural density patterns.

use std::str::FromStr;

use glam::{UVec3, Vec3};
use volren_core::Error;

use crate::grid::VolumeExtent;

/// A procedural density function over a voxel grid.
pub trait VolumePattern: Send + Sync {
    /// Density of a single voxel.
    fn density(&self, voxel: UVec3, extent: VolumeExtent) -> u8;
}

/// Grid center in voxel coordinates (texel centers at integer positions).
fn center(extent: VolumeExtent) -> Vec3 {
    (extent.as_uvec3().as_vec3() - Vec3::ONE) * 0.5
}

/// Three orthogonal bars crossing at the center of the grid.
///
/// A voxel is filled when at least two of its per-axis distances from the
/// center are within `half_width`, which is exactly the union of the x, y and
/// z bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossHair {
    /// Half the bar thickness in voxels.
    pub half_width: u32,
    /// Density written into filled voxels.
    pub density: u8,
}

impl CrossHair {
    /// Cross-hair with bars one eighth of the largest dimension thick.
    pub fn for_extent(extent: VolumeExtent) -> Self {
        Self {
            half_width: (extent.max_dimension() / 16).max(1),
            density: u8::MAX,
        }
    }

    /// Override the bar half width.
    #[must_use]
    pub const fn with_half_width(mut self, half_width: u32) -> Self {
        self.half_width = half_width;
        self
    }
}

impl VolumePattern for CrossHair {
    fn density(&self, voxel: UVec3, extent: VolumeExtent) -> u8 {
        let distance = (voxel.as_vec3() - center(extent)).abs();
        let limit = self.half_width as f32;
        let axes_inside = distance.to_array().iter().filter(|&&d| d <= limit).count();
        if axes_inside >= 2 {
            self.density
        } else {
            0
        }
    }
}

/// Hollow sphere centered in the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereShell {
    /// Shell radius in voxels.
    pub radius: f32,
    /// Shell thickness in voxels.
    pub thickness: f32,
    /// Density written into filled voxels.
    pub density: u8,
}

impl SphereShell {
    /// Shell filling 80% of the smallest dimension.
    pub fn for_extent(extent: VolumeExtent) -> Self {
        let min_dim = extent.width.min(extent.height).min(extent.depth) as f32;
        Self {
            radius: min_dim * 0.4,
            thickness: (min_dim / 16.0).max(1.0),
            density: u8::MAX,
        }
    }
}

impl VolumePattern for SphereShell {
    fn density(&self, voxel: UVec3, extent: VolumeExtent) -> u8 {
        let distance = voxel.as_vec3().distance(center(extent));
        if (distance - self.radius).abs() <= self.thickness * 0.5 {
            self.density
        } else {
            0
        }
    }
}

/// Pattern selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternKind {
    #[default]
    CrossHair,
    SphereShell,
}

impl PatternKind {
    /// Build the pattern for a given volume size.
    ///
    /// `half_width` only applies to the cross-hair.
    pub fn build(self, extent: VolumeExtent, half_width: Option<u32>) -> Box<dyn VolumePattern> {
        match self {
            Self::CrossHair => {
                let mut pattern = CrossHair::for_extent(extent);
                if let Some(half_width) = half_width {
                    pattern = pattern.with_half_width(half_width);
                }
                Box::new(pattern)
            }
            Self::SphereShell => Box::new(SphereShell::for_extent(extent)),
        }
    }
}

impl FromStr for PatternKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crosshair" | "cross-hair" => Ok(Self::CrossHair),
            "sphere" => Ok(Self::SphereShell),
            other => Err(Error::InvalidArgument(format!("unknown pattern '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::VolumeData;

    #[test]
    fn crosshair_fills_center_and_bars() {
        let extent = VolumeExtent::cube(32);
        let pattern = CrossHair::for_extent(extent);
        assert_eq!(pattern.half_width, 2);

        let volume = VolumeData::generate(extent, &pattern).unwrap();
        // Center voxel is on all three bars
        assert_eq!(volume.get(16, 16, 16), Some(255));
        // Along each bar, out to the faces
        assert_eq!(volume.get(0, 16, 16), Some(255));
        assert_eq!(volume.get(16, 31, 16), Some(255));
        assert_eq!(volume.get(16, 16, 0), Some(255));
        // Corners and off-axis voxels stay empty
        assert_eq!(volume.get(0, 0, 0), Some(0));
        assert_eq!(volume.get(0, 0, 16), Some(0));
        assert_eq!(volume.get(31, 31, 31), Some(0));
    }

    #[test]
    fn crosshair_is_symmetric() {
        let extent = VolumeExtent::cube(20);
        let volume = VolumeData::generate(extent, &CrossHair::for_extent(extent)).unwrap();
        for z in 0..20 {
            for y in 0..20 {
                for x in 0..20 {
                    let v = volume.get(x, y, z);
                    assert_eq!(v, volume.get(19 - x, y, z));
                    assert_eq!(v, volume.get(y, x, z));
                    assert_eq!(v, volume.get(x, z, y));
                }
            }
        }
    }

    #[test]
    fn crosshair_voxel_count() {
        // half width 1 on a 9^3 grid: bars are 3x3 in cross-section
        let extent = VolumeExtent::cube(9);
        let pattern = CrossHair {
            half_width: 1,
            density: 7,
        };
        let volume = VolumeData::generate(extent, &pattern).unwrap();
        let filled = volume.voxels().iter().filter(|&&v| v == 7).count();
        // Three 9x3x3 bars sharing a 3x3x3 core: 3 * 81 - 2 * 27
        assert_eq!(filled, 3 * 81 - 2 * 27);
    }

    #[test]
    fn sphere_shell_is_hollow() {
        let extent = VolumeExtent::cube(32);
        let volume = VolumeData::generate(extent, &SphereShell::for_extent(extent)).unwrap();
        assert_eq!(volume.get(16, 16, 16), Some(0));
        assert_eq!(volume.get(0, 0, 0), Some(0));
        let filled = volume.voxels().iter().filter(|&&v| v > 0).count();
        assert!(filled > 0);
    }

    #[test]
    fn pattern_kind_parses() {
        assert_eq!("crosshair".parse::<PatternKind>().unwrap(), PatternKind::CrossHair);
        assert_eq!("sphere".parse::<PatternKind>().unwrap(), PatternKind::SphereShell);
        assert!("cube".parse::<PatternKind>().is_err());
    }
}
