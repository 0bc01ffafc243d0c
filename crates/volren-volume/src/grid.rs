//! Dense voxel grids.

use glam::{UVec3, Vec3};
use rayon::prelude::*;
use volren_core::constants::MAX_VOLUME_DIMENSION;
use volren_core::{Error, Result};

use crate::pattern::VolumePattern;

/// Size of a volume in voxels per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl VolumeExtent {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Create a cubic extent.
    pub const fn cube(size: u32) -> Self {
        Self::new(size, size, size)
    }

    /// Total number of voxels. Fails when the count does not fit in `usize`.
    pub fn voxel_count(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(self.depth as usize))
            .ok_or_else(|| Error::InvalidArgument(format!("volume {self:?} is too large to address")))
    }

    /// Reject empty extents and edges no 3D image can have.
    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "volume extent must be non-zero, got {self:?}"
            )));
        }
        if self.max_dimension() > MAX_VOLUME_DIMENSION {
            return Err(Error::InvalidArgument(format!(
                "volume edge {} exceeds {MAX_VOLUME_DIMENSION}",
                self.max_dimension()
            )));
        }
        Ok(())
    }

    /// Number of voxels in one z slice.
    pub const fn slice_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether any axis is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// Largest axis length.
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height).max(self.depth)
    }

    /// Extent as a vector.
    pub const fn as_uvec3(&self) -> UVec3 {
        UVec3::new(self.width, self.height, self.depth)
    }
}

/// One byte of density per voxel, x fastest, then y, then z.
///
/// The byte layout matches a tightly packed `R8_UNORM` 3D image so the
/// voxels can be copied into a staging buffer unchanged.
#[derive(Debug, Clone)]
pub struct VolumeData {
    extent: VolumeExtent,
    voxels: Vec<u8>,
}

impl VolumeData {
    /// Wrap existing voxel bytes.
    pub fn from_voxels(extent: VolumeExtent, voxels: Vec<u8>) -> Result<Self> {
        extent.validate()?;
        let expected = extent.voxel_count()?;
        if voxels.len() != expected {
            return Err(Error::VoxelCountMismatch {
                expected,
                actual: voxels.len(),
            });
        }
        Ok(Self { extent, voxels })
    }

    /// Fill a new volume from a density pattern.
    ///
    /// Slices along z are generated in parallel. The voxel buffer is
    /// reserved fallibly, so a volume larger than memory is an error.
    pub fn generate<P: VolumePattern + ?Sized>(extent: VolumeExtent, pattern: &P) -> Result<Self> {
        extent.validate()?;
        let count = extent.voxel_count()?;

        let mut voxels = Vec::new();
        voxels.try_reserve_exact(count).map_err(|e| {
            Error::InvalidArgument(format!("cannot allocate {count} voxels for {extent:?}: {e}"))
        })?;
        voxels.resize(count, 0u8);
        voxels
            .par_chunks_mut(extent.slice_len())
            .enumerate()
            .for_each(|(z, slice)| {
                let z = z as u32;
                for y in 0..extent.height {
                    let row = y as usize * extent.width as usize;
                    for x in 0..extent.width {
                        slice[row + x as usize] = pattern.density(UVec3::new(x, y, z), extent);
                    }
                }
            });

        let filled = voxels.iter().filter(|&&v| v > 0).count();
        tracing::debug!(
            "Generated {}x{}x{} volume, {} of {} voxels filled",
            extent.width,
            extent.height,
            extent.depth,
            filled,
            voxels.len()
        );

        Ok(Self { extent, voxels })
    }

    /// Volume size.
    pub const fn extent(&self) -> VolumeExtent {
        self.extent
    }

    /// Raw voxel bytes.
    pub fn voxels(&self) -> &[u8] {
        &self.voxels
    }

    /// Size of the voxel data in bytes.
    pub fn byte_len(&self) -> u64 {
        self.voxels.len() as u64
    }

    /// Linear index of a voxel.
    #[inline]
    pub const fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let e = self.extent;
        (z as usize * e.height as usize + y as usize) * e.width as usize + x as usize
    }

    /// Density at a voxel, or `None` outside the grid.
    pub fn get(&self, x: u32, y: u32, z: u32) -> Option<u8> {
        let e = self.extent;
        if x >= e.width || y >= e.height || z >= e.depth {
            return None;
        }
        Some(self.voxels[self.index(x, y, z)])
    }

    /// Trilinear density lookup at normalized coordinates, in `[0, 1]`.
    ///
    /// Follows the sampler the compositing shader uses: texel centers at
    /// half-integer positions and clamp-to-edge addressing.
    pub fn sample_trilinear(&self, uvw: Vec3) -> f32 {
        let size = self.extent.as_uvec3().as_vec3();
        let max = size - Vec3::ONE;
        let p = (uvw * size - Vec3::splat(0.5)).clamp(Vec3::ZERO, max);

        let p0 = p.floor();
        let f = p - p0;
        let p1 = (p0 + Vec3::ONE).min(max);

        let fetch = |x: f32, y: f32, z: f32| -> f32 {
            f32::from(self.voxels[self.index(x as u32, y as u32, z as u32)]) / 255.0
        };

        let c00 = fetch(p0.x, p0.y, p0.z) * (1.0 - f.x) + fetch(p1.x, p0.y, p0.z) * f.x;
        let c10 = fetch(p0.x, p1.y, p0.z) * (1.0 - f.x) + fetch(p1.x, p1.y, p0.z) * f.x;
        let c01 = fetch(p0.x, p0.y, p1.z) * (1.0 - f.x) + fetch(p1.x, p0.y, p1.z) * f.x;
        let c11 = fetch(p0.x, p1.y, p1.z) * (1.0 - f.x) + fetch(p1.x, p1.y, p1.z) * f.x;

        let c0 = c00 * (1.0 - f.y) + c10 * f.y;
        let c1 = c01 * (1.0 - f.y) + c11 * f.y;

        c0 * (1.0 - f.z) + c1 * f.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Gradient;

    impl VolumePattern for Gradient {
        fn density(&self, voxel: UVec3, _extent: VolumeExtent) -> u8 {
            (voxel.x * 100) as u8
        }
    }

    #[test]
    fn index_is_x_fastest() {
        let volume = VolumeData::from_voxels(VolumeExtent::new(4, 3, 2), vec![0; 24]).unwrap();
        assert_eq!(volume.index(0, 0, 0), 0);
        assert_eq!(volume.index(1, 0, 0), 1);
        assert_eq!(volume.index(0, 1, 0), 4);
        assert_eq!(volume.index(0, 0, 1), 12);
        assert_eq!(volume.index(3, 2, 1), 23);
    }

    #[test]
    fn generate_matches_pattern() {
        let volume = VolumeData::generate(VolumeExtent::new(3, 2, 2), &Gradient).unwrap();
        assert_eq!(volume.byte_len(), 12);
        assert_eq!(volume.get(0, 1, 1), Some(0));
        assert_eq!(volume.get(1, 0, 1), Some(100));
        assert_eq!(volume.get(2, 1, 0), Some(200));
        assert_eq!(volume.get(3, 0, 0), None);
    }

    #[test]
    fn zero_extent_is_rejected() {
        assert!(VolumeData::generate(VolumeExtent::new(0, 4, 4), &Gradient).is_err());
        assert!(VolumeData::from_voxels(VolumeExtent::cube(0), Vec::new()).is_err());
    }

    #[test]
    fn oversized_volume_is_an_error() {
        let pattern = crate::pattern::CrossHair::for_extent(VolumeExtent::cube(100_000));
        assert!(matches!(
            VolumeData::generate(VolumeExtent::cube(100_000), &pattern),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn voxel_count_is_checked() {
        assert_eq!(VolumeExtent::new(4, 3, 2).voxel_count(), Ok(24));
        if usize::BITS == 32 {
            assert!(VolumeExtent::cube(4096).voxel_count().is_err());
        }
    }

    #[test]
    fn voxel_count_mismatch_is_rejected() {
        assert_eq!(
            VolumeData::from_voxels(VolumeExtent::cube(2), vec![0; 7]).err(),
            Some(Error::VoxelCountMismatch {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn trilinear_hits_texel_centers() {
        let volume = VolumeData::generate(VolumeExtent::new(3, 1, 1), &Gradient).unwrap();
        // Center of texel 1 along x
        let v = volume.sample_trilinear(Vec3::new(0.5, 0.5, 0.5));
        assert_relative_eq!(v, 100.0 / 255.0, epsilon = 1e-6);
        // Halfway between texels 1 and 2
        let v = volume.sample_trilinear(Vec3::new(2.0 / 3.0, 0.5, 0.5));
        assert_relative_eq!(v, 150.0 / 255.0, epsilon = 1e-5);
    }

    #[test]
    fn trilinear_clamps_to_edge() {
        let volume = VolumeData::generate(VolumeExtent::new(3, 1, 1), &Gradient).unwrap();
        assert_relative_eq!(volume.sample_trilinear(Vec3::new(-1.0, 0.5, 0.5)), 0.0);
        assert_relative_eq!(
            volume.sample_trilinear(Vec3::new(2.0, 0.5, 0.5)),
            200.0 / 255.0,
            epsilon = 1e-6
        );
    }
}
