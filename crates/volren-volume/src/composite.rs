//! CPU reference of the ray-direction compositing technique.
//!
//! The GPU renders the proxy cube twice: back faces record where each view ray
//! leaves the volume, front faces record where it enters together with the
//! entry→exit direction. The lighting pass then marches that segment through
//! the density texture. [`ray_segment`] and [`march`] compute the same values
//! on the CPU so the shader math can be checked without a device.

use std::str::FromStr;

use glam::{Vec3, Vec4};
use volren_core::{Aabb, Error, Ray};

use crate::grid::VolumeData;

/// Order in which samples along a segment are blended.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeOrder {
    /// Accumulate from the entry point, under-operator, with early exit.
    #[default]
    FrontToBack = 0,
    /// Accumulate from the exit point, over-operator.
    BackToFront = 1,
}

impl CompositeOrder {
    /// Value pushed to the compositing shader.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl FromStr for CompositeOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" | "front-to-back" => Ok(Self::FrontToBack),
            "back" | "back-to-front" => Ok(Self::BackToFront),
            other => Err(Error::InvalidArgument(format!(
                "unknown composite order '{other}'"
            ))),
        }
    }
}

/// Ray entry and exit in normalized volume coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySegment {
    /// Front-face hit, written by the front ray-direction pass.
    pub entry: Vec3,
    /// Back-face hit, written by the back ray-direction pass.
    pub exit: Vec3,
}

impl RaySegment {
    /// Unnormalized entry→exit vector, as stored in the direction attachment.
    pub fn direction(&self) -> Vec3 {
        self.exit - self.entry
    }

    /// Segment length in normalized volume units.
    pub fn length(&self) -> f32 {
        self.direction().length()
    }

    /// Direction attachment texel: xyz = exit − entry, w = length.
    pub fn direction_texel(&self) -> Vec4 {
        self.direction().extend(self.length())
    }
}

/// Intersect a view ray with the volume bounds.
pub fn ray_segment(bounds: &Aabb, ray: &Ray) -> Option<RaySegment> {
    let (near, far) = bounds.intersect_ray(ray)?;
    Some(RaySegment {
        entry: bounds.normalize_point(ray.at(near)),
        exit: bounds.normalize_point(ray.at(far)),
    })
}

/// Parameters of the compositing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeParams {
    /// Number of samples along a full segment.
    pub steps: u32,
    pub order: CompositeOrder,
    /// Extinction per unit density per normalized unit length.
    pub density_scale: f32,
    /// Emission color of fully dense voxels.
    pub tint: Vec3,
    /// Front-to-back stops once accumulated alpha reaches this value.
    pub early_exit_alpha: Option<f32>,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            steps: volren_core::constants::DEFAULT_MARCH_STEPS,
            order: CompositeOrder::FrontToBack,
            density_scale: 8.0,
            tint: Vec3::ONE,
            early_exit_alpha: Some(0.99),
        }
    }
}

/// March a segment through the volume and return premultiplied RGBA.
pub fn march(volume: &VolumeData, segment: &RaySegment, params: &CompositeParams) -> [f32; 4] {
    let length = segment.length();
    if params.steps == 0 || length <= f32::EPSILON {
        return [0.0; 4];
    }

    let dt = length / params.steps as f32;
    let step = segment.direction() / params.steps as f32;

    // Sample at the midpoint of each step
    let sample = |i: u32| -> (Vec3, f32) {
        let position = segment.entry + step * (i as f32 + 0.5);
        let density = volume.sample_trilinear(position);
        let alpha = 1.0 - (-density * params.density_scale * dt).exp();
        (params.tint * density, alpha)
    };

    let mut color = Vec3::ZERO;
    let mut alpha = 0.0f32;

    match params.order {
        CompositeOrder::FrontToBack => {
            for i in 0..params.steps {
                let (c, a) = sample(i);
                let weight = (1.0 - alpha) * a;
                color += c * weight;
                alpha += weight;
                if params.early_exit_alpha.is_some_and(|limit| alpha >= limit) {
                    break;
                }
            }
        }
        CompositeOrder::BackToFront => {
            for i in (0..params.steps).rev() {
                let (c, a) = sample(i);
                color = c * a + color * (1.0 - a);
                alpha = a + alpha * (1.0 - a);
            }
        }
    }

    [color.x, color.y, color.z, alpha]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::VolumeExtent;
    use crate::pattern::CrossHair;
    use approx::assert_relative_eq;

    fn crosshair() -> VolumeData {
        let extent = VolumeExtent::cube(32);
        VolumeData::generate(extent, &CrossHair::for_extent(extent)).unwrap()
    }

    fn eye_ray(eye: Vec3) -> Ray {
        Ray::towards(eye, Vec3::ZERO)
    }

    #[test]
    fn segment_through_center() {
        let segment = ray_segment(&Aabb::UNIT_CENTERED, &eye_ray(Vec3::new(0.0, 0.0, 10.0)))
            .expect("ray hits the cube");
        assert_relative_eq!(segment.entry.z, 1.0, epsilon = 1e-5);
        assert_relative_eq!(segment.exit.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(segment.length(), 1.0, epsilon = 1e-5);
        let texel = segment.direction_texel();
        assert_relative_eq!(texel.z, -1.0, epsilon = 1e-5);
        assert_relative_eq!(texel.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn missed_ray_has_no_segment() {
        let ray = Ray::new(Vec3::new(3.0, 0.0, 10.0), Vec3::NEG_Z);
        assert!(ray_segment(&Aabb::UNIT_CENTERED, &ray).is_none());
    }

    #[test]
    fn both_orders_agree_without_early_exit() {
        let volume = crosshair();
        let segment = ray_segment(
            &Aabb::UNIT_CENTERED,
            &eye_ray(Vec3::new(0.3, 0.2, 10.0)),
        )
        .unwrap();

        let front = CompositeParams {
            early_exit_alpha: None,
            ..CompositeParams::default()
        };
        let back = CompositeParams {
            order: CompositeOrder::BackToFront,
            ..front
        };

        let a = march(&volume, &segment, &front);
        let b = march(&volume, &segment, &back);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-4);
        }
    }

    #[test]
    fn center_ray_hits_density() {
        let volume = crosshair();
        let segment = ray_segment(&Aabb::UNIT_CENTERED, &eye_ray(Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        let [r, _, _, a] = march(&volume, &segment, &CompositeParams::default());
        assert!(a > 0.5, "alpha {a}");
        assert!(r > 0.0);
    }

    #[test]
    fn empty_volume_is_transparent() {
        let volume =
            VolumeData::from_voxels(VolumeExtent::cube(4), vec![0; 64]).unwrap();
        let segment = ray_segment(&Aabb::UNIT_CENTERED, &eye_ray(Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        assert_eq!(march(&volume, &segment, &CompositeParams::default()), [0.0; 4]);
    }

    #[test]
    fn zero_length_segment_is_transparent() {
        let volume = crosshair();
        let segment = RaySegment {
            entry: Vec3::splat(0.5),
            exit: Vec3::splat(0.5),
        };
        assert_eq!(march(&volume, &segment, &CompositeParams::default()), [0.0; 4]);
    }

    #[test]
    fn early_exit_caps_alpha() {
        let volume = VolumeData::from_voxels(VolumeExtent::cube(4), vec![255; 64]).unwrap();
        let segment = ray_segment(&Aabb::UNIT_CENTERED, &eye_ray(Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();
        let params = CompositeParams {
            density_scale: 100.0,
            early_exit_alpha: Some(0.5),
            ..CompositeParams::default()
        };
        let [.., a] = march(&volume, &segment, &params);
        assert!(a >= 0.5);
        assert!(a < 0.99);
    }

    #[test]
    fn order_parses() {
        assert_eq!("front".parse::<CompositeOrder>().unwrap(), CompositeOrder::FrontToBack);
        assert_eq!("back".parse::<CompositeOrder>().unwrap(), CompositeOrder::BackToFront);
        assert!("sideways".parse::<CompositeOrder>().is_err());
    }
}
