//! Ray and bounding box math.

use glam::Vec3;

/// Ray for volume intersection.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray. The direction is normalized.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Create a ray from an eye position towards a target point.
    #[inline]
    pub fn towards(origin: Vec3, target: Vec3) -> Self {
        Self::new(origin, target - origin)
    }

    /// Get a point along the ray at distance t
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::UNIT_CENTERED
    }
}

impl Aabb {
    /// Unit cube centered at the origin, the volume proxy geometry.
    pub const UNIT_CENTERED: Self = Self {
        min: Vec3::splat(-0.5),
        max: Vec3::splat(0.5),
    };

    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if a point is inside the AABB (inclusive)
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Map a point to normalized `[0, 1]^3` coordinates relative to the box.
    ///
    /// This is the same mapping the geometry passes apply to proxy vertices
    /// to produce 3D texture coordinates.
    #[inline]
    pub fn normalize_point(&self, point: Vec3) -> Vec3 {
        (point - self.min) / self.size()
    }

    /// Ray-AABB slab test, returns `(t_near, t_far)` or `None` when missed.
    ///
    /// `t_near` is clamped to zero when the origin is inside the box.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv_dir = Vec3::ONE / ray.direction;

        let t1 = (self.min - ray.origin) * inv_dir;
        let t2 = (self.max - ray.origin) * inv_dir;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.max_element();
        let t_far = t_max.min_element();

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(5.0), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn normalize_point_maps_corners() {
        let aabb = Aabb::UNIT_CENTERED;
        assert_eq!(aabb.normalize_point(aabb.min), Vec3::ZERO);
        assert_eq!(aabb.normalize_point(aabb.max), Vec3::ONE);
        assert_eq!(aabb.normalize_point(Vec3::ZERO), Vec3::splat(0.5));
    }

    #[test]
    fn ray_through_unit_cube() {
        let aabb = Aabb::UNIT_CENTERED;
        let ray = Ray::towards(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let (near, far) = aabb.intersect_ray(&ray).unwrap();
        assert_relative_eq!(near, 9.5, epsilon = 1e-5);
        assert_relative_eq!(far, 10.5, epsilon = 1e-5);
    }

    #[test]
    fn ray_missing_box() {
        let aabb = Aabb::UNIT_CENTERED;
        let ray = Ray::new(Vec3::new(0.0, 2.0, 10.0), Vec3::NEG_Z);
        assert!(aabb.intersect_ray(&ray).is_none());
    }

    #[test]
    fn ray_starting_inside_clamps_near() {
        let aabb = Aabb::UNIT_CENTERED;
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let (near, far) = aabb.intersect_ray(&ray).unwrap();
        assert_eq!(near, 0.0);
        assert_relative_eq!(far, 0.5, epsilon = 1e-6);
        assert!(aabb.contains_point(ray.at(far)));
    }
}
