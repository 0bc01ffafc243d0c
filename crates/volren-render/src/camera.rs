//! Camera and view management.

use glam::{Mat4, Vec3, Vec4};

/// Position of the free camera at startup.
pub const DEFAULT_CAMERA_POSITION: Vec3 = Vec3::new(0.0, 0.0, 10.0);

const MAX_PITCH: f32 = 1.55;

/// Perspective camera using Vulkan clip conventions (Y down, depth 0..1).
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(
            DEFAULT_CAMERA_POSITION,
            Vec3::ZERO,
            Vec3::Y,
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            0.1,
            100.0,
        )
    }
}

impl Camera {
    /// Create a new camera.
    pub fn new(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            direction: (target - position).try_normalize().unwrap_or(Vec3::NEG_Z),
            up,
            fov,
            aspect,
            near,
            far,
        }
    }

    /// Free camera at the default position looking at the origin.
    pub fn looking_at_origin(aspect: f32) -> Self {
        Self {
            aspect,
            ..Self::default()
        }
    }

    /// Set the aspect ratio from a framebuffer size. Zero sizes are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Camera-space right vector.
    pub fn right(&self) -> Vec3 {
        self.direction.cross(self.up).try_normalize().unwrap_or(Vec3::X)
    }

    /// Move relative to the view: `delta` is (right, up, forward).
    pub fn translate_local(&mut self, delta: Vec3) {
        self.position += self.right() * delta.x + self.up * delta.y + self.direction * delta.z;
    }

    /// Rotate the view direction by yaw around world up and pitch around the
    /// camera right axis. Pitch is clamped short of the poles.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let current_pitch = self.direction.y.clamp(-1.0, 1.0).asin();
        let new_pitch = (current_pitch + pitch).clamp(-MAX_PITCH, MAX_PITCH);
        let current_yaw = self.direction.x.atan2(-self.direction.z);
        let new_yaw = current_yaw + yaw;

        self.direction = Vec3::new(
            new_yaw.sin() * new_pitch.cos(),
            new_pitch.sin(),
            -new_yaw.cos() * new_pitch.cos(),
        );
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    /// Projection with Y flipped for Vulkan's downward framebuffer axis.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        projection.y_axis.y = -projection.y_axis.y;
        projection
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Push constants of both ray-direction passes.
///
/// Must match `geometry.vert` / `raydir_front.frag`:
/// ```glsl
/// layout(push_constant) uniform GeometryPush {
///     mat4 mvp;   // 64 bytes
///     vec4 tint;  // 16 bytes
/// } pc;
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GeometryPushConstants {
    pub mvp: [[f32; 4]; 4],
    /// Albedo written by the front-face pass.
    pub tint: [f32; 4],
}

impl GeometryPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(camera: &Camera, model: Mat4, tint: Vec4) -> Self {
        Self {
            mvp: (camera.view_projection_matrix() * model).to_cols_array_2d(),
            tint: tint.to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn project(camera: &Camera, point: Vec3) -> Vec3 {
        let clip = camera.view_projection_matrix() * point.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn default_camera_faces_origin() {
        let camera = Camera::default();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
        assert_relative_eq!(camera.direction.z, -1.0);
        let center = project(&camera, Vec3::ZERO);
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn depth_range_is_zero_to_one() {
        let camera = Camera::default();
        let near = project(&camera, Vec3::new(0.0, 0.0, 10.0 - camera.near));
        let far = project(&camera, Vec3::new(0.0, 0.0, 10.0 - camera.far));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn up_maps_to_top_of_framebuffer() {
        let camera = Camera::default();
        let above = project(&camera, Vec3::new(0.0, 1.0, 0.0));
        assert!(above.y < 0.0, "y = {}", above.y);
    }

    #[test]
    fn rotation_clamps_pitch() {
        let mut camera = Camera::default();
        camera.rotate(0.0, 10.0);
        assert!(camera.direction.y < 1.0);
        assert_relative_eq!(camera.direction.length(), 1.0, epsilon = 1e-5);

        let mut camera = Camera::default();
        camera.rotate(std::f32::consts::FRAC_PI_2, 0.0);
        assert_relative_eq!(camera.direction.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn local_translation_moves_forward() {
        let mut camera = Camera::default();
        camera.translate_local(Vec3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(camera.position.z, 8.0, epsilon = 1e-5);
    }

    #[test]
    fn push_constant_layout() {
        assert_eq!(GeometryPushConstants::SIZE, 80);
        let push = GeometryPushConstants::new(&Camera::default(), Mat4::IDENTITY, Vec4::ONE);
        assert_eq!(push.tint, [1.0; 4]);
    }
}
