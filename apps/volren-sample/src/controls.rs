//! Free-camera controls.
//!
//! WASD moves, Q/E lower and raise, Shift speeds up. Holding the right mouse
//! button turns the view. F3 cycles the debug view and R resets the camera.

use std::collections::HashSet;

use glam::{Vec2, Vec3};
use volren_app::{DeviceEvent, WindowEvent};
use volren_render::Camera;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Units per second.
const MOVE_SPEED: f32 = 4.0;
const SPRINT_MULTIPLIER: f32 = 3.0;
/// Radians per pixel of mouse motion.
const MOUSE_SENSITIVITY: f32 = 0.003;

/// One-shot requests raised by key presses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequests {
    pub cycle_debug_mode: bool,
    pub reset_camera: bool,
}

/// Keyboard and mouse state driving a [`Camera`].
#[derive(Debug, Default)]
pub struct CameraControls {
    held: HashSet<KeyCode>,
    looking: bool,
    mouse_delta: Vec2,
    requests: ControlRequests,
}

impl CameraControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a window event. Returns `true` when the event was consumed.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return false;
                };
                match event.state {
                    ElementState::Pressed => {
                        if !event.repeat {
                            self.press(code);
                        }
                        self.held.insert(code);
                    }
                    ElementState::Released => {
                        self.held.remove(&code);
                    }
                }
                true
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.looking = *state == ElementState::Pressed;
                true
            }
            WindowEvent::Focused(false) => {
                self.held.clear();
                self.looking = false;
                false
            }
            _ => false,
        }
    }

    /// Record raw mouse motion; only used while looking around.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.looking {
                self.mouse_delta += Vec2::new(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn press(&mut self, code: KeyCode) {
        match code {
            KeyCode::F3 => self.requests.cycle_debug_mode = true,
            KeyCode::KeyR => self.requests.reset_camera = true,
            _ => {}
        }
    }

    /// Take and clear the pending requests.
    pub fn take_requests(&mut self) -> ControlRequests {
        std::mem::take(&mut self.requests)
    }

    /// Movement direction as (right, up, forward), not normalized.
    fn movement(&self) -> Vec3 {
        let axis = |positive: KeyCode, negative: KeyCode| {
            f32::from(u8::from(self.held.contains(&positive)))
                - f32::from(u8::from(self.held.contains(&negative)))
        };
        Vec3::new(
            axis(KeyCode::KeyD, KeyCode::KeyA),
            axis(KeyCode::KeyE, KeyCode::KeyQ),
            axis(KeyCode::KeyW, KeyCode::KeyS),
        )
    }

    fn sprinting(&self) -> bool {
        self.held.contains(&KeyCode::ShiftLeft) || self.held.contains(&KeyCode::ShiftRight)
    }

    /// Apply accumulated input to `camera` for a frame of `dt` seconds.
    pub fn apply(&mut self, camera: &mut Camera, dt: f32) {
        let delta = std::mem::take(&mut self.mouse_delta);
        if delta != Vec2::ZERO {
            camera.rotate(-delta.x * MOUSE_SENSITIVITY, -delta.y * MOUSE_SENSITIVITY);
        }

        if let Some(direction) = self.movement().try_normalize() {
            let speed = if self.sprinting() {
                MOVE_SPEED * SPRINT_MULTIPLIER
            } else {
                MOVE_SPEED
            };
            camera.translate_local(direction * speed * dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn forward_moves_towards_origin() {
        let mut controls = CameraControls::new();
        controls.held.insert(KeyCode::KeyW);

        let mut camera = Camera::looking_at_origin(1.0);
        controls.apply(&mut camera, 0.5);
        assert_relative_eq!(camera.position.z, 10.0 - MOVE_SPEED * 0.5, epsilon = 1e-4);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut controls = CameraControls::new();
        controls.held.insert(KeyCode::KeyA);
        controls.held.insert(KeyCode::KeyD);

        let mut camera = Camera::looking_at_origin(1.0);
        let before = camera.position;
        controls.apply(&mut camera, 1.0);
        assert_eq!(camera.position, before);
    }

    #[test]
    fn requests_are_taken_once() {
        let mut controls = CameraControls::new();
        controls.press(KeyCode::F3);
        assert!(controls.take_requests().cycle_debug_mode);
        assert_eq!(controls.take_requests(), ControlRequests::default());
    }

    #[test]
    fn mouse_motion_ignored_unless_looking() {
        let mut controls = CameraControls::new();
        controls.handle_device_event(&DeviceEvent::MouseMotion { delta: (10.0, 0.0) });
        assert_eq!(controls.mouse_delta, Vec2::ZERO);

        controls.looking = true;
        controls.handle_device_event(&DeviceEvent::MouseMotion { delta: (10.0, 0.0) });
        assert_eq!(controls.mouse_delta, Vec2::new(10.0, 0.0));
    }
}
