// SPDX-License-Identifier: CEPL-1.0
//! Orbit camera around the volume centre. The camera looks along its local
//! -Y axis with +Z up, so the projection carries a fixed basis change.

use glam::{Mat4, Quat, Vec2, Vec3};

pub const FOV_Y_DEGREES: f32 = 40.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 10.0;
pub const MIN_RADIUS: f32 = 0.1;
pub const MAX_RADIUS: f32 = 10.0;
/// Degrees of rotation per pixel of drag.
pub const ROTATE_SENSITIVITY: f32 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    center: Vec3,
    orientation: Quat,
    radius: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            orientation: Quat::from_axis_angle(Vec3::Z, 180f32.to_radians()),
            radius: 3.0,
        }
    }
}

impl Camera {
    /// Yaw about world Z by `-delta.x`, then pitch about the camera's right
    /// axis by `delta.y`.
    pub fn rotate(&mut self, delta: Vec2) {
        let angle = delta * ROTATE_SENSITIVITY;

        let yaw = Quat::from_axis_angle(Vec3::Z, (-angle.x).to_radians());
        self.orientation = (yaw * self.orientation).normalize();

        let right = self.orientation * Vec3::X;
        let pitch = Quat::from_axis_angle(right.normalize(), angle.y.to_radians());
        self.orientation = (pitch * self.orientation).normalize();
    }

    /// Positive deltas move towards the centre.
    pub fn zoom(&mut self, delta: f32) {
        self.radius = (self.radius - delta).clamp(MIN_RADIUS, MAX_RADIUS);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn position(&self) -> Vec3 {
        let forward = self.orientation * Vec3::NEG_Y;
        self.center - forward * self.radius
    }

    pub fn view(&self) -> Mat4 {
        let rotation = Mat4::from_quat(self.orientation).transpose();
        rotation * Mat4::from_translation(-self.position())
    }
}

/// Perspective for a viewport of the given aspect, including the basis change
/// from the camera's -Y-forward frame into clip space.
pub fn projection(aspect: f32) -> Mat4 {
    let basis = Mat4::from_rotation_x(90f32.to_radians()) * Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
    Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR) * basis
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn starts_three_units_down_negative_y() {
        let p = Camera::default().position();
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, -3.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn view_maps_eye_to_origin() {
        let mut c = Camera::default();
        c.rotate(Vec2::new(37.0, -12.0));
        let eye = c.view().transform_point3(c.position());
        assert!(eye.length() < 1e-5, "{eye:?}");
    }

    #[test]
    fn rotation_preserves_distance() {
        let mut c = Camera::default();
        c.rotate(Vec2::new(120.0, 45.0));
        assert_relative_eq!(c.position().length(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn full_turn_of_yaw_returns_home() {
        let mut c = Camera::default();
        let home = c.position();
        c.rotate(Vec2::new(360.0 / ROTATE_SENSITIVITY, 0.0));
        assert!((c.position() - home).length() < 1e-4);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut c = Camera::default();
        c.zoom(100.0);
        assert_eq!(c.radius(), MIN_RADIUS);
        c.zoom(-100.0);
        assert_eq!(c.radius(), MAX_RADIUS);
    }

    #[test]
    fn centre_projects_inside_clip_volume() {
        let c = Camera::default();
        let clip = projection(16.0 / 9.0) * c.view() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z), "{ndc:?}");
    }
}
