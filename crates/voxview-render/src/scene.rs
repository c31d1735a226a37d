// SPDX-License-Identifier: CEPL-1.0
use crate::Camera;
use glam::Vec3;

/// Per-frame viewer state handed to the renderer explicitly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scene {
    pub camera: Camera,
    /// 0..=100, added to the composited colour.
    pub brightness: f32,
    /// 0..=100, stretches the composited colour around mid grey.
    pub contrast: f32,
    pub show_transfer_strip: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            brightness: 0.0,
            contrast: 0.0,
            show_transfer_strip: true,
        }
    }
}

impl Scene {
    pub fn adjust_brightness(&mut self, delta: f32) {
        self.brightness = (self.brightness + delta).clamp(0.0, 100.0);
    }

    pub fn adjust_contrast(&mut self, delta: f32) {
        self.contrast = (self.contrast + delta).clamp(0.0, 100.0);
    }
}

/// Axis-aligned clip box in normalised texture space. Samples outside it are
/// skipped by the ray marcher.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlicingBounds {
    min: Vec3,
    max: Vec3,
}

impl Default for SlicingBounds {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        }
    }
}

impl SlicingBounds {
    /// Clamps into the unit cube; a max below its min collapses onto the min.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        let min = min.clamp(Vec3::ZERO, Vec3::ONE);
        let max = max.clamp(Vec3::ZERO, Vec3::ONE).max(min);
        Self { min, max }
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Move one axis of the lower bound, keeping it at or below the upper one.
    pub fn nudge_min(&self, axis: usize, delta: f32) -> Self {
        let mut min = self.min;
        min[axis] = (min[axis] + delta).clamp(0.0, self.max[axis]);
        Self::new(min, self.max)
    }

    pub fn nudge_max(&self, axis: usize, delta: f32) -> Self {
        let mut max = self.max;
        max[axis] = (max[axis] + delta).clamp(self.min[axis], 1.0);
        Self::new(self.min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_whole_volume() {
        let b = SlicingBounds::default();
        assert!(b.contains(Vec3::ZERO));
        assert!(b.contains(Vec3::ONE));
    }

    #[test]
    fn new_clamps_and_orders() {
        let b = SlicingBounds::new(Vec3::new(-1.0, 0.5, 0.2), Vec3::new(2.0, 0.25, 0.8));
        assert_eq!(b.min(), Vec3::new(0.0, 0.5, 0.2));
        assert_eq!(b.max(), Vec3::new(1.0, 0.5, 0.8));
    }

    #[test]
    fn nudges_do_not_cross() {
        let b = SlicingBounds::default().nudge_max(2, -0.7).nudge_min(2, 0.9);
        assert!((b.min().z - 0.3).abs() < 1e-6);
        assert!((b.max().z - 0.3).abs() < 1e-6);
        assert!(!b.contains(Vec3::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn brightness_contrast_stay_in_range() {
        let mut s = Scene::default();
        s.adjust_brightness(150.0);
        s.adjust_contrast(-5.0);
        assert_eq!((s.brightness, s.contrast), (100.0, 0.0));
    }
}
