// SPDX-License-Identifier: CEPL-1.0
//! Viewer state owned by the frontend and handed to the renderer each frame.

use std::path::PathBuf;

use glam::Vec3;
use tracing::debug;
use voxview_data::{Gradient, TransferFunction};
use voxview_platform::UserIntent;
use voxview_render::{Scene, SlicingBounds};

use crate::config::ViewerCfg;

/// What the renderer has to hear about after an intent was applied.
#[derive(Debug, PartialEq)]
pub enum Change {
    None,
    /// Only per-frame state moved; a redraw picks it up.
    Scene,
    Slicing(SlicingBounds),
    /// The discretised lookup table differs from the one last handed out.
    TransferFunction,
    Import(PathBuf),
}

/// Which curve marker edits act on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MarkerSet {
    Color,
    #[default]
    Alpha,
}

pub struct Viewer {
    pub scene: Scene,
    slicing: SlicingBounds,
    axis: usize,
    gradient: Gradient,
    marker_set: MarkerSet,
    selected: usize,
    transfer: TransferFunction,
    transfer_resolution: usize,
    initial: ViewerCfg,
}

impl Viewer {
    pub fn new(cfg: &ViewerCfg, gradient: Gradient) -> Self {
        let transfer_resolution = cfg.transfer_resolution.max(1);
        let mut v = Self {
            scene: Scene::default(),
            slicing: SlicingBounds::default(),
            axis: 0,
            transfer: gradient.to_transfer_function(transfer_resolution),
            gradient,
            marker_set: MarkerSet::default(),
            selected: 0,
            transfer_resolution,
            initial: *cfg,
        };
        v.reset();
        v
    }

    pub fn slicing(&self) -> SlicingBounds {
        self.slicing
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn transfer_function(&self) -> TransferFunction {
        self.transfer.clone()
    }

    pub fn gradient(&self) -> &Gradient {
        &self.gradient
    }

    pub fn marker_set(&self) -> MarkerSet {
        self.marker_set
    }

    /// Index into the active curve's markers.
    pub fn selected_marker(&self) -> usize {
        self.selected
    }

    fn marker_count(&self) -> usize {
        match self.marker_set {
            MarkerSet::Color => self.gradient.color_markers().len(),
            MarkerSet::Alpha => self.gradient.alpha_markers().len(),
        }
    }

    fn marker_location(&self, index: usize) -> Option<f32> {
        match self.marker_set {
            MarkerSet::Color => self.gradient.color_markers().get(index).map(|m| m.location),
            MarkerSet::Alpha => self.gradient.alpha_markers().get(index).map(|m| m.location),
        }
    }

    /// Camera home, slicing and display controls back to their configured
    /// values. The slicing axis selection is kept.
    pub fn reset(&mut self) {
        let cfg = self.initial;
        self.scene.camera.reset();
        self.scene.brightness = cfg.brightness.clamp(0.0, 100.0);
        self.scene.contrast = cfg.contrast.clamp(0.0, 100.0);
        self.scene.show_transfer_strip = cfg.show_transfer_strip;
        self.slicing = SlicingBounds::new(Vec3::from(cfg.slice_min), Vec3::from(cfg.slice_max));
    }

    pub fn apply(&mut self, intent: UserIntent) -> Change {
        match intent {
            UserIntent::Orbit(delta) => {
                self.scene.camera.rotate(delta);
                Change::Scene
            }
            UserIntent::Zoom(delta) => {
                self.scene.camera.zoom(delta);
                Change::Scene
            }
            UserIntent::AdjustBrightness(d) => {
                self.scene.adjust_brightness(d);
                debug!("brightness {}", self.scene.brightness);
                Change::Scene
            }
            UserIntent::AdjustContrast(d) => {
                self.scene.adjust_contrast(d);
                debug!("contrast {}", self.scene.contrast);
                Change::Scene
            }
            UserIntent::SelectSliceAxis(axis) if axis < 3 => {
                self.axis = axis;
                debug!("slicing axis {}", ["x", "y", "z"][axis]);
                Change::None
            }
            UserIntent::SelectSliceAxis(_) => Change::None,
            UserIntent::MoveSliceMin(d) => self.move_slicing(self.slicing.nudge_min(self.axis, d)),
            UserIntent::MoveSliceMax(d) => self.move_slicing(self.slicing.nudge_max(self.axis, d)),
            UserIntent::Reset => {
                self.reset();
                Change::Slicing(self.slicing)
            }
            UserIntent::ToggleTransferStrip => {
                self.scene.show_transfer_strip = !self.scene.show_transfer_strip;
                Change::Scene
            }
            UserIntent::ToggleMarkerSet => {
                self.marker_set = match self.marker_set {
                    MarkerSet::Color => MarkerSet::Alpha,
                    MarkerSet::Alpha => MarkerSet::Color,
                };
                self.selected = self.selected.min(self.marker_count() - 1);
                debug!("editing {:?} markers", self.marker_set);
                Change::None
            }
            UserIntent::SelectMarker(step) => {
                let last = self.marker_count() as i64 - 1;
                self.selected = (self.selected as i64 + i64::from(step)).clamp(0, last) as usize;
                Change::None
            }
            UserIntent::AddMarker => self.add_marker(),
            UserIntent::RemoveMarker => self.remove_marker(),
            UserIntent::MoveMarker(d) => self.move_marker(d),
            UserIntent::AdjustMarker(d) => self.adjust_marker(d),
            UserIntent::Import(path) => Change::Import(path),
        }
    }

    /// Midway between the selection and its right neighbour (left one for the
    /// last marker), valued on the current curve so the shape is unchanged.
    fn add_marker(&mut self) -> Change {
        let (lo, hi) = if self.selected + 1 < self.marker_count() {
            (self.selected, self.selected + 1)
        } else {
            (self.selected - 1, self.selected)
        };
        let (Some(a), Some(b)) = (self.marker_location(lo), self.marker_location(hi)) else {
            return Change::None;
        };
        let at = 0.5 * (a + b);
        self.selected = match self.marker_set {
            MarkerSet::Color => {
                let value = self.gradient.sample_color(at);
                self.gradient.add_color_marker(at, value)
            }
            MarkerSet::Alpha => {
                let value = self.gradient.sample_alpha(at);
                self.gradient.add_alpha_marker(at, value)
            }
        };
        debug!("added {:?} marker {} at {at:.3}", self.marker_set, self.selected);
        self.retabulate()
    }

    /// End markers are pinned and stay.
    fn remove_marker(&mut self) -> Change {
        let removed = match self.marker_set {
            MarkerSet::Color => self.gradient.remove_color_marker(self.selected),
            MarkerSet::Alpha => self.gradient.remove_alpha_marker(self.selected),
        };
        if !removed {
            return Change::None;
        }
        self.selected -= 1;
        self.retabulate()
    }

    fn move_marker(&mut self, delta: f32) -> Change {
        let Some(at) = self.marker_location(self.selected) else {
            return Change::None;
        };
        let moved = match self.marker_set {
            MarkerSet::Color => self.gradient.move_color_marker(self.selected, at + delta),
            MarkerSet::Alpha => self.gradient.move_alpha_marker(self.selected, at + delta),
        };
        match moved {
            Some(index) => {
                self.selected = index;
                self.retabulate()
            }
            None => Change::None,
        }
    }

    fn adjust_marker(&mut self, delta: f32) -> Change {
        let i = self.selected;
        let set = match self.marker_set {
            MarkerSet::Color => match self.gradient.color_markers().get(i) {
                Some(m) => {
                    let value = m.value + Vec3::splat(delta);
                    self.gradient.set_color(i, value)
                }
                None => false,
            },
            MarkerSet::Alpha => match self.gradient.alpha_markers().get(i) {
                Some(m) => {
                    let value = m.value + delta;
                    self.gradient.set_alpha(i, value)
                }
                None => false,
            },
        };
        if !set {
            return Change::None;
        }
        self.retabulate()
    }

    /// Re-discretise after a curve edit; unchanged tables need no upload.
    fn retabulate(&mut self) -> Change {
        let next = self.gradient.to_transfer_function(self.transfer_resolution);
        if next == self.transfer {
            return Change::None;
        }
        self.transfer = next;
        Change::TransferFunction
    }

    fn move_slicing(&mut self, next: SlicingBounds) -> Change {
        if next == self.slicing {
            return Change::None;
        }
        self.slicing = next;
        Change::Slicing(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn viewer() -> Viewer {
        Viewer::new(&ViewerCfg::default(), Gradient::default())
    }

    #[test]
    fn starts_from_config() {
        let cfg = ViewerCfg {
            brightness: 30.0,
            slice_min: [0.1, 0.0, 0.0],
            show_transfer_strip: false,
            ..ViewerCfg::default()
        };
        let v = Viewer::new(&cfg, Gradient::default());
        assert_eq!(v.scene.brightness, 30.0);
        assert!(!v.scene.show_transfer_strip);
        assert_relative_eq!(v.slicing().min().x, 0.1);
        assert_eq!(v.transfer_function().len(), 256);
    }

    #[test]
    fn slicing_moves_selected_axis_only() {
        let mut v = viewer();
        v.apply(UserIntent::SelectSliceAxis(2));
        match v.apply(UserIntent::MoveSliceMax(-0.25)) {
            Change::Slicing(b) => {
                assert_eq!(b.max(), Vec3::new(1.0, 1.0, 0.75));
                assert_eq!(b.min(), Vec3::ZERO);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slicing_at_limit_is_no_change() {
        let mut v = viewer();
        assert_eq!(v.apply(UserIntent::MoveSliceMin(-0.1)), Change::None);
        assert_eq!(v.apply(UserIntent::MoveSliceMax(0.1)), Change::None);
    }

    #[test]
    fn out_of_range_axis_is_ignored() {
        let mut v = viewer();
        v.apply(UserIntent::SelectSliceAxis(1));
        assert_eq!(v.apply(UserIntent::SelectSliceAxis(3)), Change::None);
        assert_eq!(v.axis(), 1);
    }

    #[test]
    fn reset_restores_view_and_slicing() {
        let mut v = viewer();
        v.apply(UserIntent::Orbit(Vec2::new(40.0, 10.0)));
        v.apply(UserIntent::Zoom(1.0));
        v.apply(UserIntent::AdjustBrightness(20.0));
        v.apply(UserIntent::MoveSliceMin(0.3));
        assert_eq!(
            v.apply(UserIntent::Reset),
            Change::Slicing(SlicingBounds::default())
        );
        assert_eq!(v.scene, Scene::default());
    }

    #[test]
    fn brightness_is_clamped() {
        let mut v = viewer();
        for _ in 0..30 {
            v.apply(UserIntent::AdjustBrightness(5.0));
        }
        assert_eq!(v.scene.brightness, 100.0);
        v.apply(UserIntent::AdjustContrast(-5.0));
        assert_eq!(v.scene.contrast, 0.0);
    }

    fn ramp_viewer() -> Viewer {
        let mut g = Gradient::default();
        g.set_alpha(0, 0.0);
        Viewer::new(&ViewerCfg::default(), g)
    }

    #[test]
    fn added_marker_keeps_curve_until_edited() {
        let mut v = ramp_viewer();
        let before = v.transfer_function();
        assert_eq!(v.apply(UserIntent::AddMarker), Change::None);
        assert_eq!(v.selected_marker(), 1);
        assert_eq!(v.gradient().alpha_markers().len(), 3);
        assert_relative_eq!(v.gradient().alpha_markers()[1].location, 0.5);
        assert_eq!(v.transfer_function(), before);

        assert_eq!(v.apply(UserIntent::AdjustMarker(-0.5)), Change::TransferFunction);
        assert_relative_eq!(v.gradient().alpha_markers()[1].value, 0.0);
        let tf = v.transfer_function();
        assert_ne!(tf, before);
        assert_eq!(tf.len(), 256);
        assert_eq!(tf.samples()[127][3], 0);
    }

    #[test]
    fn moving_marker_follows_it_through_resort() {
        let mut v = ramp_viewer();
        v.apply(UserIntent::AddMarker);
        v.apply(UserIntent::AdjustMarker(0.5));
        assert_eq!(v.apply(UserIntent::MoveMarker(0.25)), Change::TransferFunction);
        assert_eq!(v.selected_marker(), 1);
        assert_relative_eq!(v.gradient().alpha_markers()[1].location, 0.75);
        assert_eq!(
            v.transfer_function(),
            v.gradient().to_transfer_function(256)
        );
    }

    #[test]
    fn end_markers_are_neither_removed_nor_moved() {
        let mut v = ramp_viewer();
        assert_eq!(v.selected_marker(), 0);
        assert_eq!(v.apply(UserIntent::RemoveMarker), Change::None);
        assert_eq!(v.apply(UserIntent::MoveMarker(0.1)), Change::None);
        v.apply(UserIntent::SelectMarker(5));
        assert_eq!(v.selected_marker(), 1);
        assert_eq!(v.apply(UserIntent::RemoveMarker), Change::None);
        assert_eq!(v.gradient().alpha_markers().len(), 2);
    }

    #[test]
    fn removing_interior_marker_restores_table() {
        let mut v = ramp_viewer();
        let before = v.transfer_function();
        v.apply(UserIntent::AddMarker);
        v.apply(UserIntent::AdjustMarker(0.3));
        assert_eq!(v.apply(UserIntent::RemoveMarker), Change::TransferFunction);
        assert_eq!(v.selected_marker(), 0);
        assert_eq!(v.transfer_function(), before);
    }

    #[test]
    fn colour_set_edits_colour_markers() {
        let mut v = ramp_viewer();
        v.apply(UserIntent::ToggleMarkerSet);
        assert_eq!(v.marker_set(), MarkerSet::Color);
        v.apply(UserIntent::SelectMarker(1));
        assert_eq!(v.apply(UserIntent::AdjustMarker(-0.5)), Change::TransferFunction);
        assert_eq!(v.gradient().color_markers()[1].value, Vec3::splat(0.5));
        assert_eq!(v.gradient().alpha_markers()[1].value, 1.0);
        // already at zero
        v.apply(UserIntent::SelectMarker(-1));
        assert_eq!(v.apply(UserIntent::AdjustMarker(-0.1)), Change::None);
    }

    #[test]
    fn toggle_and_import_pass_through() {
        let mut v = viewer();
        assert_eq!(v.apply(UserIntent::ToggleTransferStrip), Change::Scene);
        assert!(!v.scene.show_transfer_strip);
        let p = PathBuf::from("a.csv");
        assert_eq!(v.apply(UserIntent::Import(p.clone())), Change::Import(p));
    }
}
