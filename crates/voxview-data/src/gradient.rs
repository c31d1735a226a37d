// SPDX-License-Identifier: CEPL-1.0
//! Piecewise-linear colour and opacity curves over normalised density, and
//! their discretised RGBA8 lookup table.
//!
//! Both marker lists stay sorted by location, and the first and last marker
//! of each list are pinned at 0.0 and 1.0.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TRANSFER_FUNCTION_RESOLUTION: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker<T> {
    pub location: f32,
    pub value: T,
}

pub type ColorMarker = Marker<Vec3>;
pub type AlphaMarker = Marker<f32>;

#[derive(Debug, Error, PartialEq)]
pub enum GradientError {
    #[error("{0} markers: at least two are required")]
    TooFewMarkers(&'static str),
    #[error("{0} markers: ends must sit at 0.0 and 1.0")]
    UnpinnedEnds(&'static str),
    #[error("{0} markers: locations must be ascending")]
    Unsorted(&'static str),
}

trait Lerp: Copy {
    fn lerp(self, other: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, other: Self, t: f32) -> Self {
        self * (1.0 - t) + other * t
    }
}

impl Lerp for Vec3 {
    fn lerp(self, other: Self, t: f32) -> Self {
        self * (1.0 - t) + other * t
    }
}

fn sample_markers<T: Lerp>(markers: &[Marker<T>], location: f32) -> T {
    let location = location.clamp(0.0, 1.0);
    let idx = markers.partition_point(|m| m.location < location);
    if idx == 0 {
        return markers[0].value;
    }
    if idx == markers.len() {
        return markers[markers.len() - 1].value;
    }
    let (prev, next) = (&markers[idx - 1], &markers[idx]);
    let span = next.location - prev.location;
    if span <= f32::EPSILON {
        return next.value;
    }
    prev.value.lerp(next.value, (location - prev.location) / span)
}

/// Insertion point for a new interior marker: never before the first or
/// after the last.
fn insertion_index<T>(markers: &[Marker<T>], location: f32) -> usize {
    markers
        .partition_point(|m| m.location < location)
        .clamp(1, markers.len() - 1)
}

fn add_marker<T>(markers: &mut Vec<Marker<T>>, location: f32, value: T) -> usize {
    let location = location.clamp(0.0, 1.0);
    let index = insertion_index(markers, location);
    markers.insert(index, Marker { location, value });
    index
}

fn remove_marker<T>(markers: &mut Vec<Marker<T>>, index: usize) -> bool {
    if index == 0 || index + 1 >= markers.len() {
        return false;
    }
    markers.remove(index);
    true
}

fn move_marker<T>(markers: &mut Vec<Marker<T>>, index: usize, location: f32) -> Option<usize> {
    if index == 0 || index + 1 >= markers.len() {
        return None;
    }
    let mut m = markers.remove(index);
    m.location = location.clamp(0.0, 1.0);
    let new_index = insertion_index(markers, m.location);
    markers.insert(new_index, m);
    Some(new_index)
}

fn validate<T>(what: &'static str, markers: &[Marker<T>]) -> Result<(), GradientError> {
    if markers.len() < 2 {
        return Err(GradientError::TooFewMarkers(what));
    }
    if markers[0].location != 0.0 || markers[markers.len() - 1].location != 1.0 {
        return Err(GradientError::UnpinnedEnds(what));
    }
    if markers.windows(2).any(|w| w[0].location > w[1].location) {
        return Err(GradientError::Unsorted(what));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GradientDef", into = "GradientDef")]
pub struct Gradient {
    color_markers: Vec<ColorMarker>,
    alpha_markers: Vec<AlphaMarker>,
}

#[derive(Serialize, Deserialize)]
struct GradientDef {
    color: Vec<ColorMarker>,
    alpha: Vec<AlphaMarker>,
}

impl TryFrom<GradientDef> for Gradient {
    type Error = GradientError;

    fn try_from(def: GradientDef) -> Result<Self, Self::Error> {
        Gradient::from_markers(def.color, def.alpha)
    }
}

impl From<Gradient> for GradientDef {
    fn from(g: Gradient) -> Self {
        GradientDef {
            color: g.color_markers,
            alpha: g.alpha_markers,
        }
    }
}

impl Default for Gradient {
    /// Black to white, fully opaque.
    fn default() -> Self {
        Self {
            color_markers: vec![
                Marker {
                    location: 0.0,
                    value: Vec3::ZERO,
                },
                Marker {
                    location: 1.0,
                    value: Vec3::ONE,
                },
            ],
            alpha_markers: vec![
                Marker {
                    location: 0.0,
                    value: 1.0,
                },
                Marker {
                    location: 1.0,
                    value: 1.0,
                },
            ],
        }
    }
}

impl Gradient {
    pub fn from_markers(
        color_markers: Vec<ColorMarker>,
        alpha_markers: Vec<AlphaMarker>,
    ) -> Result<Self, GradientError> {
        validate("color", &color_markers)?;
        validate("alpha", &alpha_markers)?;
        Ok(Self {
            color_markers,
            alpha_markers,
        })
    }

    /// Two-stop gradient between `from` and `to` with constant opacity.
    pub fn two_stop(from: Vec3, to: Vec3, alpha: f32) -> Self {
        let mut g = Self::default();
        g.color_markers[0].value = from;
        g.color_markers[1].value = to;
        g.alpha_markers[0].value = alpha;
        g.alpha_markers[1].value = alpha;
        g
    }

    pub fn color_markers(&self) -> &[ColorMarker] {
        &self.color_markers
    }

    pub fn alpha_markers(&self) -> &[AlphaMarker] {
        &self.alpha_markers
    }

    pub fn sample_color(&self, location: f32) -> Vec3 {
        sample_markers(&self.color_markers, location)
    }

    pub fn sample_alpha(&self, location: f32) -> f32 {
        sample_markers(&self.alpha_markers, location)
    }

    pub fn sample(&self, location: f32) -> Vec4 {
        self.sample_color(location).extend(self.sample_alpha(location))
    }

    /// `count` samples taken at bin centres `(i + 0.5) / count`.
    pub fn discretize(&self, count: usize) -> Vec<Vec4> {
        let stride = 1.0 / count as f32;
        (0..count)
            .map(|i| self.sample((i as f32 + 0.5) * stride))
            .collect()
    }

    pub fn to_transfer_function(&self, count: usize) -> TransferFunction {
        TransferFunction::from_samples(&self.discretize(count))
    }

    /// Returns the index the marker landed at.
    pub fn add_color_marker(&mut self, location: f32, value: Vec3) -> usize {
        add_marker(&mut self.color_markers, location, value)
    }

    pub fn add_alpha_marker(&mut self, location: f32, value: f32) -> usize {
        add_marker(&mut self.alpha_markers, location, value.clamp(0.0, 1.0))
    }

    /// Fails for the pinned end markers.
    pub fn remove_color_marker(&mut self, index: usize) -> bool {
        remove_marker(&mut self.color_markers, index)
    }

    pub fn remove_alpha_marker(&mut self, index: usize) -> bool {
        remove_marker(&mut self.alpha_markers, index)
    }

    /// Relocate an interior marker; returns its new index after re-sorting.
    pub fn move_color_marker(&mut self, index: usize, location: f32) -> Option<usize> {
        move_marker(&mut self.color_markers, index, location)
    }

    pub fn move_alpha_marker(&mut self, index: usize, location: f32) -> Option<usize> {
        move_marker(&mut self.alpha_markers, index, location)
    }

    pub fn set_color(&mut self, index: usize, value: Vec3) -> bool {
        match self.color_markers.get_mut(index) {
            Some(m) => {
                m.value = value.clamp(Vec3::ZERO, Vec3::ONE);
                true
            }
            None => false,
        }
    }

    pub fn set_alpha(&mut self, index: usize, value: f32) -> bool {
        match self.alpha_markers.get_mut(index) {
            Some(m) => {
                m.value = value.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }
}

/// Discretised RGBA8 lookup table, uploaded wholesale as a 1D texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferFunction {
    samples: Vec<[u8; 4]>,
}

impl Default for TransferFunction {
    /// Single opaque white texel.
    fn default() -> Self {
        Self {
            samples: vec![[0xff; 4]],
        }
    }
}

impl TransferFunction {
    pub fn from_samples(samples: &[Vec4]) -> Self {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            samples: samples
                .iter()
                .map(|s| [to_u8(s.x), to_u8(s.y), to_u8(s.z), to_u8(s.w)])
                .collect(),
        }
    }

    pub fn from_rgba8(samples: Vec<[u8; 4]>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[[u8; 4]] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn default_is_black_to_white_opaque() {
        let g = Gradient::default();
        assert_eq!(g.sample(0.0), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(g.sample(1.0), Vec4::ONE);
        assert_relative_eq!(g.sample_color(0.25).x, 0.25);
    }

    #[test]
    fn samples_clamp_outside_unit_range() {
        let g = Gradient::default();
        assert_eq!(g.sample(-3.0), g.sample(0.0));
        assert_eq!(g.sample(7.0), g.sample(1.0));
    }

    #[test]
    fn end_markers_cannot_be_removed() {
        let mut g = Gradient::default();
        g.add_color_marker(0.5, Vec3::X);
        g.add_alpha_marker(0.5, 0.2);
        let last = g.color_markers().len() - 1;
        assert!(!g.remove_color_marker(0));
        assert!(!g.remove_color_marker(last));
        let last = g.alpha_markers().len() - 1;
        assert!(!g.remove_alpha_marker(0));
        assert!(!g.remove_alpha_marker(last));
        assert_eq!(g.color_markers().len(), 3);
        assert_eq!(g.alpha_markers().len(), 3);
    }

    #[test]
    fn interior_removal_shrinks_by_one() {
        let mut g = Gradient::default();
        g.add_color_marker(0.3, Vec3::X);
        g.add_color_marker(0.6, Vec3::Y);
        assert_eq!(g.color_markers().len(), 4);
        assert!(g.remove_color_marker(1));
        assert_eq!(g.color_markers().len(), 3);
        assert_relative_eq!(g.color_markers()[1].location, 0.6);
    }

    #[test]
    fn out_of_range_removal_fails() {
        let mut g = Gradient::default();
        assert!(!g.remove_alpha_marker(9));
    }

    #[test]
    fn add_keeps_order_and_reports_index() {
        let mut g = Gradient::default();
        assert_eq!(g.add_color_marker(0.7, Vec3::X), 1);
        assert_eq!(g.add_color_marker(0.2, Vec3::Y), 1);
        assert_eq!(g.add_color_marker(0.9, Vec3::Z), 3);
        let locs: Vec<f32> = g.color_markers().iter().map(|m| m.location).collect();
        assert_eq!(locs, vec![0.0, 0.2, 0.7, 0.9, 1.0]);
    }

    #[test]
    fn add_at_edges_stays_inside_pins() {
        let mut g = Gradient::default();
        assert_eq!(g.add_alpha_marker(0.0, 0.5), 1);
        assert_eq!(g.add_alpha_marker(1.0, 0.5), 2);
        assert_eq!(g.alpha_markers()[0].value, 1.0);
        assert_eq!(g.alpha_markers()[3].value, 1.0);
    }

    #[test]
    fn move_resorts_interior_markers() {
        let mut g = Gradient::default();
        g.add_color_marker(0.2, Vec3::X);
        g.add_color_marker(0.8, Vec3::Y);
        assert_eq!(g.move_color_marker(1, 0.9), Some(2));
        assert_eq!(g.color_markers()[2].value, Vec3::X);
        assert_eq!(g.move_color_marker(0, 0.5), None);
        assert_eq!(g.move_color_marker(3, 0.5), None);
    }

    #[test]
    fn alpha_values_are_clamped() {
        let mut g = Gradient::default();
        let i = g.add_alpha_marker(0.5, 3.0);
        assert_eq!(g.alpha_markers()[i].value, 1.0);
        assert!(g.set_alpha(i, -1.0));
        assert_eq!(g.alpha_markers()[i].value, 0.0);
    }

    #[test]
    fn discretize_uses_bin_centres() {
        let g = Gradient::default();
        let s = g.discretize(4);
        let reds: Vec<f32> = s.iter().map(|c| c.x).collect();
        for (got, want) in reds.iter().zip([0.125, 0.375, 0.625, 0.875]) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn interior_marker_bends_the_curve() {
        let mut g = Gradient::default();
        g.add_color_marker(0.5, Vec3::new(1.0, 0.0, 0.0));
        let c = g.sample_color(0.25);
        assert_relative_eq!(c.x, 0.5);
        assert_relative_eq!(c.y, 0.0);
    }

    #[test]
    fn lookup_table_packs_rgba8() {
        let tf = Gradient::default().to_transfer_function(TRANSFER_FUNCTION_RESOLUTION);
        assert_eq!(tf.len(), 256);
        assert_eq!(tf.as_bytes().len(), 1024);
        assert_eq!(tf.samples()[0], [0, 0, 0, 255]);
        assert_eq!(tf.samples()[255], [255, 255, 255, 255]);
    }

    #[test]
    fn rejects_unpinned_markers() {
        let colors = vec![
            Marker {
                location: 0.1,
                value: Vec3::ZERO,
            },
            Marker {
                location: 1.0,
                value: Vec3::ONE,
            },
        ];
        let alphas = Gradient::default().alpha_markers().to_vec();
        assert_eq!(
            Gradient::from_markers(colors, alphas),
            Err(GradientError::UnpinnedEnds("color"))
        );
    }

    proptest! {
        #[test]
        fn two_stop_discretization_is_linear(
            a in proptest::array::uniform3(0.0f32..=1.0),
            b in proptest::array::uniform3(0.0f32..=1.0),
            n in 1usize..512,
        ) {
            let (a, b) = (Vec3::from(a), Vec3::from(b));
            let g = Gradient::two_stop(a, b, 1.0);
            let samples = g.discretize(n);
            prop_assert_eq!(samples.len(), n);
            for (i, s) in samples.iter().enumerate() {
                let t = (i as f32 + 0.5) / n as f32;
                let want = a * (1.0 - t) + b * t;
                prop_assert!((s.truncate() - want).abs().max_element() < 1e-5);
                prop_assert_eq!(s.w, 1.0);
            }
        }
    }
}
