// SPDX-License-Identifier: CEPL-1.0
//! Window events to viewer intents.
//!
//! The mapper only tracks what it needs to interpret a stream of events
//! (button state, last cursor position, modifiers). Applying an intent to the
//! scene is the frontend's job.

use std::path::PathBuf;

use glam::Vec2;
use tracing::debug;
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key, ModifiersState, NamedKey};

/// Brightness and contrast change per key press, on their 0..=100 scale.
pub const ADJUST_STEP: f32 = 5.0;
/// Slicing bound change per key press, in normalised texture space.
pub const SLICE_STEP: f32 = 0.05;
/// Transfer-function marker nudge per key press, in normalised density.
pub const MARKER_STEP: f32 = 0.05;
/// Opacity or colour change of the selected marker per key press.
pub const MARKER_VALUE_STEP: f32 = 0.1;
/// Radius change per wheel notch.
pub const ZOOM_PER_LINE: f32 = 0.25;
/// Pixel-precise wheels (touchpads) report roughly this many pixels per notch.
const PIXELS_PER_LINE: f32 = 40.0;

#[derive(Clone, Debug, PartialEq)]
pub enum UserIntent {
    /// Drag delta in pixels.
    Orbit(Vec2),
    /// Positive moves the camera towards the volume.
    Zoom(f32),
    AdjustBrightness(f32),
    AdjustContrast(f32),
    /// 0 = x, 1 = y, 2 = z.
    SelectSliceAxis(usize),
    MoveSliceMin(f32),
    MoveSliceMax(f32),
    Reset,
    ToggleTransferStrip,
    /// Switch transfer-function editing between the colour and opacity curve.
    ToggleMarkerSet,
    /// Step the marker selection by this many markers.
    SelectMarker(i32),
    /// Split the segment right of the selected marker.
    AddMarker,
    RemoveMarker,
    /// Shift the selected marker's location.
    MoveMarker(f32),
    /// Raise or lower the selected marker's opacity, or lighten or darken its colour.
    AdjustMarker(f32),
    Import(PathBuf),
}

#[derive(Debug, Default)]
pub struct InputMapper {
    dragging: bool,
    cursor: Option<Vec2>,
    modifiers: ModifiersState,
}

impl InputMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Feed one window event; at most one intent comes out.
    pub fn handle(&mut self, event: &WindowEvent) -> Option<UserIntent> {
        match event {
            WindowEvent::ModifiersChanged(m) => {
                self.modifiers = m.state();
                None
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_button(*button, *state);
                None
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor_moved(*position),
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                None
            }
            WindowEvent::Focused(false) => {
                self.dragging = false;
                self.modifiers = ModifiersState::empty();
                None
            }
            WindowEvent::MouseWheel { delta, .. } => self.wheel(*delta),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return None;
                }
                self.key(&event.logical_key)
            }
            WindowEvent::DroppedFile(path) => {
                debug!("dropped {}", path.display());
                Some(UserIntent::Import(path.clone()))
            }
            _ => None,
        }
    }

    pub fn set_modifiers(&mut self, modifiers: ModifiersState) {
        self.modifiers = modifiers;
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.dragging = state == ElementState::Pressed;
        }
    }

    pub fn cursor_moved(&mut self, position: PhysicalPosition<f64>) -> Option<UserIntent> {
        let now = Vec2::new(position.x as f32, position.y as f32);
        let last = self.cursor.replace(now);
        if !self.dragging {
            return None;
        }
        let delta = now - last?;
        (delta != Vec2::ZERO).then_some(UserIntent::Orbit(delta))
    }

    pub fn wheel(&mut self, delta: MouseScrollDelta) -> Option<UserIntent> {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
        };
        (lines != 0.0).then_some(UserIntent::Zoom(lines * ZOOM_PER_LINE))
    }

    pub fn key(&mut self, key: &Key) -> Option<UserIntent> {
        let sign = if self.modifiers.shift_key() { -1.0 } else { 1.0 };
        match key {
            Key::Named(NamedKey::ArrowLeft) => Some(UserIntent::MoveSliceMin(-SLICE_STEP)),
            Key::Named(NamedKey::ArrowRight) => Some(UserIntent::MoveSliceMin(SLICE_STEP)),
            Key::Named(NamedKey::ArrowDown) => Some(UserIntent::MoveSliceMax(-SLICE_STEP)),
            Key::Named(NamedKey::ArrowUp) => Some(UserIntent::MoveSliceMax(SLICE_STEP)),
            Key::Named(NamedKey::Delete | NamedKey::Backspace) => Some(UserIntent::RemoveMarker),
            Key::Character(c) => match c.to_ascii_lowercase().as_str() {
                "b" => Some(UserIntent::AdjustBrightness(sign * ADJUST_STEP)),
                "c" => Some(UserIntent::AdjustContrast(sign * ADJUST_STEP)),
                "x" => Some(UserIntent::SelectSliceAxis(0)),
                "y" => Some(UserIntent::SelectSliceAxis(1)),
                "z" => Some(UserIntent::SelectSliceAxis(2)),
                "r" => Some(UserIntent::Reset),
                "t" => Some(UserIntent::ToggleTransferStrip),
                "g" => Some(UserIntent::ToggleMarkerSet),
                "[" => Some(UserIntent::SelectMarker(-1)),
                "]" => Some(UserIntent::SelectMarker(1)),
                "a" => Some(UserIntent::AddMarker),
                "," => Some(UserIntent::MoveMarker(-MARKER_STEP)),
                "." => Some(UserIntent::MoveMarker(MARKER_STEP)),
                "o" => Some(UserIntent::AdjustMarker(sign * MARKER_VALUE_STEP)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use winit::keyboard::SmolStr;

    fn ch(s: &str) -> Key {
        Key::Character(SmolStr::new(s))
    }

    fn at(x: f64, y: f64) -> PhysicalPosition<f64> {
        PhysicalPosition::new(x, y)
    }

    #[test]
    fn drag_orbits_by_cursor_delta() {
        let mut m = InputMapper::new();
        assert_eq!(m.cursor_moved(at(10.0, 10.0)), None);
        m.mouse_button(MouseButton::Left, ElementState::Pressed);
        assert_eq!(
            m.cursor_moved(at(14.0, 7.0)),
            Some(UserIntent::Orbit(Vec2::new(4.0, -3.0)))
        );
        m.mouse_button(MouseButton::Left, ElementState::Released);
        assert_eq!(m.cursor_moved(at(30.0, 30.0)), None);
    }

    #[test]
    fn other_buttons_do_not_drag() {
        let mut m = InputMapper::new();
        m.cursor_moved(at(0.0, 0.0));
        m.mouse_button(MouseButton::Right, ElementState::Pressed);
        assert!(!m.is_dragging());
        assert_eq!(m.cursor_moved(at(5.0, 5.0)), None);
    }

    #[test]
    fn first_move_after_press_has_no_delta() {
        let mut m = InputMapper::new();
        m.mouse_button(MouseButton::Left, ElementState::Pressed);
        assert_eq!(m.cursor_moved(at(100.0, 100.0)), None);
        assert!(m.cursor_moved(at(101.0, 100.0)).is_some());
    }

    #[test]
    fn wheel_zooms_both_delta_kinds() {
        let mut m = InputMapper::new();
        match m.wheel(MouseScrollDelta::LineDelta(0.0, 2.0)) {
            Some(UserIntent::Zoom(z)) => assert_relative_eq!(z, 2.0 * ZOOM_PER_LINE),
            other => panic!("unexpected {other:?}"),
        }
        match m.wheel(MouseScrollDelta::PixelDelta(at(0.0, -80.0))) {
            Some(UserIntent::Zoom(z)) => assert_relative_eq!(z, -2.0 * ZOOM_PER_LINE),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.wheel(MouseScrollDelta::LineDelta(1.0, 0.0)), None);
    }

    #[test]
    fn shift_reverses_brightness_and_contrast() {
        let mut m = InputMapper::new();
        assert_eq!(m.key(&ch("b")), Some(UserIntent::AdjustBrightness(ADJUST_STEP)));
        m.set_modifiers(ModifiersState::SHIFT);
        assert_eq!(m.key(&ch("B")), Some(UserIntent::AdjustBrightness(-ADJUST_STEP)));
        assert_eq!(m.key(&ch("C")), Some(UserIntent::AdjustContrast(-ADJUST_STEP)));
        m.set_modifiers(ModifiersState::empty());
        assert_eq!(m.key(&ch("c")), Some(UserIntent::AdjustContrast(ADJUST_STEP)));
    }

    #[test]
    fn slicing_keys() {
        let mut m = InputMapper::new();
        assert_eq!(m.key(&ch("x")), Some(UserIntent::SelectSliceAxis(0)));
        assert_eq!(m.key(&ch("Y")), Some(UserIntent::SelectSliceAxis(1)));
        assert_eq!(m.key(&ch("z")), Some(UserIntent::SelectSliceAxis(2)));
        assert_eq!(
            m.key(&Key::Named(NamedKey::ArrowRight)),
            Some(UserIntent::MoveSliceMin(SLICE_STEP))
        );
        assert_eq!(
            m.key(&Key::Named(NamedKey::ArrowDown)),
            Some(UserIntent::MoveSliceMax(-SLICE_STEP))
        );
    }

    #[test]
    fn toggles_and_unmapped_keys() {
        let mut m = InputMapper::new();
        assert_eq!(m.key(&ch("r")), Some(UserIntent::Reset));
        assert_eq!(m.key(&ch("t")), Some(UserIntent::ToggleTransferStrip));
        assert_eq!(m.key(&ch("q")), None);
        assert_eq!(m.key(&Key::Named(NamedKey::Escape)), None);
    }

    #[test]
    fn marker_editing_keys() {
        let mut m = InputMapper::new();
        assert_eq!(m.key(&ch("g")), Some(UserIntent::ToggleMarkerSet));
        assert_eq!(m.key(&ch("]")), Some(UserIntent::SelectMarker(1)));
        assert_eq!(m.key(&ch("[")), Some(UserIntent::SelectMarker(-1)));
        assert_eq!(m.key(&ch("a")), Some(UserIntent::AddMarker));
        assert_eq!(m.key(&ch(".")), Some(UserIntent::MoveMarker(MARKER_STEP)));
        assert_eq!(m.key(&ch(",")), Some(UserIntent::MoveMarker(-MARKER_STEP)));
        assert_eq!(
            m.key(&Key::Named(NamedKey::Delete)),
            Some(UserIntent::RemoveMarker)
        );
        assert_eq!(
            m.key(&Key::Named(NamedKey::Backspace)),
            Some(UserIntent::RemoveMarker)
        );
        assert_eq!(m.key(&ch("o")), Some(UserIntent::AdjustMarker(MARKER_VALUE_STEP)));
        m.set_modifiers(ModifiersState::SHIFT);
        assert_eq!(m.key(&ch("O")), Some(UserIntent::AdjustMarker(-MARKER_VALUE_STEP)));
    }

    #[test]
    fn dropped_file_imports() {
        let mut m = InputMapper::new();
        let path = PathBuf::from("/tmp/head.nrrd");
        assert_eq!(
            m.handle(&WindowEvent::DroppedFile(path.clone())),
            Some(UserIntent::Import(path))
        );
    }

    #[test]
    fn losing_focus_ends_drag() {
        let mut m = InputMapper::new();
        m.mouse_button(MouseButton::Left, ElementState::Pressed);
        assert_eq!(m.handle(&WindowEvent::Focused(false)), None);
        assert!(!m.is_dragging());
    }
}
