// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use voxview_data::{Dataset, TransferFunction};

pub mod camera;
pub mod scene;
pub mod slots;
pub mod uniforms;

pub use camera::Camera;
pub use scene::{Scene, SlicingBounds};
pub use slots::{FrameSlots, SlotError, SlotState};
pub use uniforms::FrameUniforms;

/// Frame slots whose GPU work may be outstanding at once.
pub const FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Scale both sides, never collapsing a non-empty size to zero.
    pub fn scaled(&self, factor: f32) -> Self {
        if self.is_empty() {
            return *self;
        }
        let s = |v: u32| ((v as f32 * factor).round() as u32).max(1);
        Self::new(s(self.width), s(self.height))
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Window framebuffer changed; the presentation chain is rebuilt lazily.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    /// Viewport panel changed; the offscreen volume target follows it.
    fn resize_viewport(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self, scene: &Scene) -> Result<()>;

    fn replace_dataset(&mut self, dataset: &Dataset) -> Result<()>;
    fn replace_transfer_function(&mut self, transfer: &TransferFunction) -> Result<()>;
    fn set_slicing_bounds(&mut self, bounds: SlicingBounds);

    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sizes() {
        assert!(RenderSize::new(0, 10).is_empty());
        assert!(RenderSize::new(10, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }

    #[test]
    fn scaling_keeps_at_least_one_pixel() {
        assert_eq!(RenderSize::new(800, 600).scaled(0.5), RenderSize::new(400, 300));
        assert_eq!(RenderSize::new(1, 1).scaled(0.01), RenderSize::new(1, 1));
        assert_eq!(RenderSize::new(0, 5).scaled(2.0), RenderSize::new(0, 5));
    }
}
