// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;
use voxview_data::{Dataset, TransferFunction};
use voxview_render::{RenderSize, Renderer, Scene, SlicingBounds, FRAMES_IN_FLIGHT};

pub mod composite;
pub mod device;
pub mod frame;
pub mod pipeline_cache;
pub mod resources;
pub mod scheduler;
pub mod swapchain;
pub mod upload;
pub mod validation;
pub mod volume_pass;

pub use composite::CompositePass;
pub use device::GraphicsDevice;
pub use frame::FrameResourceSet;
pub use pipeline_cache::PipelineCache;
pub use scheduler::{FrameOutcome, FrameScheduler};
pub use swapchain::{RecreateReason, SwapchainManager, VsyncMode};
pub use volume_pass::VolumeRenderPass;

// STRICT TEARDOWN ORDER (field order below):
// - device_wait_idle() in Drop
// - frame slots + swapchain, then the passes, then the pipeline cache (saved to disk)
// - GraphicsDevice goes last, when the final Arc drops
pub struct VkRenderer {
    scheduler: FrameScheduler,
    composite: CompositePass,
    volume: VolumeRenderPass,
    cache: PipelineCache,
    device: Arc<GraphicsDevice>,
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        self.device.wait_idle().ok();
    }
}

impl VkRenderer {
    /// Mailbox is only used while vsync is on and the surface supports it.
    pub fn set_vsync_mode(&mut self, mode: VsyncMode) {
        self.scheduler.set_vsync_mode(mode);
    }

    pub fn volume(&self) -> &VolumeRenderPass {
        &self.volume
    }

    fn rebind_composite(&self) {
        self.composite
            .rebind(self.volume.output(), self.volume.transfer_output());
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        let device = GraphicsDevice::new(window, display)?;
        let cache = PipelineCache::load(&device)?;
        let volume = VolumeRenderPass::new(&device, cache.handle(), size, FRAMES_IN_FLIGHT)?;
        let scheduler = FrameScheduler::new(&device, size, FRAMES_IN_FLIGHT)?;
        let composite = CompositePass::new(
            &device,
            cache.handle(),
            scheduler.swapchain().render_pass(),
            volume.output(),
            volume.transfer_output(),
        )?;

        let extent = scheduler.swapchain().extent();
        info!(
            "Vulkan swapchain ready ({}x{}, fmt {:?})",
            extent.width,
            extent.height,
            scheduler.swapchain().format()
        );
        Ok(Self {
            scheduler,
            composite,
            volume,
            cache,
            device,
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.scheduler.resize(size);
        Ok(())
    }

    fn resize_viewport(&mut self, size: RenderSize) -> Result<()> {
        if self.volume.resize(size)? {
            self.rebind_composite();
        }
        Ok(())
    }

    fn render(&mut self, scene: &Scene) -> Result<()> {
        self.scheduler.render_frame(
            &mut self.volume,
            &mut self.composite,
            self.cache.handle(),
            scene,
        )?;
        Ok(())
    }

    fn replace_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        self.volume.replace_dataset(dataset)
    }

    fn replace_transfer_function(&mut self, transfer: &TransferFunction) -> Result<()> {
        self.volume.replace_transfer_function(transfer)?;
        self.rebind_composite();
        Ok(())
    }

    fn set_slicing_bounds(&mut self, bounds: SlicingBounds) {
        self.volume.set_slicing_bounds(bounds);
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.volume.set_clear_color(rgba);
        self.scheduler.set_clear_color(rgba);
    }

    fn set_vsync(&mut self, on: bool) {
        self.scheduler.set_vsync(on);
    }
}
