// SPDX-License-Identifier: CEPL-1.0
//! Drives one frame: volume pass then composite pass in the same command
//! buffer, one submit, one present. Recreation is deferred to the start of
//! the next frame.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use ash::vk;
use tracing::debug;
use voxview_render::{RenderSize, Scene};

use crate::composite::{CompositePass, CompositePush};
use crate::device::GraphicsDevice;
use crate::frame::FrameResourceSet;
use crate::swapchain::{Acquired, RecreateReason, SwapchainManager, VsyncMode};
use crate::volume_pass::VolumeRenderPass;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Minimised or zero-sized surface.
    Paused,
    /// Acquire found the chain out of date; it is rebuilt next frame.
    Stale,
}

pub struct FrameScheduler {
    device: Arc<GraphicsDevice>,
    frames: FrameResourceSet,
    swapchain: SwapchainManager,
    clear: [f32; 4],
    vsync: bool,
    vsync_mode: VsyncMode,
}

impl FrameScheduler {
    pub fn new(device: &Arc<GraphicsDevice>, size: RenderSize, frames_in_flight: usize) -> Result<Self> {
        Ok(Self {
            device: device.clone(),
            frames: FrameResourceSet::new(device, frames_in_flight)?,
            swapchain: SwapchainManager::new(device, size)?,
            clear: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
            vsync_mode: VsyncMode::Fifo,
        })
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn frames(&self) -> &FrameResourceSet {
        &self.frames
    }

    pub fn resize(&mut self, size: RenderSize) {
        self.swapchain.resize(size);
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
    }

    pub fn set_vsync(&mut self, on: bool) {
        self.vsync = on;
        self.swapchain.set_vsync(on, self.vsync_mode);
    }

    pub fn set_vsync_mode(&mut self, mode: VsyncMode) {
        self.vsync_mode = mode;
        self.swapchain.set_vsync(self.vsync, mode);
    }

    /// Waits for every slot, then rebuilds the chain (and the composite
    /// pipeline if the surface format changed).
    fn recreate(&mut self, composite: &mut CompositePass, cache: vk::PipelineCache) -> Result<()> {
        self.frames.wait_all()?;
        if self.swapchain.recreate()? {
            debug!("vk: surface format changed, rebuilding composite pipeline");
            composite.rebuild_pipeline(cache, self.swapchain.render_pass())?;
        }
        Ok(())
    }

    // STRICT PER-FRAME ORDER:
    // 1) wait the slot's fence
    // 2) acquire_next_image (signals the slot's image-available semaphore)
    // 3) reset + record: volume pass, then swapchain pass with the composite
    // 4) reset fence, queue_submit (waits image-available, signals render-finished)
    // 5) queue_present (waits render-finished)
    // A failure in 3) or 4) drains image-available with an empty batch that
    // re-signals the fence, and rebuilds the chain next frame.
    pub fn render_frame(
        &mut self,
        volume: &mut VolumeRenderPass,
        composite: &mut CompositePass,
        cache: vk::PipelineCache,
        scene: &Scene,
    ) -> Result<FrameOutcome> {
        if self.swapchain.needs_recreate() {
            self.recreate(composite, cache)?;
        }
        if self.swapchain.is_paused() || self.swapchain.needs_recreate() {
            return Ok(FrameOutcome::Paused);
        }

        self.frames.wait_current()?;
        let acquire_sem = self.frames.begin_acquire()?.image_available.handle();
        let image_index = match self.swapchain.acquire(acquire_sem) {
            Ok(Acquired::Image { index, .. }) => index,
            Ok(Acquired::Stale) => {
                self.frames.abandon()?;
                return Ok(FrameOutcome::Stale);
            }
            Err(e) => {
                self.frames.abandon()?;
                return Err(e);
            }
        };

        let render_finished = match self.record_and_submit(image_index, volume, composite, scene) {
            Ok(sem) => sem,
            Err(e) => {
                // the image stays acquired until the chain is rebuilt
                self.frames.release_acquired()?;
                self.swapchain.request(RecreateReason::ABANDONED);
                return Err(e);
            }
        };
        self.swapchain.present(image_index, render_finished)?;
        Ok(FrameOutcome::Presented)
    }

    fn record_and_submit(
        &mut self,
        image_index: u32,
        volume: &mut VolumeRenderPass,
        composite: &CompositePass,
        scene: &Scene,
    ) -> Result<vk::Semaphore> {
        let cmd = self.frames.begin_recording()?;
        self.record(cmd, image_index, volume, composite, scene)?;
        self.frames.submit()
    }

    fn record(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        volume: &mut VolumeRenderPass,
        composite: &CompositePass,
        scene: &Scene,
    ) -> Result<()> {
        volume.record(cmd, self.frames.current_index(), scene)?;

        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .ok_or_else(|| anyhow!("no framebuffer for swapchain image {image_index}"))?;
        let extent = self.swapchain.extent();
        let clears = [vk::ClearValue {
            color: vk::ClearColorValue { float32: self.clear },
        }];
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.swapchain.render_pass(),
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };

        let d = self.device.raw();
        unsafe { d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE) };
        composite.record(cmd, extent, CompositePush::from_scene(scene));
        unsafe { d.cmd_end_render_pass(cmd) };
        Ok(())
    }
}
