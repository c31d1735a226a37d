// SPDX-License-Identifier: CEPL-1.0
//! Presentable surface chain: swapchain, views, render pass, framebuffers.
//! Recreated wholesale, never patched.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use bitflags::bitflags;
use tracing::{debug, info};
use voxview_render::RenderSize;

use crate::device::GraphicsDevice;
use crate::resources::{Framebuffer, ImageView, RenderPass};

bitflags! {
    /// Why the chain must be rebuilt before the next frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RecreateReason: u8 {
        const OUT_OF_DATE = 1 << 0;
        const SUBOPTIMAL  = 1 << 1;
        const RESIZED     = 1 << 2;
        /// An image was acquired but its frame never reached present.
        const ABANDONED   = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    /// Target monitor refresh rate
    #[default]
    Fifo,
    /// Smart vsync, fps uncapped; falls back to FIFO
    Mailbox,
}

pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    /// Chain is out of date; the caller skips the frame.
    Stale,
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    vsync: bool,
    mode: VsyncMode,
) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match (vsync, mode) {
        (false, _) => &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX],
        (true, VsyncMode::Mailbox) => &[vk::PresentModeKHR::MAILBOX],
        (true, VsyncMode::Fifo) => &[],
    };
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub fn image_count_from_caps(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

fn create_render_pass(device: &Arc<GraphicsDevice>, format: vk::Format) -> Result<RenderPass> {
    // Single color attachment -> present
    let color_att = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };
    // The acquire semaphore is waited at COLOR_ATTACHMENT_OUTPUT
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };
    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    RenderPass::new(device, &rp_info)
}

struct Chain {
    handle: vk::SwapchainKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<ImageView>,
    framebuffers: Vec<Framebuffer>,
}

pub struct SwapchainManager {
    device: Arc<GraphicsDevice>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    render_pass: RenderPass,
    chain: Option<Chain>,
    window_size: RenderSize,
    pending: RecreateReason,
    paused: bool,
    vsync: bool,
    vsync_mode: VsyncMode,
}

impl SwapchainManager {
    pub fn new(device: &Arc<GraphicsDevice>, size: RenderSize) -> Result<Self> {
        let (surface, _) = device.ensure_presentable()?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device.physical(), surface.handle)
        }?;
        let format = choose_surface_format(&formats).ok_or_else(|| anyhow!("surface reports no formats"))?;
        let render_pass = create_render_pass(device, format.format)?;

        let mut this = Self {
            device: device.clone(),
            format,
            present_mode: vk::PresentModeKHR::FIFO,
            render_pass,
            chain: None,
            window_size: size,
            pending: RecreateReason::empty(),
            paused: false,
            vsync: true,
            vsync_mode: VsyncMode::Fifo,
        };
        this.recreate()?;
        Ok(this)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain
            .as_ref()
            .map(|c| c.extent)
            .unwrap_or_default()
    }

    pub fn image_count(&self) -> usize {
        self.chain.as_ref().map(|c| c.images.len()).unwrap_or(0)
    }

    pub fn framebuffer(&self, index: u32) -> Option<vk::Framebuffer> {
        self.chain
            .as_ref()
            .and_then(|c| c.framebuffers.get(index as usize))
            .map(|fb| fb.handle())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn needs_recreate(&self) -> bool {
        !self.pending.is_empty() || self.chain.is_none()
    }

    pub fn request(&mut self, reason: RecreateReason) {
        self.pending |= reason;
    }

    /// Windowing layer reports a new framebuffer size.
    pub fn resize(&mut self, size: RenderSize) {
        if size.is_empty() {
            if !self.paused {
                info!("vk: resize to 0x0 -> paused=true");
            }
            self.paused = true;
        } else if self.paused {
            info!("vk: resize to {}x{} -> paused=false", size.width, size.height);
            self.paused = false;
        }
        self.window_size = size;
        self.request(RecreateReason::RESIZED);
    }

    pub fn set_vsync(&mut self, on: bool, mode: VsyncMode) {
        if self.vsync == on && self.vsync_mode == mode {
            return;
        }
        self.vsync = on;
        self.vsync_mode = mode;
        self.request(RecreateReason::RESIZED);
    }

    /// Rebuilds the chain. Caller must have waited for every in-flight slot.
    /// Returns `Ok(true)` if the surface format changed (the render pass was
    /// rebuilt and pipelines built against it need rebuilding too).
    pub fn recreate(&mut self) -> Result<bool> {
        let (surface, loader) = self.device.ensure_presentable()?;
        let phys = self.device.physical();

        let caps = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(phys, surface.handle)
        }?;
        if caps.current_extent.width == 0 || caps.current_extent.height == 0 || self.window_size.is_empty() {
            if !self.paused {
                info!("vk: current_extent is 0x0 -> paused=true");
            }
            self.paused = true;
            return Ok(false);
        }
        self.paused = false;

        let formats = unsafe { surface.loader.get_physical_device_surface_formats(phys, surface.handle) }?;
        let modes =
            unsafe { surface.loader.get_physical_device_surface_present_modes(phys, surface.handle) }?;

        let format = choose_surface_format(&formats).ok_or_else(|| anyhow!("surface reports no formats"))?;
        let present_mode = choose_present_mode(&modes, self.vsync, self.vsync_mode);
        let extent = extent_from_caps(&caps, self.window_size);

        self.device.wait_idle()?;

        let old = self.chain.as_ref().map(|c| c.handle).unwrap_or_default();
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle,
            min_image_count: image_count_from_caps(&caps),
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };
        let handle = unsafe { loader.create_swapchain(&swap_info, None) }.context("create_swapchain")?;

        // Framebuffers -> views -> old swapchain
        if let Some(prev) = self.chain.take() {
            drop(prev.framebuffers);
            drop(prev.views);
            unsafe { loader.destroy_swapchain(prev.handle, None) };
        }

        let format_changed =
            format.format != self.format.format || format.color_space != self.format.color_space;
        if format_changed {
            self.render_pass = create_render_pass(&self.device, format.format)?;
            self.format = format;
        }

        let chain = match self.build_chain(handle, extent) {
            Ok(c) => c,
            Err(e) => {
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(e);
            }
        };

        info!(
            "vk: swapchain {}x{} ({} images, fmt {:?}, {:?})",
            extent.width,
            extent.height,
            chain.images.len(),
            format.format,
            present_mode
        );
        debug!("vk: recreate reasons {:?}", self.pending);

        self.chain = Some(chain);
        self.present_mode = present_mode;
        self.pending = RecreateReason::empty();
        Ok(format_changed)
    }

    fn build_chain(&self, handle: vk::SwapchainKHR, extent: vk::Extent2D) -> Result<Chain> {
        let (_, loader) = self.device.ensure_presentable()?;
        let images = unsafe { loader.get_swapchain_images(handle) }?;

        let mut views = Vec::with_capacity(images.len());
        for &img in &images {
            views.push(ImageView::color_2d(&self.device, img, self.format.format)?);
        }
        let mut framebuffers = Vec::with_capacity(views.len());
        for view in &views {
            framebuffers.push(Framebuffer::new(
                &self.device,
                self.render_pass.handle(),
                &[view.handle()],
                extent,
            )?);
        }
        Ok(Chain {
            handle,
            extent,
            images,
            views,
            framebuffers,
        })
    }

    pub fn acquire(&mut self, signal: vk::Semaphore) -> Result<Acquired> {
        let (_, loader) = self.device.ensure_presentable()?;
        let Some(chain) = self.chain.as_ref() else {
            return Ok(Acquired::Stale);
        };
        match unsafe { loader.acquire_next_image(chain.handle, u64::MAX, signal, vk::Fence::null()) } {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.request(RecreateReason::SUBOPTIMAL);
                }
                Ok(Acquired::Image { index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.request(RecreateReason::OUT_OF_DATE);
                Ok(Acquired::Stale)
            }
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    pub fn present(&mut self, index: u32, wait: vk::Semaphore) -> Result<()> {
        let (_, loader) = self.device.ensure_presentable()?;
        let Some(chain) = self.chain.as_ref() else {
            return Ok(());
        };
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &chain.handle,
            p_image_indices: &index,
            ..Default::default()
        };
        match unsafe { loader.queue_present(self.device.queue(), &present) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                self.request(RecreateReason::SUBOPTIMAL);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.request(RecreateReason::OUT_OF_DATE);
                Ok(())
            }
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.device.wait_idle().ok();
        if let Some(chain) = self.chain.take() {
            drop(chain.framebuffers);
            drop(chain.views);
            if let Some(loader) = self.device.swapchain_loader() {
                unsafe { loader.destroy_swapchain(chain.handle, None) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).map(|f| f.format);
        assert_eq!(chosen, Some(vk::Format::B8G8R8A8_SRGB));
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).map(|f| f.format);
        assert_eq!(chosen, Some(vk::Format::R16G16B16A16_SFLOAT));
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_defaults_to_fifo() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&all, true, VsyncMode::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(choose_present_mode(&all, false, VsyncMode::Fifo), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn unsupported_mailbox_falls_back_to_fifo() {
        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&fifo_only, true, VsyncMode::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&fifo_only, false, VsyncMode::Mailbox),
            vk::PresentModeKHR::FIFO
        );
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn extent_uses_current_when_defined() {
        let c = caps((800, 600), (1, 1), (4096, 4096));
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(1024, 768)),
            vk::Extent2D { width: 800, height: 600 }
        );
    }

    #[test]
    fn extent_clamps_window_size_when_undefined() {
        let c = caps((u32::MAX, u32::MAX), (64, 64), (1920, 1080));
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(4000, 10)),
            vk::Extent2D { width: 1920, height: 64 }
        );
        assert_eq!(
            extent_from_caps(&c, RenderSize::new(640, 480)),
            vk::Extent2D { width: 640, height: 480 }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        c.min_image_count = 2;
        c.max_image_count = 0;
        assert_eq!(image_count_from_caps(&c), 3);
        c.max_image_count = 2;
        assert_eq!(image_count_from_caps(&c), 2);
    }

    #[test]
    fn reasons_accumulate() {
        let mut r = RecreateReason::empty();
        r |= RecreateReason::RESIZED;
        r |= RecreateReason::SUBOPTIMAL;
        assert!(r.contains(RecreateReason::RESIZED | RecreateReason::SUBOPTIMAL));
        assert!(!r.contains(RecreateReason::OUT_OF_DATE));
    }
}
