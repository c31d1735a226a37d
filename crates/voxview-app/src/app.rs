// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use voxview_core::{Notice, Notifications};
use voxview_data::{import, import_slices, DataFormat, Dataset};
use voxview_platform::winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};
use voxview_platform::InputMapper;
use voxview_render::{RenderSize, Renderer};
use voxview_render_vk::VkRenderer;

use crate::cli::Args;
use crate::config::{AppCfg, UnfocusedPolicy, VsyncMode};
use crate::viewer::{Change, Viewer};

const TITLE: &str = "voxview";

fn vk_mode(mode: VsyncMode) -> voxview_render_vk::VsyncMode {
    match mode {
        VsyncMode::Fifo => voxview_render_vk::VsyncMode::Fifo,
        VsyncMode::Mailbox => voxview_render_vk::VsyncMode::Mailbox,
    }
}

/// GPU failures keep their whole context chain in the notice.
fn gpu_error(e: &anyhow::Error) -> Notice {
    Notice::new("GPU Error", format!("{e:#}"))
}

fn to_render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

pub struct App {
    args: Args,
    cfg: AppCfg,
    // renderer before window: the surface must go first
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,

    input: InputMapper,
    viewer: Viewer,
    notifications: Notifications,
    fatal: Option<anyhow::Error>,

    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,

    paused: bool,
    focused: bool,
    next_frame_deadline: Option<Instant>,
}

impl App {
    pub fn new(args: Args, cfg: AppCfg) -> Self {
        let viewer = Viewer::new(&cfg.viewer, cfg.transfer_function.clone());
        Self {
            args,
            cfg,
            renderer: None,
            window: None,
            render_size: RenderSize::new(1, 1),
            input: InputMapper::new(),
            viewer,
            notifications: Notifications::default(),
            fatal: None,
            exiting: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            paused: false,
            focused: true,
            next_frame_deadline: None,
        }
    }

    /// Start-up failure, if any, for `main` to report.
    pub fn take_fatal(&mut self) -> Option<anyhow::Error> {
        self.fatal.take()
    }

    fn viewport_size(&self) -> RenderSize {
        self.render_size.scaled(self.cfg.render.render_scale)
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(TITLE)
                    .with_inner_size(LogicalSize::new(1280.0, 720.0)),
            )
            .context("create_window")?;
        self.render_size = to_render_size(window.inner_size());

        let wh = window.window_handle().context("window_handle")?;
        let dh = window.display_handle().context("display_handle")?;
        let mut renderer =
            VkRenderer::new(&wh, &dh, self.viewport_size()).context("Vulkan init")?;

        renderer.set_clear_color(self.cfg.render.clear_color);
        renderer.set_vsync(self.cfg.render.vsync);
        renderer.set_vsync_mode(vk_mode(self.cfg.render.vsync_mode));
        renderer.resize(self.render_size)?;
        renderer
            .replace_transfer_function(&self.viewer.transfer_function())
            .context("initial transfer function")?;
        renderer.set_slicing_bounds(self.viewer.slicing());

        info!("vsync cfg = {}", self.cfg.render.vsync);
        self.window = Some(window);
        self.renderer = Some(renderer);

        if !self.args.inputs.is_empty() {
            let inputs = self.args.inputs.clone();
            self.open(&inputs, None);
        }
        Ok(())
    }

    fn load(&self, paths: &[PathBuf], format: Option<DataFormat>) -> Result<Dataset> {
        let dataset = match paths {
            [] => anyhow::bail!("no input given"),
            [path] => {
                let format = match format {
                    Some(f) => f,
                    None => self.args.format_for(path)?,
                };
                import(path, &format).with_context(|| format!("{}", path.display()))?
            }
            many => import_slices(many)?,
        };
        Ok(dataset)
    }

    /// Import and upload. Any failure leaves the current volume on screen.
    fn open(&mut self, paths: &[PathBuf], format: Option<DataFormat>) {
        let dataset = match self.load(paths, format) {
            Ok(d) => d,
            Err(e) => {
                self.notifications.push(Notice::new("Import Error", format!("{e:#}")));
                return;
            }
        };
        let [x, y, z] = dataset.dimensions();
        info!("imported {x}x{y}x{z} volume");
        if let Some(r) = &mut self.renderer {
            if let Err(e) = r.replace_dataset(&dataset) {
                self.notifications.push(gpu_error(&e));
            }
        }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::None => return,
            Change::Scene => {}
            Change::Slicing(bounds) => {
                debug!(
                    "slicing axis {} → {:?}..{:?}",
                    self.viewer.axis(),
                    bounds.min(),
                    bounds.max()
                );
                if let Some(r) = &mut self.renderer {
                    r.set_slicing_bounds(bounds);
                }
            }
            Change::TransferFunction => {
                debug!(
                    "{:?} marker {} edited ({} colour, {} alpha)",
                    self.viewer.marker_set(),
                    self.viewer.selected_marker(),
                    self.viewer.gradient().color_markers().len(),
                    self.viewer.gradient().alpha_markers().len()
                );
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.replace_transfer_function(&self.viewer.transfer_function()) {
                        self.notifications.push(gpu_error(&e));
                    }
                }
            }
            Change::Import(path) => {
                let format = DataFormat::detect(&path);
                match format {
                    Ok(f) => self.open(&[path], Some(f)),
                    Err(e) => self.notifications.report("Import Error", &e),
                }
            }
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn resize(&mut self, size: RenderSize) {
        self.render_size = size;
        let viewport = self.viewport_size();
        if let Some(r) = &mut self.renderer {
            let res = r.resize(size).and_then(|_| r.resize_viewport(viewport));
            if let Err(e) = res {
                self.notifications.push(gpu_error(&e));
            }
        }
    }

    /// Notices surface in the title bar until the next one replaces them.
    fn drain_notifications(&mut self) {
        let Some(last) = self.notifications.drain().last() else {
            return;
        };
        if let Some(w) = &self.window {
            w.set_title(&format!("{TITLE} - {last}"));
        }
    }

    fn apply_focus_policy(&mut self, focused: bool) {
        let Some(r) = &mut self.renderer else {
            return;
        };
        match (focused, self.cfg.render.unfocused) {
            (false, UnfocusedPolicy::VsyncOn) => {
                r.set_vsync(true);
                r.set_vsync_mode(voxview_render_vk::VsyncMode::Fifo);
            }
            (true, UnfocusedPolicy::VsyncOn) => {
                r.set_vsync(self.cfg.render.vsync);
                r.set_vsync_mode(vk_mode(self.cfg.render.vsync_mode));
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("start-up failed: {e:#}");
                self.fatal = Some(e);
                self.exiting = true;
                event_loop.exit();
                return;
            }
        }

        event_loop.set_control_flow(if self.cfg.render.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });

        self.paused = self.render_size.is_empty();
        info!("resumed → paused={}", self.paused);

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        if let Some(intent) = self.input.handle(&event) {
            let change = self.viewer.apply(intent);
            self.apply(change);
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.exiting = true;
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                let size = to_render_size(new_size);
                let now_paused = size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!(
                        "Resized → {}x{} (paused={})",
                        size.width, size.height, self.paused
                    );
                } else {
                    debug!("Resized → {}x{}", size.width, size.height);
                }

                if !self.paused {
                    self.resize(size);
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                } else {
                    self.render_size = size;
                }
            }

            WindowEvent::Occluded(occluded) => {
                let now_paused = occluded || self.render_size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!("Occluded={} → paused={}", occluded, self.paused);
                }
            }

            WindowEvent::Focused(focused) => {
                if self.focused != focused {
                    self.focused = focused;
                    info!("Focused({})", focused);
                    self.apply_focus_policy(focused);
                    if focused {
                        self.next_frame_deadline = None;
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }

                if let Some(r) = &mut self.renderer {
                    match r.render(&self.viewer.scene) {
                        // count only frames that were actually rendered
                        Ok(()) => self.frames = self.frames.saturating_add(1),
                        Err(e) => self.notifications.push(gpu_error(&e)),
                    }
                }
                self.drain_notifications();
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        // 1) Decide target FPS for this frame (0 means "no cap here")
        let mut target_fps: u32 = 0;

        if self.paused {
            // window-size=0 or occluded → sleep
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        if !self.focused {
            match self.cfg.render.unfocused {
                UnfocusedPolicy::Throttle => target_fps = self.cfg.render.unfocused_fps,
                UnfocusedPolicy::VsyncOn => target_fps = 0,
                UnfocusedPolicy::None => {}
            }
        }

        if target_fps == 0 {
            if self.cfg.render.vsync {
                // Vsync: block until events, then redraw once
                event_loop.set_control_flow(ControlFlow::Wait);
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            } else {
                target_fps = self.cfg.render.fps_when_vsync_off;
                if target_fps == 0 {
                    // Uncapped: poll and keep drawing
                    event_loop.set_control_flow(ControlFlow::Poll);
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }
        }

        // 2) Throttled path (focused or unfocused)
        if target_fps > 0 {
            let now = Instant::now();
            let frame_dt = Duration::from_nanos(1_000_000_000u64 / target_fps.max(1) as u64);

            match self.next_frame_deadline {
                Some(t) if now < t => {
                    // Not time yet: sleep until the stored deadline.
                    event_loop.set_control_flow(ControlFlow::WaitUntil(t));
                }
                _ => {
                    let next = now + frame_dt;
                    self.next_frame_deadline = Some(next);
                    event_loop.set_control_flow(ControlFlow::WaitUntil(next));
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }
        }

        // 3) FPS counter
        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            debug!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_notice_keeps_context_chain() {
        let e = anyhow::anyhow!("VK_ERROR_DEVICE_LOST").context("render_frame");
        let n = gpu_error(&e);
        assert_eq!(n.title, "GPU Error");
        assert_eq!(n.message, "render_frame: VK_ERROR_DEVICE_LOST");
    }
}
