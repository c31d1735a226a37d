// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};
use voxview_data::Gradient;

pub const DEFAULT_CONFIG: &str = "voxview.toml";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    pub unfocused: UnfocusedPolicy,
    pub unfocused_fps: u32,
    pub fps_when_vsync_off: u32,
    /// Offscreen volume resolution relative to the window.
    pub render_scale: f32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: true,
            vsync_mode: VsyncMode::Fifo,
            unfocused: UnfocusedPolicy::Throttle,
            unfocused_fps: 30,
            fps_when_vsync_off: 0,
            render_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    #[default]
    Fifo,
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnfocusedPolicy {
    None,
    VsyncOn,
    #[default]
    Throttle,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ViewerCfg {
    pub transfer_resolution: usize,
    pub slice_min: [f32; 3],
    pub slice_max: [f32; 3],
    pub brightness: f32,
    pub contrast: f32,
    pub show_transfer_strip: bool,
}

impl Default for ViewerCfg {
    fn default() -> Self {
        ViewerCfg {
            transfer_resolution: 256,
            slice_min: [0.0; 3],
            slice_max: [1.0; 3],
            brightness: 0.0,
            contrast: 0.0,
            show_transfer_strip: true,
        }
    }
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub viewer: ViewerCfg,
    pub transfer_function: Gradient,
}

fn default_clear() -> [f32; 4] {
    [0.11, 0.11, 0.11, 1.0]
}

pub fn parse(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(s)
}

/// Missing file means defaults. A file that does not parse is reported and
/// also yields defaults.
pub fn load(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no config at {}, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("cannot read {}: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse("").unwrap(), AppCfg::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(
            r#"
            [render]
            vsync = false
            vsync_mode = "mailbox"

            [viewer]
            transfer_resolution = 64
            slice_max = [1.0, 0.5, 1.0]
            "#,
        )
        .unwrap();
        assert!(!cfg.render.vsync);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
        assert_eq!(cfg.render.unfocused, UnfocusedPolicy::Throttle);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.viewer.transfer_resolution, 64);
        assert_eq!(cfg.viewer.slice_max, [1.0, 0.5, 1.0]);
        assert!(cfg.viewer.show_transfer_strip);
        assert_eq!(cfg.transfer_function, Gradient::default());
    }

    #[test]
    fn gradient_markers_from_toml() {
        let cfg = parse(
            r#"
            [transfer_function]
            color = [
                { location = 0.0, value = [0.0, 0.0, 1.0] },
                { location = 1.0, value = [1.0, 0.0, 0.0] },
            ]
            alpha = [
                { location = 0.0, value = 0.0 },
                { location = 0.3, value = 0.2 },
                { location = 1.0, value = 0.8 },
            ]
            "#,
        )
        .unwrap();
        let g = &cfg.transfer_function;
        assert_eq!(g.color_markers().len(), 2);
        assert_eq!(g.alpha_markers().len(), 3);
        assert_eq!(g.sample_color(0.0), Vec3::Z);
    }

    #[test]
    fn unpinned_gradient_is_rejected() {
        let err = parse(
            r#"
            [transfer_function]
            color = [{ location = 0.2, value = [0.0, 0.0, 0.0] }, { location = 1.0, value = [1.0, 1.0, 1.0] }]
            alpha = [{ location = 0.0, value = 1.0 }, { location = 1.0, value = 1.0 }]
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn unknown_enum_value_is_an_error() {
        assert!(parse("[render]\nvsync_mode = \"immediate\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load(Path::new("/nonexistent/voxview.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
