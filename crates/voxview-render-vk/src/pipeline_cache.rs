// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::{debug, warn};

use crate::device::GraphicsDevice;

fn hex_bytes(b: &[u8]) -> String {
    let mut s = String::with_capacity(b.len() * 2);
    for x in b {
        let _ = write!(&mut s, "{:02x}", x);
    }
    s
}

/// Local file in the working directory, keyed by vendor, device, driver and cache UUID.
pub fn cache_file_name(props: &vk::PhysicalDeviceProperties) -> PathBuf {
    let uuid = hex_bytes(&props.pipeline_cache_uuid);
    PathBuf::from(format!(
        "vk_pipeline_cache_{:04x}_{:04x}_{:08x}_{}.bin",
        props.vendor_id, props.device_id, props.driver_version, uuid
    ))
}

/// Loaded on creation, written back on drop. Load and save failures are benign.
pub struct PipelineCache {
    device: Arc<GraphicsDevice>,
    handle: vk::PipelineCache,
    path: Option<PathBuf>,
}

impl PipelineCache {
    pub fn load(device: &Arc<GraphicsDevice>) -> Result<Self> {
        let path = cache_file_name(device.properties());
        Self::create(device, Some(path))
    }

    /// Not backed by a file.
    pub fn in_memory(device: &Arc<GraphicsDevice>) -> Result<Self> {
        Self::create(device, None)
    }

    fn create(device: &Arc<GraphicsDevice>, path: Option<PathBuf>) -> Result<Self> {
        let data = path.as_deref().and_then(|p| fs::read(p).ok());
        if let (Some(bytes), Some(p)) = (&data, &path) {
            debug!("vk: pipeline cache {} ({} bytes)", p.display(), bytes.len());
        }
        let (p_initial_data, initial_data_size) = match &data {
            Some(bytes) => (bytes.as_ptr() as *const std::ffi::c_void, bytes.len()),
            None => (std::ptr::null(), 0),
        };
        let ci = vk::PipelineCacheCreateInfo {
            s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
            initial_data_size,
            p_initial_data,
            ..Default::default()
        };
        let handle = match unsafe { device.raw().create_pipeline_cache(&ci, None) } {
            Ok(h) => h,
            // a stale or corrupt blob can be rejected; start empty
            Err(e) if data.is_some() => {
                warn!("vk: pipeline cache rejected ({e:?}), starting empty");
                let empty = vk::PipelineCacheCreateInfo::default();
                unsafe { device.raw().create_pipeline_cache(&empty, None) }
                    .context("create_pipeline_cache")?
            }
            Err(e) => return Err(e).context("create_pipeline_cache"),
        };
        Ok(Self {
            device: device.clone(),
            handle,
            path,
        })
    }

    pub fn handle(&self) -> vk::PipelineCache {
        self.handle
    }

    fn save(&self, path: &Path) -> Result<()> {
        let bytes = unsafe { self.device.raw().get_pipeline_cache_data(self.handle) }?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, &bytes)?;
        Ok(())
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(e) = self.save(path) {
                debug!("vk: pipeline cache not saved: {e:#}");
            }
        }
        unsafe { self.device.raw().destroy_pipeline_cache(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_encodes_device_identity() {
        let mut props = vk::PhysicalDeviceProperties::default();
        props.vendor_id = 0x10de;
        props.device_id = 0x2684;
        props.driver_version = 0x0123_4567;
        props.pipeline_cache_uuid = [0xab; vk::UUID_SIZE];
        let name = cache_file_name(&props);
        let expected = format!("vk_pipeline_cache_10de_2684_01234567_{}.bin", "ab".repeat(16));
        assert_eq!(name, PathBuf::from(expected));
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex_bytes(&[0x00, 0x0f, 0xa0]), "000fa0");
    }
}
