// SPDX-License-Identifier: CEPL-1.0
//! Instance, physical/logical device, the single graphics queue and its
//! command pool. Every GPU wrapper in this crate holds an `Arc` of it, so it
//! is always released last.

use std::ffi::{c_char, CString};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info};

use crate::validation::{self, DebugMessenger};

pub struct Surface {
    pub loader: surface::Instance,
    pub handle: vk::SurfaceKHR,
}

pub struct GraphicsDevice {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface: Option<Surface>,

    phys: vk::PhysicalDevice,
    props: vk::PhysicalDeviceProperties,
    mem_props: vk::PhysicalDeviceMemoryProperties,

    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    swapchain_loader: Option<swapchain::Device>,
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.cmd_pool, None);
            self.device.destroy_device(None);
            if let Some(s) = &self.surface {
                s.loader.destroy_surface(s.handle, None);
            }
            if let Some(d) = &self.debug {
                d.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Objects `build` has created so far. An early return drops it, destroying
/// them child-first; on success `disarm` hands ownership to the device.
#[derive(Default)]
struct Unwind {
    instance: Option<Instance>,
    debug: Option<DebugMessenger>,
    surface: Option<Surface>,
    device: Option<ash::Device>,
}

impl Unwind {
    fn disarm(&mut self) -> (Option<DebugMessenger>, Option<Surface>) {
        self.device = None;
        self.instance = None;
        (self.debug.take(), self.surface.take())
    }
}

impl Drop for Unwind {
    fn drop(&mut self) {
        unsafe {
            if let Some(d) = self.device.take() {
                d.destroy_device(None);
            }
            if let Some(s) = self.surface.take() {
                s.loader.destroy_surface(s.handle, None);
            }
            if let Some(m) = self.debug.take() {
                m.destroy();
            }
            if let Some(i) = self.instance.take() {
                i.destroy_instance(None);
            }
        }
    }
}

fn create_instance(entry: &Entry, display: Option<RawDisplayHandle>, validate: bool) -> Result<Instance> {
    let app_name = CString::new("voxview")?;

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: app_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut exts: Vec<*const c_char> = match display {
        Some(dh) => ash_window::enumerate_required_extensions(dh)
            .context("enumerate_required_extensions")?
            .to_vec(),
        None => Vec::new(),
    };
    let mut layers: Vec<*const c_char> = Vec::new();
    if validate {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
        layers.push(validation::VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    Ok(unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?)
}

fn pick_device_and_queue(
    instance: &Instance,
    surface: Option<&Surface>,
) -> Result<(vk::PhysicalDevice, u32)> {
    for phys in unsafe { instance.enumerate_physical_devices()? } {
        let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        for (i, q) in qprops.iter().enumerate() {
            if !q.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }
            let presents = match surface {
                Some(s) => unsafe {
                    s.loader
                        .get_physical_device_surface_support(phys, i as u32, s.handle)
                        .unwrap_or(false)
                },
                None => true,
            };
            if presents {
                return Ok((phys, i as u32));
            }
        }
    }
    Err(anyhow!("no suitable physical device/queue family"))
}

impl GraphicsDevice {
    /// Device able to present to `window`.
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Arc<Self>> {
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();
        Self::build(Some((dh, wh)))
    }

    /// Device without a surface, for offscreen work and GPU tests.
    pub fn headless() -> Result<Arc<Self>> {
        Self::build(None)
    }

    fn build(
        handles: Option<(RawDisplayHandle, raw_window_handle::RawWindowHandle)>,
    ) -> Result<Arc<Self>> {
        let entry = Entry::linked();
        let validate = cfg!(debug_assertions) && validation::validation_available(&entry);
        let mut unwind = Unwind::default();
        let instance = unwind
            .instance
            .insert(create_instance(&entry, handles.map(|(dh, _)| dh), validate)?)
            .clone();

        if validate {
            unwind.debug = Some(DebugMessenger::new(&entry, &instance)?);
        }

        if let Some((dh, wh)) = handles {
            let handle = unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }
                .context("create_surface")?;
            unwind.surface = Some(Surface {
                loader: surface::Instance::new(&entry, &instance),
                handle,
            });
        }

        let (phys, queue_family) = pick_device_and_queue(&instance, unwind.surface.as_ref())?;
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let mem_props = unsafe { instance.get_physical_device_memory_properties(phys) };

        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };

        let device_exts: Vec<*const c_char> = if unwind.surface.is_some() {
            vec![swapchain::NAME.as_ptr()]
        } else {
            Vec::new()
        };
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };
        let device = unwind
            .device
            .insert(unsafe { instance.create_device(phys, &dinfo, None) }.context("create_device")?)
            .clone();
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let cmd_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("create_command_pool")?;

        let (debug, surface) = unwind.disarm();
        let swapchain_loader = surface
            .as_ref()
            .map(|_| swapchain::Device::new(&instance, &device));

        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "vk: device '{}' (queue family {}, validation {})",
            name, queue_family, validate
        );
        debug!(
            "vk: api {}.{}.{}",
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version)
        );

        Ok(Arc::new(Self {
            _entry: entry,
            instance,
            debug,
            surface,
            phys,
            props,
            mem_props,
            device,
            queue_family,
            queue,
            cmd_pool,
            swapchain_loader,
        }))
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.props
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.props.limits
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.cmd_pool
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn swapchain_loader(&self) -> Option<&swapchain::Device> {
        self.swapchain_loader.as_ref()
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("device_wait_idle")
    }

    pub fn find_memory_type(&self, type_bits: u32, req: vk::MemoryPropertyFlags) -> Result<u32> {
        memory_type_index(&self.mem_props, type_bits, req)
            .ok_or_else(|| anyhow!("no memory type for bits {type_bits:#x} with {req:?}"))
    }

    /// Prefer 32f, then 24+S8, then 16.
    pub fn pick_depth_format(&self) -> Result<vk::Format> {
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D16_UNORM,
        ];
        candidates
            .into_iter()
            .find(|&f| {
                let p = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.phys, f)
                };
                p.optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| anyhow!("no supported depth format"))
    }

    pub fn begin_single_use(&self) -> Result<vk::CommandBuffer> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = unsafe { self.device.allocate_command_buffers(&ai)? }[0];
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        if let Err(e) = unsafe { self.device.begin_command_buffer(cmd, &bi) } {
            unsafe { self.device.free_command_buffers(self.cmd_pool, &[cmd]) };
            return Err(e.into());
        }
        Ok(cmd)
    }

    /// Ends, submits and waits for `cmd`, then frees it whatever the outcome.
    pub fn submit_single_use_and_wait(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let res = unsafe { self.submit_and_wait(cmd) };
        unsafe { self.device.free_command_buffers(self.cmd_pool, &[cmd]) };
        res
    }

    unsafe fn submit_and_wait(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let d = &self.device;
        unsafe { d.end_command_buffer(cmd) }.context("end_command_buffer")?;

        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            ..Default::default()
        };
        let fence = unsafe { d.create_fence(&fence_ci, None)? };
        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        let res = unsafe {
            d.queue_submit(self.queue, std::slice::from_ref(&si), fence)
                .and_then(|_| d.wait_for_fences(&[fence], true, u64::MAX))
        };
        unsafe { d.destroy_fence(fence, None) };
        res.context("single-use submit")
    }

    /// Record with `f` into a one-shot command buffer and block until the GPU is done.
    pub fn run_single_use<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let cmd = self.begin_single_use()?;
        f(&self.device, cmd);
        self.submit_single_use_and_wait(cmd)
    }

    pub fn ensure_presentable(&self) -> Result<(&Surface, &swapchain::Device)> {
        match (self.surface.as_ref(), self.swapchain_loader.as_ref()) {
            (Some(s), Some(l)) => Ok((s, l)),
            _ => bail!("device was created without a surface"),
        }
    }
}

fn memory_type_index(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties::default();
        p.memory_type_count = flags.len() as u32;
        for (i, &f) in flags.iter().enumerate() {
            p.memory_types[i].property_flags = f;
        }
        p
    }

    #[test]
    fn disarmed_unwind_releases_nothing() {
        let mut u = Unwind::default();
        assert!(matches!(u.disarm(), (None, None)));
        assert!(u.instance.is_none());
        assert!(u.device.is_none());
        drop(u);
    }

    #[test]
    fn memory_type_respects_type_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);
        assert_eq!(memory_type_index(&p, 0b111, host), Some(1));
        assert_eq!(memory_type_index(&p, 0b100, host), Some(2));
        assert_eq!(
            memory_type_index(&p, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn missing_memory_type_is_none() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            memory_type_index(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
