// SPDX-License-Identifier: CEPL-1.0
//! Owning wrappers for Vulkan objects. Each type pairs one create with one
//! destroy, so early returns on error paths release whatever was built.

use std::ffi::c_void;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ash::vk;
use bytemuck::Pod;

use crate::device::GraphicsDevice;

/// View + sampler pair handed to a later pass for sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampledImage {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

pub struct Buffer {
    device: Arc<GraphicsDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<*mut c_void>,
}

impl Buffer {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let d = device.raw();
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { d.create_buffer(&bci, None) }.context("create_buffer")?;
        let req = unsafe { d.get_buffer_memory_requirements(buffer) };
        let memory = match allocate(device, req, props) {
            Ok(m) => m,
            Err(e) => {
                unsafe { d.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        let this = Self {
            device: device.clone(),
            buffer,
            memory,
            size,
            mapped: None,
        };
        unsafe { d.bind_buffer_memory(buffer, memory, 0) }.context("bind_buffer_memory")?;
        Ok(this)
    }

    /// Host-visible, coherent and persistently mapped.
    pub fn mapped(
        device: &Arc<GraphicsDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let mut buf = Self::new(
            device,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let ptr = unsafe {
            device
                .raw()
                .map_memory(buf.memory, 0, size, vk::MemoryMapFlags::empty())
        }
        .context("map_memory")?;
        buf.mapped = Some(ptr);
        Ok(buf)
    }

    /// Mapped buffer initialised with `data`.
    pub fn with_data<T: Pod>(
        device: &Arc<GraphicsDevice>,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buf = Self::mapped(device, bytes.len().max(1) as vk::DeviceSize, usage)?;
        buf.write(0, data)?;
        Ok(buf)
    }

    pub fn write<T: Pod>(&self, offset: usize, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let Some(ptr) = self.mapped else {
            bail!("write to an unmapped buffer");
        };
        if offset + bytes.len() > self.size as usize {
            bail!(
                "write of {} bytes at {} overruns buffer of {}",
                bytes.len(),
                offset,
                self.size
            );
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), (ptr as *mut u8).add(offset), bytes.len());
        }
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        let Some(ptr) = self.mapped else {
            bail!("read from an unmapped buffer");
        };
        let mut out = vec![0u8; self.size as usize];
        unsafe { std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), out.len()) };
        Ok(out)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let d = self.device.raw();
        unsafe {
            if self.mapped.take().is_some() {
                d.unmap_memory(self.memory);
            }
            d.destroy_buffer(self.buffer, None);
            d.free_memory(self.memory, None);
        }
    }
}

fn allocate(
    device: &GraphicsDevice,
    req: vk::MemoryRequirements,
    props: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: device.find_memory_type(req.memory_type_bits, props)?,
        ..Default::default()
    };
    Ok(unsafe { device.raw().allocate_memory(&mai, None) }.context("allocate_memory")?)
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub image_type: vk::ImageType,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    pub fn d1(format: vk::Format, width: u32, usage: vk::ImageUsageFlags) -> Self {
        Self {
            image_type: vk::ImageType::TYPE_1D,
            view_type: vk::ImageViewType::TYPE_1D,
            format,
            extent: vk::Extent3D { width, height: 1, depth: 1 },
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn d2(
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage,
            aspect,
        }
    }

    pub fn d3(format: vk::Format, dims: [u32; 3], usage: vk::ImageUsageFlags) -> Self {
        Self {
            image_type: vk::ImageType::TYPE_3D,
            view_type: vk::ImageViewType::TYPE_3D,
            format,
            extent: vk::Extent3D {
                width: dims[0],
                height: dims[1],
                depth: dims[2],
            },
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        subresource_range(self.aspect)
    }
}

pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Device-local image with its memory and a full view.
pub struct GpuImage {
    device: Arc<GraphicsDevice>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
}

impl GpuImage {
    pub fn new(device: &Arc<GraphicsDevice>, desc: ImageDesc) -> Result<Self> {
        let d = device.raw();
        let ici = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: desc.image_type,
            format: desc.format,
            extent: desc.extent,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = unsafe { d.create_image(&ici, None) }.context("create_image")?;
        let req = unsafe { d.get_image_memory_requirements(image) };
        let memory = match allocate(device, req, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(m) => m,
            Err(e) => {
                unsafe { d.destroy_image(image, None) };
                return Err(e);
            }
        };
        let mut this = Self {
            device: device.clone(),
            image,
            memory,
            view: vk::ImageView::null(),
            desc,
        };
        unsafe { d.bind_image_memory(image, memory, 0) }.context("bind_image_memory")?;

        let ivci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: desc.view_type,
            format: desc.format,
            subresource_range: desc.subresource_range(),
            ..Default::default()
        };
        this.view = unsafe { d.create_image_view(&ivci, None) }.context("create_image_view")?;
        Ok(this)
    }

    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.desc.extent
    }

    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        let d = self.device.raw();
        unsafe {
            if self.view != vk::ImageView::null() {
                d.destroy_image_view(self.view, None);
            }
            d.destroy_image(self.image, None);
            d.free_memory(self.memory, None);
        }
    }
}

/// View onto an image owned elsewhere (swapchain images).
pub struct ImageView {
    device: Arc<GraphicsDevice>,
    handle: vk::ImageView,
}

impl ImageView {
    pub fn color_2d(device: &Arc<GraphicsDevice>, image: vk::Image, format: vk::Format) -> Result<Self> {
        let ivci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: subresource_range(vk::ImageAspectFlags::COLOR),
            ..Default::default()
        };
        let handle = unsafe { device.raw().create_image_view(&ivci, None) }
            .context("create_image_view")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_image_view(self.handle, None) };
    }
}

pub struct Sampler {
    device: Arc<GraphicsDevice>,
    handle: vk::Sampler,
}

impl Sampler {
    pub fn new(device: &Arc<GraphicsDevice>, ci: &vk::SamplerCreateInfo) -> Result<Self> {
        let handle = unsafe { device.raw().create_sampler(ci, None) }.context("create_sampler")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    /// Linear filtering, one address mode on every axis.
    pub fn linear(
        device: &Arc<GraphicsDevice>,
        mode: vk::SamplerAddressMode,
        border: vk::BorderColor,
    ) -> Result<Self> {
        let ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: mode,
            address_mode_v: mode,
            address_mode_w: mode,
            border_color: border,
            max_lod: 0.0,
            ..Default::default()
        };
        Self::new(device, &ci)
    }

    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_sampler(self.handle, None) };
    }
}

pub struct Fence {
    device: Arc<GraphicsDevice>,
    handle: vk::Fence,
}

impl Fence {
    pub fn new(device: &Arc<GraphicsDevice>, signaled: bool) -> Result<Self> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        let handle = unsafe { device.raw().create_fence(&ci, None) }.context("create_fence")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn wait(&self) -> Result<()> {
        unsafe { self.device.raw().wait_for_fences(&[self.handle], true, u64::MAX) }
            .context("wait_for_fences")
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.raw().reset_fences(&[self.handle]) }.context("reset_fences")
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_fence(self.handle, None) };
    }
}

pub struct Semaphore {
    device: Arc<GraphicsDevice>,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &Arc<GraphicsDevice>) -> Result<Self> {
        let ci = vk::SemaphoreCreateInfo::default();
        let handle =
            unsafe { device.raw().create_semaphore(&ci, None) }.context("create_semaphore")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_semaphore(self.handle, None) };
    }
}

pub struct RenderPass {
    device: Arc<GraphicsDevice>,
    handle: vk::RenderPass,
}

impl RenderPass {
    pub fn new(device: &Arc<GraphicsDevice>, ci: &vk::RenderPassCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.raw().create_render_pass(ci, None) }.context("create_render_pass")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_render_pass(self.handle, None) };
    }
}

pub struct Framebuffer {
    device: Arc<GraphicsDevice>,
    handle: vk::Framebuffer,
}

impl Framebuffer {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let ci = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        let handle =
            unsafe { device.raw().create_framebuffer(&ci, None) }.context("create_framebuffer")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_framebuffer(self.handle, None) };
    }
}

pub struct DescriptorSetLayout {
    device: Arc<GraphicsDevice>,
    handle: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self> {
        let ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        let handle = unsafe { device.raw().create_descriptor_set_layout(&ci, None) }
            .context("create_descriptor_set_layout")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .raw()
                .destroy_descriptor_set_layout(self.handle, None)
        };
    }
}

/// Pool plus the sets allocated from it; sets die with the pool.
pub struct DescriptorPool {
    device: Arc<GraphicsDevice>,
    handle: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<Self> {
        let ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        let handle = unsafe { device.raw().create_descriptor_pool(&ci, None) }
            .context("create_descriptor_pool")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn allocate(
        &self,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count];
        let ai = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.handle,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        Ok(unsafe { self.device.raw().allocate_descriptor_sets(&ai) }
            .context("allocate_descriptor_sets")?)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_descriptor_pool(self.handle, None) };
    }
}

pub struct ShaderModule {
    device: Arc<GraphicsDevice>,
    handle: vk::ShaderModule,
}

impl ShaderModule {
    pub fn from_spv(device: &Arc<GraphicsDevice>, bytes: &[u8]) -> Result<Self> {
        let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).context("read_spv")?;
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: words.len() * 4,
            p_code: words.as_ptr(),
            ..Default::default()
        };
        let handle = unsafe { device.raw().create_shader_module(&ci, None) }
            .context("create_shader_module")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_shader_module(self.handle, None) };
    }
}

/// Graphics pipeline and its layout.
pub struct Pipeline {
    device: Arc<GraphicsDevice>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl Pipeline {
    pub fn layout_only(
        device: &Arc<GraphicsDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let ci = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: set_layouts.len() as u32,
            p_set_layouts: set_layouts.as_ptr(),
            push_constant_range_count: push_ranges.len() as u32,
            p_push_constant_ranges: push_ranges.as_ptr(),
            ..Default::default()
        };
        let layout = unsafe { device.raw().create_pipeline_layout(&ci, None) }
            .context("create_pipeline_layout")?;
        Ok(Self {
            device: device.clone(),
            pipeline: vk::Pipeline::null(),
            layout,
        })
    }

    /// `ci.layout` is overwritten with this pipeline's layout.
    pub fn build(
        mut self,
        cache: vk::PipelineCache,
        mut ci: vk::GraphicsPipelineCreateInfo,
    ) -> Result<Self> {
        ci.layout = self.layout;
        let pipelines = unsafe {
            self.device
                .raw()
                .create_graphics_pipelines(cache, std::slice::from_ref(&ci), None)
        }
        .map_err(|(_, e)| e)
        .context("create_graphics_pipelines")?;
        self.pipeline = pipelines[0];
        Ok(self)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let d = self.device.raw();
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                d.destroy_pipeline(self.pipeline, None);
            }
            d.destroy_pipeline_layout(self.layout, None);
        }
    }
}
