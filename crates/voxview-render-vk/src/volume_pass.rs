// SPDX-License-Identifier: CEPL-1.0
//! Offscreen ray-marching pass.
//!
//! Renders a unit cube into a color+depth target sized to the viewport panel,
//! independent of the swapchain extent. The color target ends the pass in
//! SHADER_READ_ONLY_OPTIMAL so the composite pass can sample it later in the
//! same command buffer.
//!
//! Replacement (`resize`, `replace_dataset`, `replace_transfer_function`)
//! waits for the device to go idle, builds the new resource completely and
//! only then swaps it in. A failure leaves the previous resource bound.

use std::ffi::CStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::{debug, info};
use voxview_data::{Dataset, TransferFunction};
use voxview_render::{FrameUniforms, RenderSize, Scene, SlicingBounds};

use crate::device::GraphicsDevice;
use crate::resources::{
    Buffer, DescriptorPool, DescriptorSetLayout, Framebuffer, GpuImage, ImageDesc, Pipeline,
    RenderPass, SampledImage, Sampler, ShaderModule,
};
use crate::upload;

pub const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const VOLUME_FORMAT: vk::Format = vk::Format::R32_SFLOAT;
pub const TRANSFER_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
pub const DEFAULT_CLEAR: [f32; 4] = [0.11, 0.11, 0.11, 1.0];

const VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/volume.vert.spv"));
const FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/volume.frag.spv"));
const ENTRY: &CStr = c"main";

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub texcoord: [f32; 3],
}

// Corners of each face, counter-clockwise seen from outside.
const FACES: [[[f32; 3]; 4]; 6] = [
    [[0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5]],
    [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]],
    [[-0.5, 0.5, -0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5]],
    [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
    [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]],
    [[-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5], [0.5, -0.5, -0.5]],
];

pub const CUBE_INDEX_COUNT: u32 = 36;

/// 24 vertices (4 per face) and 36 indices.
pub fn cube() -> (Vec<Vertex>, Vec<u16>) {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(CUBE_INDEX_COUNT as usize);
    for face in FACES {
        let base = vertices.len() as u16;
        for p in face {
            vertices.push(Vertex {
                pos: p,
                texcoord: [p[0] + 0.5, p[1] + 0.5, p[2] + 0.5],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

fn to_extent(size: RenderSize) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width.max(1),
        height: size.height.max(1),
    }
}

/// Color + depth attachments and the framebuffer binding them.
struct Target {
    framebuffer: Framebuffer,
    color: GpuImage,
    depth: GpuImage,
    extent: vk::Extent2D,
}

impl Target {
    fn new(
        device: &Arc<GraphicsDevice>,
        render_pass: vk::RenderPass,
        depth_format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let color = GpuImage::new(
            device,
            ImageDesc::d2(
                COLOR_FORMAT,
                extent,
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::ImageAspectFlags::COLOR,
            ),
        )?;
        let depth = GpuImage::new(
            device,
            ImageDesc::d2(
                depth_format,
                extent,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            ),
        )?;
        let framebuffer =
            Framebuffer::new(device, render_pass, &[color.view(), depth.view()], extent)?;
        Ok(Self {
            framebuffer,
            color,
            depth,
            extent,
        })
    }
}

fn create_render_pass(device: &Arc<GraphicsDevice>, depth_format: vk::Format) -> Result<RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: COLOR_FORMAT,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let dependencies = [
        // previous frame's composite read and depth writes finish before we overwrite
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        },
        // color output visible to the composite pass's fragment shader
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            ..Default::default()
        },
    ];
    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: dependencies.len() as u32,
        p_dependencies: dependencies.as_ptr(),
        ..Default::default()
    };
    RenderPass::new(device, &rp_info)
}

fn create_set_layout(device: &Arc<GraphicsDevice>) -> Result<DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 2,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ];
    DescriptorSetLayout::new(device, &bindings)
}

fn create_pipeline(
    device: &Arc<GraphicsDevice>,
    cache: vk::PipelineCache,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
) -> Result<Pipeline> {
    let vs = ShaderModule::from_spv(device, VERT_SPV)?;
    let fs = ShaderModule::from_spv(device, FRAG_SPV)?;
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs.handle(),
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs.handle(),
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attrs = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, texcoord) as u32,
        },
    ];
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attrs.len() as u32,
        p_vertex_attribute_descriptions: attrs.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    // Back faces give the exit point; the shader finds the entry itself.
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::FRONT,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        ..Default::default()
    };
    // Premultiplied output over the clear color
    let blend_att = vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::ONE,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };
    let blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &blend_att,
        ..Default::default()
    };
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dynamic_states.len() as u32,
        p_dynamic_states: dynamic_states.as_ptr(),
        ..Default::default()
    };

    let ci = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth,
        p_color_blend_state: &blend,
        p_dynamic_state: &dynamic,
        render_pass,
        subpass: 0,
        ..Default::default()
    };
    Pipeline::layout_only(device, &[set_layout], &[])?.build(cache, ci)
}

fn create_volume_texture(device: &Arc<GraphicsDevice>, dataset: &Dataset) -> Result<GpuImage> {
    let dims = dataset.dimensions();
    let max = device.limits().max_image_dimension3_d;
    if dims.iter().any(|&d| d > max) {
        bail!(
            "volume {}x{}x{} exceeds the device limit of {} per axis",
            dims[0],
            dims[1],
            dims[2],
            max
        );
    }
    let image = GpuImage::new(
        device,
        ImageDesc::d3(
            VOLUME_FORMAT,
            dims,
            vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::SAMPLED,
        ),
    )?;
    upload::upload_image(device, &image, bytemuck::cast_slice(dataset.data()))?;
    Ok(image)
}

fn create_transfer_texture(
    device: &Arc<GraphicsDevice>,
    transfer: &TransferFunction,
) -> Result<GpuImage> {
    if transfer.is_empty() {
        bail!("transfer function has no samples");
    }
    let width = transfer.len() as u32;
    let max = device.limits().max_image_dimension1_d;
    if width > max {
        bail!("transfer function of {width} samples exceeds the device limit of {max}");
    }
    let image = GpuImage::new(
        device,
        ImageDesc::d1(
            TRANSFER_FORMAT,
            width,
            vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::SAMPLED,
        ),
    )?;
    upload::upload_image(device, &image, transfer.as_bytes())?;
    Ok(image)
}

pub struct VolumeRenderPass {
    device: Arc<GraphicsDevice>,

    target: Target,
    pipeline: Pipeline,
    sets: Vec<vk::DescriptorSet>,
    _pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
    render_pass: RenderPass,
    depth_format: vk::Format,

    vertices: Buffer,
    indices: Buffer,
    uniforms: Vec<Buffer>,
    last_uniforms: Vec<FrameUniforms>,

    volume: GpuImage,
    dimensions: [u32; 3],
    density: (f32, f32),
    transfer: GpuImage,

    volume_sampler: Sampler,
    transfer_sampler: Sampler,
    output_sampler: Sampler,

    slicing: SlicingBounds,
    clear: [f32; 4],
}

impl VolumeRenderPass {
    /// Builds every GPU object and binds a 1x1x1 placeholder volume and a
    /// single white transfer texel. Any failure here is fatal for the caller.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        cache: vk::PipelineCache,
        viewport: RenderSize,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let depth_format = device.pick_depth_format()?;
        let render_pass = create_render_pass(device, depth_format)?;
        let target = Target::new(device, render_pass.handle(), depth_format, to_extent(viewport))?;

        let set_layout = create_set_layout(device)?;
        let n = frames_in_flight as u32;
        let pool = DescriptorPool::new(
            device,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: n,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 2 * n,
                },
            ],
            n,
        )?;
        let sets = pool.allocate(set_layout.handle(), frames_in_flight)?;
        let pipeline = create_pipeline(device, cache, render_pass.handle(), set_layout.handle())
            .context("volume pipeline")?;

        let (cube_vertices, cube_indices) = cube();
        let vertices = upload::upload_buffer(device, vk::BufferUsageFlags::VERTEX_BUFFER, &cube_vertices)?;
        let indices = upload::upload_buffer(device, vk::BufferUsageFlags::INDEX_BUFFER, &cube_indices)?;

        let mut uniforms = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            uniforms.push(Buffer::mapped(
                device,
                FrameUniforms::size(),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )?);
        }

        let placeholder = Dataset::placeholder();
        let volume = create_volume_texture(device, &placeholder)?;
        let transfer = create_transfer_texture(device, &TransferFunction::default())?;

        let volume_sampler = Sampler::linear(
            device,
            vk::SamplerAddressMode::CLAMP_TO_BORDER,
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        )?;
        let transfer_sampler = Sampler::linear(
            device,
            vk::SamplerAddressMode::CLAMP_TO_EDGE,
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        )?;
        let output_sampler = Sampler::linear(
            device,
            vk::SamplerAddressMode::CLAMP_TO_EDGE,
            vk::BorderColor::FLOAT_OPAQUE_BLACK,
        )?;

        let pass = Self {
            device: device.clone(),
            target,
            pipeline,
            sets,
            _pool: pool,
            set_layout,
            render_pass,
            depth_format,
            vertices,
            indices,
            uniforms,
            last_uniforms: vec![FrameUniforms::zeroed(); frames_in_flight],
            volume,
            dimensions: placeholder.dimensions(),
            density: (placeholder.min(), placeholder.max()),
            transfer,
            volume_sampler,
            transfer_sampler,
            output_sampler,
            slicing: SlicingBounds::default(),
            clear: DEFAULT_CLEAR,
        };
        pass.write_descriptors();
        info!(
            "vk: volume pass ready ({}x{}, depth {:?})",
            pass.target.extent.width, pass.target.extent.height, depth_format
        );
        Ok(pass)
    }

    /// Points every frame's set at its uniform buffer and the current textures.
    /// Only valid while no submitted work references the sets.
    fn write_descriptors(&self) {
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = self
            .uniforms
            .iter()
            .map(|b| vk::DescriptorBufferInfo {
                buffer: b.handle(),
                offset: 0,
                range: FrameUniforms::size(),
            })
            .collect();
        let volume_info = vk::DescriptorImageInfo {
            sampler: self.volume_sampler.handle(),
            image_view: self.volume.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let transfer_info = vk::DescriptorImageInfo {
            sampler: self.transfer_sampler.handle(),
            image_view: self.transfer.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };

        let mut writes = Vec::with_capacity(self.sets.len() * 3);
        for (set, buffer_info) in self.sets.iter().zip(&buffer_infos) {
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: buffer_info,
                ..Default::default()
            });
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &volume_info,
                ..Default::default()
            });
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: 2,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &transfer_info,
                ..Default::default()
            });
        }
        unsafe { self.device.raw().update_descriptor_sets(&writes, &[]) };
    }

    /// Records the offscreen pass into an already begun `cmd`. Does not submit.
    pub fn record(&mut self, cmd: vk::CommandBuffer, frame_index: usize, scene: &Scene) -> Result<()> {
        let Some(ubo) = self.uniforms.get(frame_index) else {
            bail!("frame index {frame_index} out of range ({} slots)", self.uniforms.len());
        };
        let extent = self.target.extent;
        let aspect = RenderSize::new(extent.width, extent.height).aspect();
        let u = FrameUniforms::new(&scene.camera, aspect, self.density, self.slicing);
        ubo.write(0, &[u])?;
        self.last_uniforms[frame_index] = u;

        let d = self.device.raw();
        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass.handle(),
            framebuffer: self.target.framebuffer.handle(),
            render_area: area,
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(cmd, 0, &[area]);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[self.sets[frame_index]],
                &[],
            );
            d.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.handle()], &[0]);
            d.cmd_bind_index_buffer(cmd, self.indices.handle(), 0, vk::IndexType::UINT16);
            d.cmd_draw_indexed(cmd, CUBE_INDEX_COUNT, 1, 0, 0, 0);
            d.cmd_end_render_pass(cmd);
        }
        Ok(())
    }

    /// Rebuilds the color+depth target. Returns `Ok(false)` without touching
    /// anything when either side is zero.
    pub fn resize(&mut self, size: RenderSize) -> Result<bool> {
        if size.is_empty() {
            return Ok(false);
        }
        self.device.wait_idle()?;
        let target = Target::new(
            &self.device,
            self.render_pass.handle(),
            self.depth_format,
            to_extent(size),
        )
        .context("offscreen target")?;
        self.target = target;
        debug!("vk: offscreen target {}x{}", size.width, size.height);
        Ok(true)
    }

    pub fn replace_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        self.device.wait_idle()?;
        let volume = create_volume_texture(&self.device, dataset).context("volume upload")?;
        self.volume = volume;
        self.dimensions = dataset.dimensions();
        self.density = (dataset.min(), dataset.max());
        self.write_descriptors();
        let [x, y, z] = self.dimensions;
        info!(
            "vk: volume {}x{}x{} uploaded (density {}..{})",
            x, y, z, self.density.0, self.density.1
        );
        Ok(())
    }

    pub fn replace_transfer_function(&mut self, transfer: &TransferFunction) -> Result<()> {
        self.device.wait_idle()?;
        let texture =
            create_transfer_texture(&self.device, transfer).context("transfer function upload")?;
        self.transfer = texture;
        self.write_descriptors();
        debug!("vk: transfer function uploaded ({} samples)", transfer.len());
        Ok(())
    }

    pub fn set_slicing_bounds(&mut self, bounds: SlicingBounds) {
        self.slicing = bounds;
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
    }

    /// Rendered volume, for sampling by a later pass.
    pub fn output(&self) -> SampledImage {
        SampledImage {
            view: self.target.color.view(),
            sampler: self.output_sampler.handle(),
        }
    }

    pub fn transfer_output(&self) -> SampledImage {
        SampledImage {
            view: self.transfer.view(),
            sampler: self.transfer_sampler.handle(),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.target.extent
    }

    pub fn color_image(&self) -> &GpuImage {
        &self.target.color
    }

    pub fn depth_image(&self) -> &GpuImage {
        &self.target.depth
    }

    pub fn volume_image(&self) -> &GpuImage {
        &self.volume
    }

    pub fn transfer_image(&self) -> &GpuImage {
        &self.transfer
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    pub fn density_range(&self) -> (f32, f32) {
        self.density
    }

    pub fn slicing(&self) -> SlicingBounds {
        self.slicing
    }

    /// Uniform state written by the latest `record` for `frame_index`.
    pub fn last_uniforms(&self, frame_index: usize) -> Option<&FrameUniforms> {
        self.last_uniforms.get(frame_index)
    }
}

impl Drop for VolumeRenderPass {
    fn drop(&mut self) {
        self.device.wait_idle().ok();
    }
}
