// SPDX-License-Identifier: CEPL-1.0
//! Presentation-side pass: a full-screen triangle sampling the offscreen
//! volume, with brightness/contrast applied and a transfer-function preview
//! strip along the bottom edge.

use std::ffi::CStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use voxview_render::Scene;

use crate::device::GraphicsDevice;
use crate::resources::{DescriptorPool, DescriptorSetLayout, Pipeline, SampledImage, ShaderModule};

const VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/composite.vert.spv"));
const FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/composite.frag.spv"));
const ENTRY: &CStr = c"main";

/// Fraction of the window height used by the preview strip.
pub const TRANSFER_STRIP_HEIGHT: f32 = 0.04;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CompositePush {
    pub brightness: f32,
    pub contrast: f32,
    pub strip_height: f32,
    _pad: f32,
}

impl CompositePush {
    /// Brightness and contrast are 0..=100 in the scene, 0..=1 on the GPU.
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            brightness: scene.brightness.clamp(0.0, 100.0) / 100.0,
            contrast: scene.contrast.clamp(0.0, 100.0) / 100.0,
            strip_height: if scene.show_transfer_strip {
                TRANSFER_STRIP_HEIGHT
            } else {
                0.0
            },
            _pad: 0.0,
        }
    }
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

    // vertices come from gl_VertexIndex
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
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
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let blend_att = vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
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

    let push = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        offset: 0,
        size: std::mem::size_of::<CompositePush>() as u32,
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
        p_color_blend_state: &blend,
        p_dynamic_state: &dynamic,
        render_pass,
        subpass: 0,
        ..Default::default()
    };
    Pipeline::layout_only(device, &[set_layout], std::slice::from_ref(&push))?.build(cache, ci)
}

pub struct CompositePass {
    device: Arc<GraphicsDevice>,
    pipeline: Pipeline,
    set: vk::DescriptorSet,
    _pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
}

impl CompositePass {
    /// `render_pass` is the swapchain pass this pipeline draws in.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        cache: vk::PipelineCache,
        render_pass: vk::RenderPass,
        scene: SampledImage,
        transfer: SampledImage,
    ) -> Result<Self> {
        let sampler_binding = |binding| vk::DescriptorSetLayoutBinding {
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        };
        let set_layout = DescriptorSetLayout::new(device, &[sampler_binding(0), sampler_binding(1)])?;
        let pool = DescriptorPool::new(
            device,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2,
            }],
            1,
        )?;
        let set = pool.allocate(set_layout.handle(), 1)?[0];
        let pipeline = create_pipeline(device, cache, render_pass, set_layout.handle())
            .context("composite pipeline")?;

        let pass = Self {
            device: device.clone(),
            pipeline,
            set,
            _pool: pool,
            set_layout,
        };
        pass.rebind(scene, transfer);
        Ok(pass)
    }

    /// Re-points the descriptor set. Only valid while the device is idle.
    pub fn rebind(&self, scene: SampledImage, transfer: SampledImage) {
        let info = |s: SampledImage| vk::DescriptorImageInfo {
            sampler: s.sampler,
            image_view: s.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let infos = [info(scene), info(transfer)];
        let writes: Vec<vk::WriteDescriptorSet> = infos
            .iter()
            .enumerate()
            .map(|(i, image_info)| vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: self.set,
                dst_binding: i as u32,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: image_info,
                ..Default::default()
            })
            .collect();
        unsafe { self.device.raw().update_descriptor_sets(&writes, &[]) };
    }

    /// The swapchain render pass was rebuilt for a new surface format.
    pub fn rebuild_pipeline(&mut self, cache: vk::PipelineCache, render_pass: vk::RenderPass) -> Result<()> {
        self.pipeline = create_pipeline(&self.device, cache, render_pass, self.set_layout.handle())
            .context("composite pipeline")?;
        Ok(())
    }

    /// Records inside an already begun swapchain render pass.
    pub fn record(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D, push: CompositePush) {
        let d = self.device.raw();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(cmd, 0, &[scissor]);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[self.set],
                &[],
            );
            d.cmd_push_constants(
                cmd,
                self.pipeline.layout(),
                vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&push),
            );
            d.cmd_draw(cmd, 3, 1, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_block_is_four_floats() {
        assert_eq!(std::mem::size_of::<CompositePush>(), 16);
    }

    #[test]
    fn scene_controls_are_normalised() {
        let scene = Scene {
            brightness: 50.0,
            contrast: 100.0,
            show_transfer_strip: false,
            ..Scene::default()
        };
        let p = CompositePush::from_scene(&scene);
        assert_eq!(p.brightness, 0.5);
        assert_eq!(p.contrast, 1.0);
        assert_eq!(p.strip_height, 0.0);
    }

    #[test]
    fn default_scene_shows_strip_and_neutral_grading() {
        let p = CompositePush::from_scene(&Scene::default());
        assert_eq!(p.brightness, 0.0);
        assert_eq!(p.contrast, 0.0);
        assert_eq!(p.strip_height, TRANSFER_STRIP_HEIGHT);
    }
}
