// SPDX-License-Identifier: CEPL-1.0
//! Staging uploads and read-backs through one-shot command buffers.

use anyhow::{bail, Result};
use ash::vk;

use crate::device::GraphicsDevice;
use crate::resources::{Buffer, GpuImage};
use std::sync::Arc;

/// Tightly packed copy of the whole image (mip 0, layer 0).
pub fn full_copy_region(extent: vk::Extent3D, aspect: vk::ImageAspectFlags) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: aspect,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: extent,
    }
}

pub fn texel_count(extent: vk::Extent3D) -> u64 {
    extent.width as u64 * extent.height as u64 * extent.depth as u64
}

/// Access masks and stages for the layout changes used here.
fn barrier_masks(
    layout: vk::ImageLayout,
) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        _ => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

pub fn transition(
    d: &ash::Device,
    cmd: vk::CommandBuffer,
    image: &GpuImage,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) {
    let (src_access, src_stage) = barrier_masks(old);
    let (dst_access, dst_stage) = barrier_masks(new);
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image: image.handle(),
        subresource_range: image.desc().subresource_range(),
        ..Default::default()
    };
    unsafe {
        d.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&barrier),
        );
    }
}

/// host -> staging -> `image`, leaving it SHADER_READ_ONLY_OPTIMAL.
/// `image` must be freshly created (UNDEFINED layout).
pub fn upload_image(device: &Arc<GraphicsDevice>, image: &GpuImage, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        bail!("empty image upload");
    }
    let staging = Buffer::with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, bytes)?;
    let region = full_copy_region(image.extent(), image.desc().aspect);

    device.run_single_use(|d, cmd| {
        transition(
            d,
            cmd,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            d.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        }
        transition(
            d,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    })
}

/// Device-local buffer filled through a staging copy.
pub fn upload_buffer<T: bytemuck::Pod>(
    device: &Arc<GraphicsDevice>,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        bail!("empty buffer upload");
    }
    let size = bytes.len() as vk::DeviceSize;
    let staging = Buffer::with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, bytes)?;
    let dst = Buffer::new(
        device,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    device.run_single_use(|d, cmd| unsafe {
        d.cmd_copy_buffer(cmd, staging.handle(), dst.handle(), std::slice::from_ref(&region));
    })?;
    Ok(dst)
}

/// Copies a SHADER_READ_ONLY_OPTIMAL image back to the host and restores its layout.
pub fn read_back_image(
    device: &Arc<GraphicsDevice>,
    image: &GpuImage,
    bytes_per_texel: u64,
) -> Result<Vec<u8>> {
    let size = texel_count(image.extent()) * bytes_per_texel;
    let readback = Buffer::mapped(device, size, vk::BufferUsageFlags::TRANSFER_DST)?;
    let region = full_copy_region(image.extent(), image.desc().aspect);

    device.run_single_use(|d, cmd| {
        transition(
            d,
            cmd,
            image,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        unsafe {
            d.cmd_copy_image_to_buffer(
                cmd,
                image.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback.handle(),
                std::slice::from_ref(&region),
            );
        }
        transition(
            d,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    })?;
    readback.read()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_region_covers_whole_extent() {
        let extent = vk::Extent3D { width: 4, height: 3, depth: 2 };
        let r = full_copy_region(extent, vk::ImageAspectFlags::COLOR);
        assert_eq!(r.image_extent, extent);
        assert_eq!(r.buffer_row_length, 0);
        assert_eq!(r.buffer_image_height, 0);
        assert_eq!(r.image_subresource.layer_count, 1);
        assert_eq!(texel_count(extent), 24);
    }

    #[test]
    fn transitions_into_sampling_wait_for_transfer_writes() {
        let (src_access, src_stage) = barrier_masks(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let (dst_access, dst_stage) = barrier_masks(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }
}
