// SPDX-License-Identifier: CEPL-1.0
//! Headless GPU checks. They need a Vulkan driver, so they are ignored by
//! default: `cargo test -p voxview-render-vk -- --ignored`.

use std::sync::Arc;

use approx::assert_relative_eq;
use glam::Vec3;
use voxview_data::{Dataset, Gradient, TransferFunction};
use voxview_render::{RenderSize, Scene, SlicingBounds, FRAMES_IN_FLIGHT};
use voxview_render_vk::pipeline_cache::PipelineCache;
use voxview_render_vk::upload::read_back_image;
use voxview_render_vk::{GraphicsDevice, VolumeRenderPass};

fn setup(size: RenderSize) -> (Arc<GraphicsDevice>, PipelineCache, VolumeRenderPass) {
    let device = GraphicsDevice::headless().expect("headless device");
    let cache = PipelineCache::in_memory(&device).expect("pipeline cache");
    let pass = VolumeRenderPass::new(&device, cache.handle(), size, FRAMES_IN_FLIGHT)
        .expect("volume pass");
    (device, cache, pass)
}

fn record_once(device: &Arc<GraphicsDevice>, pass: &mut VolumeRenderPass, frame: usize) {
    let cmd = device.begin_single_use().expect("begin");
    pass.record(cmd, frame, &Scene::default()).expect("record");
    device.submit_single_use_and_wait(cmd).expect("submit");
}

fn read_volume(device: &Arc<GraphicsDevice>, pass: &VolumeRenderPass) -> Vec<f32> {
    let bytes = read_back_image(device, pass.volume_image(), 4).expect("read back");
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn eight_voxel_dataset_round_trips() {
    let (device, _cache, mut pass) = setup(RenderSize::new(64, 64));
    let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
    let dataset = Dataset::new([2, 2, 2], data.clone()).unwrap();

    pass.replace_dataset(&dataset).unwrap();
    record_once(&device, &mut pass, 0);

    assert_eq!(pass.dimensions(), [2, 2, 2]);
    let u = pass.last_uniforms(0).unwrap();
    assert_eq!(u.min_density, 0.0);
    assert_eq!(u.max_density, 7.0);

    let texels = read_volume(&device, &pass);
    assert_eq!(texels.len(), 8);
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..2 {
                let idx = dataset.index(i, j, k);
                assert_relative_eq!(texels[idx], data[idx]);
            }
        }
    }
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn uneven_dimensions_keep_x_fastest_order() {
    let (device, _cache, mut pass) = setup(RenderSize::new(16, 16));
    let data: Vec<f32> = (0..3 * 2 * 4).map(|v| v as f32 * 0.5).collect();
    let dataset = Dataset::new([3, 2, 4], data.clone()).unwrap();
    pass.replace_dataset(&dataset).unwrap();

    let e = pass.volume_image().extent();
    assert_eq!((e.width, e.height, e.depth), (3, 2, 4));
    assert_eq!(read_volume(&device, &pass), data);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn resize_twice_gives_same_extent() {
    let (_device, _cache, mut pass) = setup(RenderSize::new(32, 32));
    assert!(pass.resize(RenderSize::new(200, 100)).unwrap());
    let first = pass.extent();
    assert!(pass.resize(RenderSize::new(200, 100)).unwrap());
    let second = pass.extent();
    assert_eq!((first.width, first.height), (200, 100));
    assert_eq!((second.width, second.height), (200, 100));
    let c = pass.color_image().extent();
    assert_eq!((c.width, c.height), (200, 100));
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn zero_extent_resize_leaves_target_untouched() {
    let (_device, _cache, mut pass) = setup(RenderSize::new(48, 24));
    let before = pass.color_image().handle();
    assert!(!pass.resize(RenderSize::new(0, 24)).unwrap());
    assert!(!pass.resize(RenderSize::new(48, 0)).unwrap());
    assert_eq!(pass.color_image().handle(), before);
    let e = pass.extent();
    assert_eq!((e.width, e.height), (48, 24));
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn transfer_function_upload_matches_samples() {
    let (device, _cache, mut pass) = setup(RenderSize::new(8, 8));
    let transfer: TransferFunction = Gradient::default().to_transfer_function(256);
    pass.replace_transfer_function(&transfer).unwrap();
    assert_eq!(pass.transfer_image().extent().width, 256);

    let bytes = read_back_image(&device, pass.transfer_image(), 4).unwrap();
    assert_eq!(bytes, transfer.as_bytes());
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn slicing_bounds_reach_next_record() {
    let (device, _cache, mut pass) = setup(RenderSize::new(8, 8));
    let bounds = SlicingBounds::new(Vec3::new(0.25, 0.0, 0.0), Vec3::new(0.75, 1.0, 0.5));
    pass.set_slicing_bounds(bounds);
    record_once(&device, &mut pass, 1);
    let u = pass.last_uniforms(1).unwrap();
    assert_eq!(u.min_slice, [0.25, 0.0, 0.0]);
    assert_eq!(u.max_slice, [0.75, 1.0, 0.5]);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn failed_replace_keeps_previous_volume() {
    let (device, _cache, mut pass) = setup(RenderSize::new(8, 8));
    let dataset = Dataset::new([2, 1, 1], vec![3.0, 5.0]).unwrap();
    pass.replace_dataset(&dataset).unwrap();

    let too_wide = device.limits().max_image_dimension3_d + 1;
    let huge = Dataset::new([too_wide, 1, 1], vec![0.0; too_wide as usize]).unwrap();
    assert!(pass.replace_dataset(&huge).is_err());

    assert_eq!(pass.dimensions(), [2, 1, 1]);
    assert_eq!(pass.density_range(), (3.0, 5.0));
    assert_eq!(read_volume(&device, &pass), vec![3.0, 5.0]);
}
