// SPDX-License-Identifier: CEPL-1.0
use crate::{camera, Camera, SlicingBounds};
use bytemuck::{Pod, Zeroable};

/// std140 image of the ray-march uniform block:
///
/// ```glsl
/// layout(set = 0, binding = 0) uniform Frame {
///     mat4 view; mat4 proj; vec3 camera_position;
///     float min_density; float max_density;
///     vec3 min_slice; vec3 max_slice;
/// };
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub min_density: f32,
    pub max_density: f32,
    _pad0: [f32; 3],
    pub min_slice: [f32; 3],
    _pad1: f32,
    pub max_slice: [f32; 3],
    _pad2: f32,
}

impl FrameUniforms {
    pub fn new(camera: &Camera, aspect: f32, density: (f32, f32), slicing: SlicingBounds) -> Self {
        Self {
            view: camera.view().to_cols_array_2d(),
            proj: camera::projection(aspect).to_cols_array_2d(),
            camera_position: camera.position().to_array(),
            min_density: density.0,
            max_density: density.1,
            min_slice: slicing.min().to_array(),
            max_slice: slicing.max().to_array(),
            ..Zeroable::zeroed()
        }
    }

    pub fn size() -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::mem::offset_of;

    #[test]
    fn layout_matches_std140() {
        assert_eq!(offset_of!(FrameUniforms, view), 0);
        assert_eq!(offset_of!(FrameUniforms, proj), 64);
        assert_eq!(offset_of!(FrameUniforms, camera_position), 128);
        assert_eq!(offset_of!(FrameUniforms, min_density), 140);
        assert_eq!(offset_of!(FrameUniforms, max_density), 144);
        assert_eq!(offset_of!(FrameUniforms, min_slice), 160);
        assert_eq!(offset_of!(FrameUniforms, max_slice), 176);
        assert_eq!(FrameUniforms::size(), 192);
    }

    #[test]
    fn carries_density_and_slicing() {
        let bounds = SlicingBounds::new(Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.9, 0.8, 0.7));
        let u = FrameUniforms::new(&Camera::default(), 1.0, (0.0, 7.0), bounds);
        assert_eq!((u.min_density, u.max_density), (0.0, 7.0));
        assert_eq!(u.min_slice, [0.1, 0.2, 0.3]);
        assert_eq!(u.max_slice, [0.9, 0.8, 0.7]);
        assert!((u.camera_position[1] + 3.0).abs() < 1e-5);
    }
}
