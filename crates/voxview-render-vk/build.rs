use std::{env, fs, path::PathBuf};

// Offscreen ray marcher. Vertex layout matches `volume_pass::Vertex`:
//   - binding 0, location 0: R32G32B32_SFLOAT (pos, cube in [-0.5, 0.5])
//   - binding 0, location 1: R32G32B32_SFLOAT (texcoord, pos + 0.5)
// Uniform block is std140 and mirrors `voxview_render::FrameUniforms`.
const FRAME_UNIFORMS: &str = r#"
layout(set = 0, binding = 0) uniform Frame {
    mat4 view;
    mat4 proj;
    vec3 camera_position;
    float min_density;
    float max_density;
    vec3 min_slice;
    vec3 max_slice;
} u;
"#;

const VOLUME_VS: &str = r#"
layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inTexcoord;

layout(location = 0) out vec3 vTexcoord;

void main() {
    vTexcoord = inTexcoord;
    gl_Position = u.proj * u.view * vec4(inPos, 1.0);
}
"#;

// Back faces are rasterised so the march also works with the eye inside the cube.
// The entry point comes from a slab test against the unit box in texture space.
const VOLUME_FS: &str = r#"
layout(set = 0, binding = 1) uniform sampler3D uVolume;
layout(set = 0, binding = 2) uniform sampler1D uTransfer;

layout(location = 0) in vec3 vTexcoord;
layout(location = 0) out vec4 outColor;

const int MAX_STEPS = 2048;

bool inside_slice(vec3 p) {
    return all(greaterThanEqual(p, u.min_slice)) && all(lessThanEqual(p, u.max_slice));
}

void main() {
    vec3 eye = u.camera_position + vec3(0.5);
    vec3 exit_point = vTexcoord;
    vec3 ray = exit_point - eye;
    float t_far = length(ray);
    vec3 dir = ray / max(t_far, 1e-6);

    vec3 inv = 1.0 / dir;
    vec3 t0 = (vec3(0.0) - eye) * inv;
    vec3 t1 = (vec3(1.0) - eye) * inv;
    vec3 tmin = min(t0, t1);
    float t_near = max(max(max(tmin.x, tmin.y), tmin.z), 0.0);

    vec3 size = vec3(textureSize(uVolume, 0));
    float max_dim = max(size.x, max(size.y, size.z));
    float step_len = max(0.5 / max_dim, 1.0 / 1024.0);
    float range = max(u.max_density - u.min_density, 1e-6);

    vec4 acc = vec4(0.0);
    float t = t_near;
    for (int i = 0; i < MAX_STEPS && t < t_far; ++i) {
        vec3 p = eye + dir * t;
        t += step_len;
        if (!inside_slice(p)) {
            continue;
        }
        float density = clamp((texture(uVolume, p).r - u.min_density) / range, 0.0, 1.0);
        vec4 tf = texture(uTransfer, density);
        // opacity is authored per voxel; rescale for the actual step length
        float a = 1.0 - pow(1.0 - clamp(tf.a, 0.0, 1.0), step_len * max_dim);
        acc.rgb += (1.0 - acc.a) * tf.rgb * a;
        acc.a += (1.0 - acc.a) * a;
        if (acc.a > 0.99) {
            break;
        }
    }
    outColor = acc;
}
"#;

// Full-screen triangle sampling the offscreen target. Push constants must match
// `composite::CompositePush`.
const COMPOSITE_VS: &str = r#"
#version 450
layout(location = 0) out vec2 vUv;

void main() {
    vec2 pos = vec2((gl_VertexIndex << 1) & 2, gl_VertexIndex & 2);
    vUv = pos;
    gl_Position = vec4(pos * 2.0 - 1.0, 0.0, 1.0);
}
"#;

const COMPOSITE_FS: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform sampler2D uScene;
layout(set = 0, binding = 1) uniform sampler1D uTransfer;

layout(push_constant) uniform Composite {
    float brightness;
    float contrast;
    float strip_height;
    float _pad;
} pc;

layout(location = 0) in vec2 vUv;
layout(location = 0) out vec4 outColor;

void main() {
    if (vUv.y > 1.0 - pc.strip_height) {
        outColor = vec4(texture(uTransfer, vUv.x).rgb, 1.0);
        return;
    }
    vec3 c = texture(uScene, vUv).rgb;
    c = (c - 0.5) * (1.0 + pc.contrast) + 0.5 + pc.brightness;
    outColor = vec4(clamp(c, 0.0, 1.0), 1.0);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let volume_vs = format!("#version 450\n{FRAME_UNIFORMS}{VOLUME_VS}");
    let volume_fs = format!("#version 450\n{FRAME_UNIFORMS}{VOLUME_FS}");

    let shaders = [
        ("volume.vert", volume_vs.as_str(), shaderc::ShaderKind::Vertex),
        ("volume.frag", volume_fs.as_str(), shaderc::ShaderKind::Fragment),
        ("composite.vert", COMPOSITE_VS, shaderc::ShaderKind::Vertex),
        ("composite.frag", COMPOSITE_FS, shaderc::ShaderKind::Fragment),
    ];

    for (name, src, kind) in shaders {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
            .unwrap_or_else(|e| panic!("write {name}.spv: {e}"));
    }

    // Re-run if this file changes (inline sources live here)
    println!("cargo:rerun-if-changed=build.rs");
}
