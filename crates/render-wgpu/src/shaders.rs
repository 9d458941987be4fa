use lumen_render::gpu::ProgramId;
use lumen_render::Shader;

/// Uniform names and their slots in the shared uniform block.
///
/// Every slot is 64 bytes: a `mat4x4<f32>`, or a `vec3<f32>` padded out.
pub const UNIFORM_SLOTS: &[(&str, u32)] = &[
    ("model", 0),
    ("normalMatrix", 1),
    ("view", 2),
    ("projection", 3),
    ("cameraPos", 4),
    ("material.ambient", 5),
];

/// A WGSL program shipped with the backend, plus the slot tables the render
/// core looks names up in.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinShader {
    pub name: &'static str,
    pub source: &'static str,
    pub attribs: &'static [(&'static str, u32)],
}

impl BuiltinShader {
    /// The shader handle for this program once registered as `program`.
    pub fn shader(&self, program: ProgramId) -> Shader {
        let shader = self
            .attribs
            .iter()
            .fold(Shader::new(self.name, program), |s, (name, slot)| {
                s.with_attrib(*name, *slot)
            });
        UNIFORM_SLOTS
            .iter()
            .fold(shader, |s, (name, slot)| s.with_uniform(*name, *slot))
    }
}

/// Diffuse + specular shading with a per-draw ambient colour.
pub const LIT: BuiltinShader = BuiltinShader {
    name: "lit",
    source: LIT_SHADER,
    attribs: &[("vertCoord", 0), ("vertNormal", 1)],
};

/// Unlit, position-only geometry. Used for particles.
pub const FLAT: BuiltinShader = BuiltinShader {
    name: "flat",
    source: FLAT_SHADER,
    attribs: &[("vertCoord", 0)],
};

/// Sky gradient drawn at the far plane.
pub const SKY: BuiltinShader = BuiltinShader {
    name: "sky",
    source: SKY_SHADER,
    attribs: &[("vertCoord", 0)],
};

const LIT_SHADER: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    @size(64) camera_pos: vec4<f32>,
    @size(64) ambient: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> u: Uniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) world_pos: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    let world = u.model * vec4<f32>(vertex.position, 1.0);
    var out: VertexOutput;
    out.clip_position = u.projection * u.view * world;
    out.normal = (u.normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.world_pos = world.xyz;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let light_dir = normalize(vec3<f32>(0.3, 1.0, 0.5));
    let view_dir = normalize(u.camera_pos.xyz - in.world_pos);
    let half_dir = normalize(light_dir + view_dir);
    let diffuse = max(dot(n, light_dir), 0.0);
    let specular = pow(max(dot(n, half_dir), 0.0), 32.0) * 0.3;
    let color = u.ambient.rgb + vec3<f32>(0.6, 0.6, 0.65) * diffuse + vec3<f32>(specular);
    return vec4<f32>(color, 1.0);
}
"#;

const FLAT_SHADER: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    @size(64) camera_pos: vec4<f32>,
    @size(64) ambient: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.projection * u.view * u.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.55, 0.1, 1.0);
}
"#;

const SKY_SHADER: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    @size(64) camera_pos: vec4<f32>,
    @size(64) ambient: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> u: Uniforms;

struct SkyOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) direction: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> SkyOutput {
    let clip = u.projection * u.view * vec4<f32>(position, 1.0);
    var out: SkyOutput;
    // Depth of exactly 1.0 keeps the sky behind everything.
    out.clip_position = clip.xyww;
    out.direction = position;
    return out;
}

@fragment
fn fs_main(in: SkyOutput) -> @location(0) vec4<f32> {
    let t = clamp(normalize(in.direction).y * 0.5 + 0.5, 0.0, 1.0);
    let horizon = vec3<f32>(0.75, 0.8, 0.9);
    let zenith = vec3<f32>(0.2, 0.35, 0.7);
    return vec4<f32>(mix(horizon, zenith, t), 1.0);
}
"#;
