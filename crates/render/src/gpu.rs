//! The graphics-context seam and the shader provider handles.
//!
//! The render core never talks to a driver directly. Everything it needs from
//! the GPU goes through [`GraphicsContext`], so the same scene can be drawn by
//! the wgpu backend or recorded for inspection.

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Vertex attribute location inside a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttribSlot(pub u32);

/// Uniform location inside a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformSlot(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Uploaded once, drawn many times.
    Static,
    /// Rewritten (fully or partially) every frame.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2d,
    CubeMap,
}

/// How one float attribute is laid out inside an interleaved vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLayout {
    /// Number of `f32` components (1 to 4).
    pub components: u32,
    /// Bytes between consecutive vertices.
    pub stride: usize,
    /// Byte offset of the attribute inside a vertex.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub compare: CompareFunc,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            compare: CompareFunc::Less,
            write: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub compare: CompareFunc,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilState {
    /// Writes `reference` into every covered pixel.
    pub fn write(reference: u32) -> Self {
        Self {
            compare: CompareFunc::Always,
            reference,
            read_mask: 0xFF,
            write_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Replace,
        }
    }

    /// Passes only where the stencil equals `reference`; leaves the buffer untouched.
    pub fn test_equal(reference: u32) -> Self {
        Self {
            compare: CompareFunc::Equal,
            reference,
            read_mask: 0xFF,
            write_mask: 0x00,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }
}

/// A GL-style immediate graphics context.
///
/// Draw calls always use triangle lists. Indices are 8-bit unsigned.
pub trait GraphicsContext {
    /// Create an empty buffer handle. Failure makes the requesting object unusable.
    fn create_buffer(&mut self) -> Result<BufferId, RenderError>;

    /// Allocate `size` bytes of uninitialised storage.
    fn buffer_init(&mut self, buffer: BufferId, target: BufferTarget, size: usize, usage: BufferUsage);

    /// Replace the whole buffer with `data`.
    fn buffer_data(&mut self, buffer: BufferId, target: BufferTarget, data: &[u8], usage: BufferUsage);

    /// Overwrite `data.len()` bytes starting at `offset`.
    ///
    /// # Panics
    /// Implementations panic when the write extends past the allocation.
    fn buffer_sub_data(&mut self, buffer: BufferId, target: BufferTarget, offset: usize, data: &[u8]);

    fn delete_buffer(&mut self, buffer: BufferId);

    fn use_program(&mut self, program: ProgramId);

    fn uniform_mat4(&mut self, slot: UniformSlot, value: &Mat4);

    fn uniform_vec3(&mut self, slot: UniformSlot, value: Vec3);

    fn enable_attrib(&mut self, slot: AttribSlot, buffer: BufferId, layout: AttribLayout);

    fn disable_attrib(&mut self, slot: AttribSlot);

    fn draw_arrays(&mut self, first: u32, count: u32);

    fn draw_elements(&mut self, indices: BufferId, count: u32);

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId);

    fn set_depth(&mut self, state: DepthState);

    /// `None` disables the stencil test.
    fn set_stencil(&mut self, state: Option<StencilState>);

    fn clear_stencil(&mut self);
}

/// Non-owning handle to a shader held by a [`ShaderRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// A linked program plus its attribute and uniform tables.
///
/// Built by the external shader loader; the core only looks slots up by name.
#[derive(Debug, Clone)]
pub struct Shader {
    name: String,
    program: ProgramId,
    attribs: HashMap<String, AttribSlot>,
    uniforms: HashMap<String, UniformSlot>,
}

impl Shader {
    pub fn new(name: impl Into<String>, program: ProgramId) -> Self {
        Self {
            name: name.into(),
            program,
            attribs: HashMap::new(),
            uniforms: HashMap::new(),
        }
    }

    pub fn with_attrib(mut self, name: impl Into<String>, slot: u32) -> Self {
        self.attribs.insert(name.into(), AttribSlot(slot));
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, slot: u32) -> Self {
        self.uniforms.insert(name.into(), UniformSlot(slot));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn attrib(&self, name: &str) -> Option<AttribSlot> {
        self.attribs.get(name).copied()
    }

    pub fn uniform(&self, name: &str) -> Option<UniformSlot> {
        self.uniforms.get(name).copied()
    }
}

/// Externally owned set of shaders. Nodes refer to entries by [`ShaderId`].
#[derive(Debug, Clone, Default)]
pub struct ShaderRegistry {
    shaders: Vec<Shader>,
    by_name: HashMap<String, ShaderId>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shader. Re-registering a name replaces the shader in place
    /// and keeps its id, so existing nodes pick up the reloaded program.
    pub fn register(&mut self, shader: Shader) -> ShaderId {
        if let Some(&id) = self.by_name.get(shader.name()) {
            tracing::debug!(name = shader.name(), ?id, "replacing shader");
            self.shaders[id.0 as usize] = shader;
            return id;
        }
        let id = ShaderId(self.shaders.len() as u32);
        self.by_name.insert(shader.name().to_owned(), id);
        self.shaders.push(shader);
        id
    }

    pub fn get(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(id.0 as usize)
    }

    pub fn resolve(&self, id: ShaderId) -> Result<&Shader, RenderError> {
        self.get(id).ok_or(RenderError::UnknownShader(id))
    }

    pub fn lookup(&self, name: &str) -> Option<ShaderId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
