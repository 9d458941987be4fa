//! Vertex data that owns its GPU buffers.
//!
//! Attributes are interleaved per vertex in the fixed order position, normal,
//! texture coordinate, matching the slots bound in [`Shape::draw`].

use crate::encode::{AttribSource, encode_into, encode_objects, row_stride};
use crate::error::RenderError;
use crate::gpu::{
    AttribLayout, AttribSlot, BufferId, BufferTarget, BufferUsage, GraphicsContext, TextureId,
    TextureTarget,
};
use crate::scene::DrawContext;

pub const VERTEX_DIM: usize = 3;
pub const NORMAL_DIM: usize = 3;
pub const TEXTURE_DIM: usize = 2;
/// Size in bytes of one `f32` component.
pub const COMPONENT_SIZE: usize = 4;

pub const ATTRIB_POSITION: &str = "vertCoord";
pub const ATTRIB_NORMAL: &str = "vertNormal";
pub const ATTRIB_TEXCOORD: &str = "vertTexCoord";

/// Which optional attributes a vertex carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexFormat {
    pub normals: bool,
    pub textures: bool,
}

impl VertexFormat {
    pub const POSITION: Self = Self {
        normals: false,
        textures: false,
    };

    /// Bytes per interleaved vertex.
    pub fn stride(&self) -> usize {
        let mut components = VERTEX_DIM;
        if self.normals {
            components += NORMAL_DIM;
        }
        if self.textures {
            components += TEXTURE_DIM;
        }
        components * COMPONENT_SIZE
    }

    /// Attribute names and layouts in buffer order.
    pub fn layouts(&self) -> impl Iterator<Item = (&'static str, AttribLayout)> {
        let stride = self.stride();
        let normal_offset = VERTEX_DIM * COMPONENT_SIZE;
        let texture_offset = if self.normals {
            normal_offset + NORMAL_DIM * COMPONENT_SIZE
        } else {
            normal_offset
        };
        let layout = |components: usize, offset| AttribLayout {
            components: components as u32,
            stride,
            offset,
        };
        [
            Some((ATTRIB_POSITION, layout(VERTEX_DIM, 0))),
            self.normals
                .then(|| (ATTRIB_NORMAL, layout(NORMAL_DIM, normal_offset))),
            self.textures
                .then(|| (ATTRIB_TEXCOORD, layout(TEXTURE_DIM, texture_offset))),
        ]
        .into_iter()
        .flatten()
    }
}

/// CPU-side vertex arrays. Positions are required, everything else optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<f32>,
    pub normals: Option<Vec<f32>>,
    pub textures: Option<Vec<f32>>,
    pub indices: Option<Vec<u8>>,
}

impl Geometry {
    pub fn new(vertices: impl Into<Vec<f32>>) -> Self {
        Self {
            vertices: vertices.into(),
            ..Self::default()
        }
    }

    pub fn with_normals(mut self, normals: impl Into<Vec<f32>>) -> Self {
        self.normals = Some(normals.into());
        self
    }

    pub fn with_textures(mut self, textures: impl Into<Vec<f32>>) -> Self {
        self.textures = Some(textures.into());
        self
    }

    pub fn with_indices(mut self, indices: impl Into<Vec<u8>>) -> Self {
        self.indices = Some(indices.into());
        self
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len() / VERTEX_DIM
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn format(&self) -> VertexFormat {
        VertexFormat {
            normals: self.normals.is_some(),
            textures: self.textures.is_some(),
        }
    }

    pub fn stride(&self) -> usize {
        self.format().stride()
    }

    /// Vertices drawn per draw call: the index count when indexed.
    pub fn draw_count(&self) -> usize {
        self.indices.as_ref().map_or(self.len(), Vec::len)
    }

    /// Panics when the attribute arrays disagree on the vertex count or an
    /// index points past the last vertex.
    pub fn validate(&self) {
        assert!(
            self.vertices.len() % VERTEX_DIM == 0,
            "position array length {} is not a multiple of {VERTEX_DIM}",
            self.vertices.len()
        );
        let n = self.len();
        if let Some(normals) = &self.normals {
            assert_eq!(normals.len(), n * NORMAL_DIM, "normals do not match {n} vertices");
        }
        if let Some(textures) = &self.textures {
            assert_eq!(textures.len(), n * TEXTURE_DIM, "texture coordinates do not match {n} vertices");
        }
        if let Some(indices) = &self.indices {
            if let Some(&max) = indices.iter().max() {
                assert!((max as usize) < n, "index {max} out of range for {n} vertices");
            }
        }
    }

    /// Interleaving sources in buffer order.
    pub fn sources(&self) -> Vec<AttribSource<'_>> {
        let mut sources = vec![AttribSource::f32(VERTEX_DIM, &self.vertices)];
        if let Some(normals) = &self.normals {
            sources.push(AttribSource::f32(NORMAL_DIM, normals));
        }
        if let Some(textures) = &self.textures {
            sources.push(AttribSource::f32(TEXTURE_DIM, textures));
        }
        sources
    }

    /// Interleaved bytes for vertices `[offset, len)`.
    pub fn encode(&self, offset: usize) -> Vec<u8> {
        encode_objects(offset, self.len(), &self.sources())
    }
}

/// Something that can issue its own draw call against a bound shader.
pub trait Shape {
    /// Number of vertices.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per interleaved vertex.
    fn stride(&self) -> usize;

    /// Bind attributes, draw, unbind. The model matrix is already uploaded.
    fn draw(&self, ctx: &mut DrawContext<'_>);
}

/// Enable every attribute of `format` the bound shader knows about.
///
/// Returns the slots that were enabled so the caller can disable them.
pub(crate) fn bind_attribs(
    ctx: &mut DrawContext<'_>,
    buffer: BufferId,
    format: VertexFormat,
) -> [Option<AttribSlot>; 3] {
    let mut bound = [None; 3];
    for (i, (name, layout)) in format.layouts().enumerate() {
        if let Some(slot) = ctx.attrib(name) {
            ctx.gl().enable_attrib(slot, buffer, layout);
            bound[i] = Some(slot);
        }
    }
    bound
}

pub(crate) fn unbind_attribs(ctx: &mut DrawContext<'_>, bound: [Option<AttribSlot>; 3]) {
    for slot in bound.into_iter().flatten() {
        ctx.gl().disable_attrib(slot);
    }
}

/// Geometry uploaded once and drawn many times.
#[derive(Debug)]
pub struct StaticShape {
    geometry: Geometry,
    vbo: BufferId,
    ibo: Option<BufferId>,
    texture: Option<(TextureTarget, TextureId)>,
}

impl StaticShape {
    /// Allocate the vertex buffer (and index buffer when indexed) and upload.
    ///
    /// # Panics
    /// When `geometry` fails [`Geometry::validate`].
    pub fn new(gl: &mut dyn GraphicsContext, geometry: Geometry) -> Result<Self, RenderError> {
        geometry.validate();
        let vbo = gl.create_buffer()?;
        gl.buffer_data(vbo, BufferTarget::Vertex, &geometry.encode(0), BufferUsage::Static);

        let ibo = match &geometry.indices {
            Some(indices) => {
                let ibo = gl.create_buffer()?;
                let bytes = encode_objects(0, indices.len(), &[AttribSource::u8(1, indices)]);
                gl.buffer_data(ibo, BufferTarget::Index, &bytes, BufferUsage::Static);
                Some(ibo)
            }
            None => None,
        };
        tracing::debug!(
            vertices = geometry.len(),
            stride = geometry.stride(),
            indexed = ibo.is_some(),
            "static shape uploaded"
        );
        Ok(Self {
            geometry,
            vbo,
            ibo,
            texture: None,
        })
    }

    pub fn with_texture(mut self, target: TextureTarget, texture: TextureId) -> Self {
        self.texture = Some((target, texture));
        self
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vbo
    }

    pub fn release(self, gl: &mut dyn GraphicsContext) {
        gl.delete_buffer(self.vbo);
        if let Some(ibo) = self.ibo {
            gl.delete_buffer(ibo);
        }
    }
}

impl Shape for StaticShape {
    fn len(&self) -> usize {
        self.geometry.len()
    }

    fn stride(&self) -> usize {
        self.geometry.stride()
    }

    fn draw(&self, ctx: &mut DrawContext<'_>) {
        if let Some((target, texture)) = self.texture {
            ctx.gl().bind_texture(target, texture);
        }
        let bound = bind_attribs(ctx, self.vbo, self.geometry.format());
        let count = self.geometry.draw_count() as u32;
        match self.ibo {
            Some(ibo) => ctx.gl().draw_elements(ibo, count),
            None => ctx.gl().draw_arrays(0, count),
        }
        unbind_attribs(ctx, bound);
    }
}

/// Geometry that changes between frames, streamed into a buffer allocated
/// once for `capacity` vertices.
#[derive(Debug)]
pub struct DynamicShape {
    geometry: Geometry,
    capacity: usize,
    vbo: BufferId,
    scratch: Vec<u8>,
}

impl DynamicShape {
    /// # Panics
    /// When `geometry` is indexed, invalid, or already larger than `capacity`.
    pub fn new(
        gl: &mut dyn GraphicsContext,
        geometry: Geometry,
        capacity: usize,
    ) -> Result<Self, RenderError> {
        geometry.validate();
        assert!(geometry.indices.is_none(), "dynamic shapes are not indexed");
        assert!(
            geometry.len() <= capacity,
            "{} vertices exceed capacity {capacity}",
            geometry.len()
        );
        let vbo = gl.create_buffer()?;
        gl.buffer_init(
            vbo,
            BufferTarget::Vertex,
            capacity * geometry.stride(),
            BufferUsage::Dynamic,
        );
        let mut shape = Self {
            geometry,
            capacity,
            vbo,
            scratch: Vec::new(),
        };
        shape.upload(gl, 0);
        Ok(shape)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Append vertices with the same format.
    ///
    /// # Panics
    /// On a format mismatch or when the shape would grow past its capacity.
    pub fn extend(&mut self, more: &Geometry) {
        more.validate();
        assert_eq!(more.format(), self.geometry.format(), "vertex format mismatch");
        assert!(more.indices.is_none(), "dynamic shapes are not indexed");
        assert!(
            self.geometry.len() + more.len() <= self.capacity,
            "{} + {} vertices exceed capacity {}",
            self.geometry.len(),
            more.len(),
            self.capacity
        );
        self.geometry.vertices.extend_from_slice(&more.vertices);
        if let (Some(dst), Some(src)) = (&mut self.geometry.normals, &more.normals) {
            dst.extend_from_slice(src);
        }
        if let (Some(dst), Some(src)) = (&mut self.geometry.textures, &more.textures) {
            dst.extend_from_slice(src);
        }
    }

    pub fn clear(&mut self) {
        self.geometry.vertices.clear();
        if let Some(normals) = &mut self.geometry.normals {
            normals.clear();
        }
        if let Some(textures) = &mut self.geometry.textures {
            textures.clear();
        }
    }

    /// Stream vertices `[offset, len)` to byte `offset × stride`.
    pub fn upload(&mut self, gl: &mut dyn GraphicsContext, offset: usize) {
        self.scratch.clear();
        let sources = self.geometry.sources();
        encode_into(offset, self.geometry.len(), &sources, &mut self.scratch);
        if self.scratch.is_empty() {
            return;
        }
        gl.buffer_sub_data(
            self.vbo,
            BufferTarget::Vertex,
            offset * row_stride(&sources),
            &self.scratch,
        );
    }

    pub fn release(self, gl: &mut dyn GraphicsContext) {
        gl.delete_buffer(self.vbo);
    }
}

impl Shape for DynamicShape {
    fn len(&self) -> usize {
        self.geometry.len()
    }

    fn stride(&self) -> usize {
        self.geometry.stride()
    }

    fn draw(&self, ctx: &mut DrawContext<'_>) {
        if self.geometry.is_empty() {
            return;
        }
        let bound = bind_attribs(ctx, self.vbo, self.geometry.format());
        ctx.gl().draw_arrays(0, self.geometry.len() as u32);
        unbind_attribs(ctx, bound);
    }
}
