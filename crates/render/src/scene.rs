//! Nodes, the per-frame binding cache and the scene that drives them.
//!
//! A frame goes through [`FrameContext`]: for each drawable it activates the
//! drawable's shader only when it differs from the active one, and uploads the
//! camera uniforms only the first time a shader is seen in that frame. The
//! cache lives exactly as long as the frame context.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use glam::{Mat4, Vec3};
use lumen_common::LocalTransform;

use crate::camera::Camera;
use crate::error::RenderError;
use crate::gpu::{AttribSlot, GraphicsContext, Shader, ShaderId, ShaderRegistry};
use crate::shape::Shape;

pub const UNIFORM_MODEL: &str = "model";
pub const UNIFORM_NORMAL_MATRIX: &str = "normalMatrix";
pub const UNIFORM_VIEW: &str = "view";
pub const UNIFORM_PROJECTION: &str = "projection";
pub const UNIFORM_CAMERA_POS: &str = "cameraPos";
pub const UNIFORM_AMBIENT: &str = "material.ambient";

/// Inverse-transpose of `model × view`. Identity when the product is singular.
pub fn normal_matrix(model: &Mat4, view: &Mat4) -> Mat4 {
    let mv = *model * *view;
    if mv.determinant().abs() <= f32::EPSILON {
        tracing::debug!("model-view matrix is singular, using identity normal matrix");
        return Mat4::IDENTITY;
    }
    mv.inverse().transpose()
}

/// Anything the scene can draw.
pub trait Drawable {
    /// Upload per-object uniforms and issue draw calls.
    fn draw(&self, ctx: &mut DrawContext<'_>);

    /// Effective model matrix under `parent`.
    fn transform(&self, parent: &LocalTransform) -> Mat4;

    fn shader(&self) -> ShaderId;

    /// Whether the frame should bind view, projection and camera position
    /// for this drawable's shader. Drawables that upload their own camera
    /// matrices return `false`.
    fn uses_camera_uniforms(&self) -> bool {
        true
    }
}

pub type SharedDrawable = Rc<dyn Drawable>;

/// State handed to a single drawable: the bound shader and the transform it
/// inherits.
pub struct DrawContext<'f> {
    gl: &'f mut dyn GraphicsContext,
    camera: &'f dyn Camera,
    shader: &'f Shader,
    parent: LocalTransform,
}

impl<'f> DrawContext<'f> {
    /// A context for a shader the caller has already activated.
    pub fn new(gl: &'f mut dyn GraphicsContext, camera: &'f dyn Camera, shader: &'f Shader) -> Self {
        Self {
            gl,
            camera,
            shader,
            parent: LocalTransform::Identity,
        }
    }

    pub fn gl(&mut self) -> &mut dyn GraphicsContext {
        &mut *self.gl
    }

    pub fn camera(&self) -> &'f dyn Camera {
        self.camera
    }

    pub fn shader(&self) -> &'f Shader {
        self.shader
    }

    pub fn parent(&self) -> &LocalTransform {
        &self.parent
    }

    pub fn attrib(&self, name: &str) -> Option<AttribSlot> {
        let slot = self.shader.attrib(name);
        if slot.is_none() {
            tracing::trace!(shader = self.shader.name(), name, "attribute not in shader, skipped");
        }
        slot
    }

    /// Upload to the named uniform; a name the shader lacks is skipped.
    pub fn uniform_mat4(&mut self, name: &str, value: &Mat4) {
        match self.shader.uniform(name) {
            Some(slot) => self.gl.uniform_mat4(slot, value),
            None => tracing::trace!(shader = self.shader.name(), name, "uniform not in shader, skipped"),
        }
    }

    pub fn uniform_vec3(&mut self, name: &str, value: Vec3) {
        match self.shader.uniform(name) {
            Some(slot) => self.gl.uniform_vec3(slot, value),
            None => tracing::trace!(shader = self.shader.name(), name, "uniform not in shader, skipped"),
        }
    }

    /// Upload `model` and the matching normal matrix.
    pub fn upload_model(&mut self, model: &Mat4) {
        let normal = normal_matrix(model, &self.camera.view());
        self.uniform_mat4(UNIFORM_MODEL, model);
        self.uniform_mat4(UNIFORM_NORMAL_MATRIX, &normal);
    }

    /// Upload camera position, view and projection.
    pub fn upload_camera(&mut self) {
        let camera = self.camera;
        self.uniform_vec3(UNIFORM_CAMERA_POS, camera.position());
        self.uniform_mat4(UNIFORM_VIEW, &camera.view());
        self.uniform_mat4(UNIFORM_PROJECTION, &camera.projection());
    }

    /// Reborrow with a different inherited transform.
    pub fn with_parent(&mut self, parent: LocalTransform) -> DrawContext<'_> {
        DrawContext {
            gl: &mut *self.gl,
            camera: self.camera,
            shader: self.shader,
            parent,
        }
    }
}

/// A shape drawn with a shader under an optional local transform.
pub struct Node {
    shape: Box<dyn Shape>,
    transform: LocalTransform,
    shader: ShaderId,
}

impl Node {
    pub fn new(shape: impl Shape + 'static, shader: ShaderId) -> Self {
        Self {
            shape: Box::new(shape),
            transform: LocalTransform::Identity,
            shader,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<LocalTransform>) -> Self {
        self.transform = transform.into();
        self
    }

    pub fn local_transform(&self) -> &LocalTransform {
        &self.transform
    }

    pub fn shape(&self) -> &dyn Shape {
        self.shape.as_ref()
    }
}

impl Drawable for Node {
    fn draw(&self, ctx: &mut DrawContext<'_>) {
        let model = self.transform(ctx.parent());
        ctx.upload_model(&model);
        self.shape.draw(ctx);
    }

    fn transform(&self, parent: &LocalTransform) -> Mat4 {
        self.transform.compose(parent)
    }

    fn shader(&self) -> ShaderId {
        self.shader
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("vertices", &self.shape.len())
            .field("transform", &self.transform)
            .field("shader", &self.shader)
            .finish()
    }
}

/// Counters for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub shader_switches: u32,
    pub camera_uploads: u32,
    pub draws: u32,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} draws, {} shader switches, {} camera uploads",
            self.draws, self.shader_switches, self.camera_uploads
        )
    }
}

/// Per-frame state. Build a new one every frame.
pub struct FrameContext<'a> {
    gl: &'a mut dyn GraphicsContext,
    camera: &'a dyn Camera,
    shaders: &'a ShaderRegistry,
    active: Option<ShaderId>,
    camera_bound: HashSet<ShaderId>,
    stats: FrameStats,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        gl: &'a mut dyn GraphicsContext,
        camera: &'a dyn Camera,
        shaders: &'a ShaderRegistry,
    ) -> Self {
        Self {
            gl,
            camera,
            shaders,
            active: None,
            camera_bound: HashSet::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn camera(&self) -> &'a dyn Camera {
        self.camera
    }

    /// Bind `id` if needed and return a context for drawing with it.
    pub fn draw_context(
        &mut self,
        id: ShaderId,
        camera_uniforms: bool,
    ) -> Result<DrawContext<'_>, RenderError> {
        let shaders = self.shaders;
        let shader = shaders.resolve(id)?;
        if self.active != Some(id) {
            self.gl.use_program(shader.program());
            self.active = Some(id);
            self.stats.shader_switches += 1;
        }

        // A drawable that uploads its own view leaves the shader's camera
        // uniforms stale for whoever uses it next.
        let upload_camera = if camera_uniforms {
            self.camera_bound.insert(id)
        } else {
            self.camera_bound.remove(&id);
            false
        };

        let mut ctx = DrawContext::new(&mut *self.gl, self.camera, shader);
        if upload_camera {
            ctx.upload_camera();
            self.stats.camera_uploads += 1;
        }
        Ok(ctx)
    }

    pub fn draw(&mut self, item: &dyn Drawable) -> Result<(), RenderError> {
        self.draw_with_parent(item, &LocalTransform::Identity)
    }

    pub fn draw_with_parent(
        &mut self,
        item: &dyn Drawable,
        parent: &LocalTransform,
    ) -> Result<(), RenderError> {
        let mut ctx = self.draw_context(item.shader(), item.uses_camera_uniforms())?;
        ctx.parent = *parent;
        item.draw(&mut ctx);
        self.stats.draws += 1;
        Ok(())
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// End the frame and return its counters.
    pub fn finish(self) -> FrameStats {
        tracing::trace!(
            draws = self.stats.draws,
            shader_switches = self.stats.shader_switches,
            camera_uploads = self.stats.camera_uploads,
            "frame finished"
        );
        self.stats
    }
}

/// Ordered drawables. Insertion order is draw order.
#[derive(Default)]
pub struct Scene {
    nodes: Vec<SharedDrawable>,
    transform: LocalTransform,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root transform inherited by every node.
    pub fn with_transform(mut self, transform: impl Into<LocalTransform>) -> Self {
        self.transform = transform.into();
        self
    }

    /// Append a drawable and return a shared handle to it, e.g. for a
    /// floor's reflection list.
    pub fn add<D: Drawable + 'static>(&mut self, item: D) -> SharedDrawable {
        let shared: SharedDrawable = Rc::new(item);
        self.nodes.push(Rc::clone(&shared));
        shared
    }

    pub fn add_shared(&mut self, item: SharedDrawable) {
        self.nodes.push(item);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn draw(&self, frame: &mut FrameContext<'_>) -> Result<(), RenderError> {
        for node in &self.nodes {
            frame.draw_with_parent(node.as_ref(), &self.transform)?;
        }
        Ok(())
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} nodes", self.nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraControl, FixedCamera, Perspective, QuatCamera};
    use crate::gpu::{ProgramId, UniformSlot};
    use crate::recording::{GpuCommand, RecordingContext};
    use crate::shape::{ATTRIB_POSITION, Geometry, StaticShape};
    use lumen_common::geometry::quad;

    fn lit_shader(name: &str, program: u32) -> Shader {
        Shader::new(name, ProgramId(program))
            .with_attrib(ATTRIB_POSITION, 0)
            .with_uniform(UNIFORM_MODEL, 0)
            .with_uniform(UNIFORM_NORMAL_MATRIX, 1)
            .with_uniform(UNIFORM_VIEW, 2)
            .with_uniform(UNIFORM_PROJECTION, 3)
            .with_uniform(UNIFORM_CAMERA_POS, 4)
    }

    fn quad_node(gl: &mut RecordingContext, shader: ShaderId) -> Node {
        let shape = StaticShape::new(gl, Geometry::new(quad(Vec3::ZERO, Vec3::ONE))).unwrap();
        Node::new(shape, shader)
    }

    #[test]
    fn transform_without_local_is_parent() {
        let mut gl = RecordingContext::new();
        let node = quad_node(&mut gl, ShaderId(0));
        assert_eq!(node.transform(&LocalTransform::Identity), Mat4::IDENTITY);
        let parent = Mat4::from_translation(Vec3::X);
        assert_eq!(node.transform(&parent.into()), parent);
    }

    #[test]
    fn transform_is_local_times_parent() {
        let mut gl = RecordingContext::new();
        let local = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let parent = Mat4::from_rotation_y(0.7) * Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let node = quad_node(&mut gl, ShaderId(0)).with_transform(local);
        assert_eq!(node.transform(&parent.into()), local * parent);
        assert_eq!(node.transform(&LocalTransform::Identity), local);
    }

    #[test]
    fn normal_matrix_of_singular_is_identity() {
        assert_eq!(normal_matrix(&Mat4::ZERO, &Mat4::IDENTITY), Mat4::IDENTITY);
        let m = Mat4::from_scale(Vec3::new(2.0, 4.0, 8.0));
        let n = normal_matrix(&m, &Mat4::IDENTITY);
        assert!(n.abs_diff_eq(Mat4::from_scale(Vec3::new(0.5, 0.25, 0.125)), 1e-6));
    }

    #[test]
    fn shared_shader_binds_once_per_frame() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let id = shaders.register(lit_shader("lit", 7));
        let mut scene = Scene::new();
        for _ in 0..3 {
            let node = quad_node(&mut gl, id);
            scene.add(node);
        }
        gl.take_commands();

        let camera = QuatCamera::new();
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        scene.draw(&mut frame).unwrap();
        let stats = frame.finish();

        assert_eq!(stats.draws, 3);
        assert_eq!(stats.shader_switches, 1);
        assert_eq!(stats.camera_uploads, 1);
        assert_eq!(gl.count(|c| matches!(c, GpuCommand::UseProgram(_))), 1);
        assert_eq!(gl.uniform_uploads(UniformSlot(2)), 1);
        assert_eq!(gl.uniform_uploads(UniformSlot(4)), 1);
        // Model and normal matrix go up once per node.
        assert_eq!(gl.uniform_uploads(UniformSlot(0)), 3);
        assert_eq!(gl.draw_calls(), 3);
    }

    #[test]
    fn alternating_shaders_switch_but_upload_camera_once_each() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let a = shaders.register(lit_shader("a", 1));
        let b = shaders.register(lit_shader("b", 2));
        let mut scene = Scene::new();
        for id in [a, b, a, a] {
            let node = quad_node(&mut gl, id);
            scene.add(node);
        }

        let camera = QuatCamera::new();
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        scene.draw(&mut frame).unwrap();
        let stats = frame.finish();
        assert_eq!(stats.shader_switches, 3);
        assert_eq!(stats.camera_uploads, 2);
    }

    #[test]
    fn cache_does_not_survive_frames() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let id = shaders.register(lit_shader("lit", 1));
        let mut scene = Scene::new();
        let node = quad_node(&mut gl, id);
        scene.add(node);

        let camera = QuatCamera::new();
        for _ in 0..2 {
            let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
            scene.draw(&mut frame).unwrap();
            assert_eq!(frame.finish().camera_uploads, 1);
        }
        assert_eq!(gl.count(|c| matches!(c, GpuCommand::UseProgram(_))), 2);
    }

    #[test]
    fn uploads_camera_matrices() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let id = shaders.register(lit_shader("lit", 1));
        let node = quad_node(&mut gl, id).with_transform(Mat4::from_translation(Vec3::Y));

        let mut camera = QuatCamera::new();
        camera.move_to(Vec3::new(0.0, 1.0, 5.0));
        camera.set_perspective(Perspective {
            aspect: 1.5,
            ..Perspective::default()
        });
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        frame.draw(&node).unwrap();
        frame.finish();

        assert_eq!(gl.last_mat4(UniformSlot(2)), Some(camera.view()));
        assert_eq!(gl.last_mat4(UniformSlot(3)), Some(camera.projection()));
        assert_eq!(gl.last_mat4(UniformSlot(0)), Some(Mat4::from_translation(Vec3::Y)));
        assert!(gl.commands().contains(&GpuCommand::UniformVec3 {
            slot: UniformSlot(4),
            value: Vec3::new(0.0, 1.0, 5.0),
        }));
    }

    #[test]
    fn scene_transform_is_inherited() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let id = shaders.register(lit_shader("lit", 1));
        let root = Mat4::from_translation(Vec3::new(0.0, 0.0, -4.0));
        let mut scene = Scene::new().with_transform(root);
        let node = quad_node(&mut gl, id);
        scene.add(node);

        let camera = FixedCamera::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO);
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        scene.draw(&mut frame).unwrap();
        assert_eq!(gl.last_mat4(UniformSlot(0)), Some(root));
    }

    #[test]
    fn unknown_shader_is_an_error() {
        let mut gl = RecordingContext::new();
        let shaders = ShaderRegistry::new();
        let mut scene = Scene::new();
        let node = quad_node(&mut gl, ShaderId(9));
        scene.add(node);

        let camera = QuatCamera::new();
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        let err = scene.draw(&mut frame).unwrap_err();
        assert!(matches!(err, RenderError::UnknownShader(ShaderId(9))));
    }

    #[test]
    fn scene_display() {
        let mut gl = RecordingContext::new();
        let mut scene = Scene::new();
        assert!(scene.is_empty());
        let node = quad_node(&mut gl, ShaderId(0));
        let shared = scene.add(node);
        scene.add_shared(shared);
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.to_string(), "2 nodes");
    }
}
