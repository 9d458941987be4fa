//! Drawables that manage their own depth and stencil state.

use glam::{Mat3, Mat4, Vec3};
use lumen_common::LocalTransform;
use lumen_common::geometry::{FLOOR_NORMALS, FLOOR_VERTICES, SKYBOX_INDICES, SKYBOX_VERTICES};

use crate::error::RenderError;
use crate::gpu::{
    CompareFunc, DepthState, GraphicsContext, ShaderId, StencilState, TextureId, TextureTarget,
};
use crate::scene::{
    DrawContext, Drawable, SharedDrawable, UNIFORM_AMBIENT, UNIFORM_PROJECTION, UNIFORM_VIEW,
};
use crate::shape::{Geometry, Shape, StaticShape};

/// Ambient colour of the floor itself.
pub const FLOOR_AMBIENT: Vec3 = Vec3::new(0.2, 0.2, 0.35);
/// Ambient colour of everything seen in the floor.
pub const REFLECTION_AMBIENT: Vec3 = Vec3::splat(0.6);

const FLOOR_STENCIL_REF: u32 = 1;

/// Mirror about the XZ plane.
pub fn reflection_matrix() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
}

/// `view` with its translation removed, so the sky stays centred on the eye.
pub fn strip_translation(view: &Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(*view))
}

/// A planar mirror. Draws itself into the stencil buffer, then redraws the
/// reflected drawables mirrored through it, clipped to the floor's pixels.
///
/// Reflected drawables are drawn with the floor's shader.
pub struct Floor {
    shape: StaticShape,
    shader: ShaderId,
    transform: LocalTransform,
    reflected: Vec<SharedDrawable>,
}

impl Floor {
    pub fn new(gl: &mut dyn GraphicsContext, shader: ShaderId) -> Result<Self, RenderError> {
        let geometry = Geometry::new(FLOOR_VERTICES).with_normals(FLOOR_NORMALS);
        Ok(Self {
            shape: StaticShape::new(gl, geometry)?,
            shader,
            transform: LocalTransform::Identity,
            reflected: Vec::new(),
        })
    }

    pub fn with_transform(mut self, transform: impl Into<LocalTransform>) -> Self {
        self.transform = transform.into();
        self
    }

    /// Add a drawable to the reflection pass. It keeps being drawn normally
    /// wherever else it is referenced.
    pub fn reflect(&mut self, item: SharedDrawable) {
        self.reflected.push(item);
    }

    pub fn reflected(&self) -> &[SharedDrawable] {
        &self.reflected
    }
}

impl Drawable for Floor {
    fn draw(&self, ctx: &mut DrawContext<'_>) {
        let gl = ctx.gl();
        gl.set_stencil(Some(StencilState::write(FLOOR_STENCIL_REF)));
        gl.set_depth(DepthState {
            compare: CompareFunc::Less,
            write: false,
        });
        gl.clear_stencil();

        ctx.uniform_vec3(UNIFORM_AMBIENT, FLOOR_AMBIENT);
        let model = self.transform(ctx.parent());
        ctx.upload_model(&model);
        self.shape.draw(ctx);

        let gl = ctx.gl();
        gl.set_stencil(Some(StencilState::test_equal(FLOOR_STENCIL_REF)));
        gl.set_depth(DepthState::default());
        ctx.uniform_vec3(UNIFORM_AMBIENT, REFLECTION_AMBIENT);

        let mirror = LocalTransform::from(LocalTransform::from(reflection_matrix()).compose(ctx.parent()));
        for item in &self.reflected {
            item.draw(&mut ctx.with_parent(mirror));
        }

        ctx.gl().set_stencil(None);
    }

    fn transform(&self, parent: &LocalTransform) -> Mat4 {
        self.transform.compose(parent)
    }

    fn shader(&self) -> ShaderId {
        self.shader
    }
}

/// A cube-mapped box that always surrounds the camera.
pub struct Skybox {
    shape: StaticShape,
    shader: ShaderId,
}

impl Skybox {
    pub fn new(
        gl: &mut dyn GraphicsContext,
        shader: ShaderId,
        cube_map: TextureId,
    ) -> Result<Self, RenderError> {
        let geometry = Geometry::new(SKYBOX_VERTICES).with_indices(SKYBOX_INDICES);
        let shape = StaticShape::new(gl, geometry)?.with_texture(TextureTarget::CubeMap, cube_map);
        Ok(Self { shape, shader })
    }
}

impl Drawable for Skybox {
    fn draw(&self, ctx: &mut DrawContext<'_>) {
        ctx.gl().set_depth(DepthState {
            compare: CompareFunc::LessEqual,
            write: false,
        });
        let camera = ctx.camera();
        ctx.uniform_mat4(UNIFORM_VIEW, &strip_translation(&camera.view()));
        ctx.uniform_mat4(UNIFORM_PROJECTION, &camera.projection());
        self.shape.draw(ctx);
        ctx.gl().set_depth(DepthState::default());
    }

    fn transform(&self, _parent: &LocalTransform) -> Mat4 {
        Mat4::IDENTITY
    }

    fn shader(&self) -> ShaderId {
        self.shader
    }

    fn uses_camera_uniforms(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, CameraControl, QuatCamera};
    use crate::gpu::{ProgramId, Shader, ShaderRegistry, UniformSlot};
    use crate::recording::{GpuCommand, RecordingContext};
    use crate::scene::{FrameContext, Node, Scene, UNIFORM_MODEL};
    use crate::shape::ATTRIB_POSITION;
    use lumen_common::geometry::quad;
    use std::rc::Rc;

    fn shader(name: &str, program: u32) -> Shader {
        Shader::new(name, ProgramId(program))
            .with_attrib(ATTRIB_POSITION, 0)
            .with_uniform(UNIFORM_MODEL, 0)
            .with_uniform(UNIFORM_VIEW, 2)
            .with_uniform(UNIFORM_PROJECTION, 3)
            .with_uniform(UNIFORM_AMBIENT, 5)
    }

    #[test]
    fn strip_translation_keeps_rotation() {
        let view = Mat4::from_rotation_y(0.4) * Mat4::from_translation(Vec3::new(3.0, -2.0, 9.0));
        let stripped = strip_translation(&view);
        assert_eq!(stripped.w_axis, glam::Vec4::W);
        assert!(stripped.transform_vector3(Vec3::X).abs_diff_eq(view.transform_vector3(Vec3::X), 1e-6));
    }

    #[test]
    fn skybox_uses_translation_free_view() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let id = shaders.register(shader("sky", 3));
        let sky = Skybox::new(&mut gl, id, TextureId(11)).unwrap();

        let mut camera = QuatCamera::new();
        camera.move_to(Vec3::new(50.0, 10.0, -20.0));
        camera.rotate(Vec3::new(0.1, 0.5, 0.0));
        gl.take_commands();

        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        frame.draw(&sky).unwrap();
        let stats = frame.finish();
        assert_eq!(stats.camera_uploads, 0);

        let view = gl.last_mat4(UniformSlot(2)).unwrap();
        assert_eq!(view, strip_translation(&camera.view()));
        assert_eq!(gl.uniform_uploads(UniformSlot(2)), 1);

        let cmds = gl.commands();
        let depth: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                GpuCommand::SetDepth(d) => Some(*d),
                _ => None,
            })
            .collect();
        assert_eq!(
            depth,
            vec![
                DepthState {
                    compare: CompareFunc::LessEqual,
                    write: false
                },
                DepthState::default()
            ]
        );
        assert!(cmds.contains(&GpuCommand::BindTexture {
            target: TextureTarget::CubeMap,
            texture: TextureId(11)
        }));
        assert!(cmds.contains(&GpuCommand::DrawElements {
            indices: crate::gpu::BufferId(1),
            count: 36
        }));
    }

    #[test]
    fn skybox_invalidates_shared_camera_uniforms() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let id = shaders.register(shader("shared", 3));
        let sky = Skybox::new(&mut gl, id, TextureId(1)).unwrap();
        let shape = StaticShape::new(&mut gl, Geometry::new(quad(Vec3::ZERO, Vec3::ONE))).unwrap();
        let node = Node::new(shape, id);

        let mut camera = QuatCamera::new();
        camera.move_to(Vec3::new(1.0, 2.0, 3.0));
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        frame.draw(&node).unwrap();
        frame.draw(&sky).unwrap();
        frame.draw(&node).unwrap();
        let stats = frame.finish();

        assert_eq!(stats.camera_uploads, 2);
        assert_eq!(gl.last_mat4(UniformSlot(2)), Some(camera.view()));
    }

    #[test]
    fn floor_masks_reflections_with_stencil() {
        let mut gl = RecordingContext::new();
        let mut shaders = ShaderRegistry::new();
        let lit = shaders.register(shader("lit", 1));
        let floor_shader = shaders.register(shader("floor", 2));

        let mut scene = Scene::new();
        let shape = StaticShape::new(&mut gl, Geometry::new(quad(Vec3::ZERO, Vec3::ONE))).unwrap();
        let lifted = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let node = scene.add(Node::new(shape, lit).with_transform(lifted));
        let mut floor = Floor::new(&mut gl, floor_shader).unwrap();
        floor.reflect(Rc::clone(&node));
        scene.add(floor);
        gl.take_commands();

        let camera = QuatCamera::new();
        let mut frame = FrameContext::new(&mut gl, &camera, &shaders);
        scene.draw(&mut frame).unwrap();
        let stats = frame.finish();
        assert_eq!(stats.draws, 2);

        let cmds = gl.commands();
        let stencil: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                GpuCommand::SetStencil(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            stencil,
            vec![
                Some(StencilState::write(1)),
                Some(StencilState::test_equal(1)),
                None
            ]
        );
        // Node, floor, reflected node.
        assert_eq!(gl.draw_calls(), 3);

        let ambient: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                GpuCommand::UniformVec3 {
                    slot: UniformSlot(5),
                    value,
                } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(ambient, vec![FLOOR_AMBIENT, REFLECTION_AMBIENT]);

        // Reflected model is the node's transform mirrored.
        assert_eq!(gl.last_mat4(UniformSlot(0)), Some(lifted * reflection_matrix()));

        // The stencil clear happens after the write state is set and before the floor draw.
        let clear = cmds.iter().position(|c| *c == GpuCommand::ClearStencil).unwrap();
        let first_write = cmds
            .iter()
            .position(|c| *c == GpuCommand::SetStencil(Some(StencilState::write(1))))
            .unwrap();
        assert!(first_write < clear);
        assert_eq!(scene.len(), 2);
        assert_eq!(floor_shader, ShaderId(1));
    }
}
