use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use glam::{Mat4, Vec3};
use lumen_common::geometry::{quad, upvote};
use lumen_input::{Action, Bindings, KeyCode};
use lumen_render::gpu::{ProgramId, TextureId};
use lumen_render::{
    Camera, CameraControl, Floor, FrameContext, FrameStats, Geometry, GraphicsContext, Node,
    ParticleEmitter, QuatCamera, RecordingContext, RenderConfig, RenderError, Scene, Shader,
    ShaderId, ShaderRegistry, Skybox, StaticShape,
};
use lumen_render_wgpu::{BuiltinShader, FLAT, LIT, SKY, WgpuContext};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;
const ORBIT_RADIUS: f32 = 3.0;
/// Radians per second the focus travels around the origin.
const ORBIT_SPEED: f32 = 0.8;

/// Where the demo's GPU calls end up.
pub enum Backend {
    Recording(RecordingContext),
    Wgpu(WgpuContext),
}

impl Backend {
    pub fn recording() -> Self {
        Self::Recording(RecordingContext::new())
    }

    pub fn wgpu() -> anyhow::Result<Self> {
        Ok(Self::Wgpu(WgpuContext::new_headless(WIDTH, HEIGHT)?))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Recording(_) => "recording",
            Self::Wgpu(_) => "wgpu",
        }
    }

    pub fn gl(&mut self) -> &mut dyn GraphicsContext {
        match self {
            Self::Recording(gl) => gl,
            Self::Wgpu(gl) => gl,
        }
    }

    fn program(&mut self, builtin: &BuiltinShader, index: u32) -> Shader {
        match self {
            Self::Recording(_) => builtin.shader(ProgramId(index)),
            Self::Wgpu(gl) => gl.register_builtin(builtin),
        }
    }

    /// Flush the frame. Returns the number of draw calls that reached the backend.
    fn end_frame(&mut self) -> usize {
        match self {
            Self::Recording(gl) => gl.take_commands().iter().filter(|c| c.is_draw()).count(),
            Self::Wgpu(gl) => gl.submit(),
        }
    }
}

/// A key event scheduled for a given frame.
#[derive(Debug, Clone, Copy)]
struct KeyEvent {
    frame: u64,
    key: KeyCode,
    down: bool,
}

/// Walk forward, strafe, rise, then hand the camera back to follow mode.
const SCRIPT: &[KeyEvent] = &[
    KeyEvent { frame: 5, key: KeyCode::W, down: true },
    KeyEvent { frame: 15, key: KeyCode::W, down: false },
    KeyEvent { frame: 18, key: KeyCode::D, down: true },
    KeyEvent { frame: 24, key: KeyCode::D, down: false },
    KeyEvent { frame: 26, key: KeyCode::Q, down: true },
    KeyEvent { frame: 30, key: KeyCode::Q, down: false },
    KeyEvent { frame: 32, key: KeyCode::F, down: true },
    KeyEvent { frame: 33, key: KeyCode::F, down: false },
    KeyEvent { frame: 50, key: KeyCode::Space, down: true },
    KeyEvent { frame: 51, key: KeyCode::Space, down: false },
    KeyEvent { frame: 55, key: KeyCode::Space, down: true },
    KeyEvent { frame: 56, key: KeyCode::Space, down: false },
];

/// Pointer drag (dx, dy in pixels) applied over a range of frames.
const DRAG_FRAMES: std::ops::Range<u64> = 36..44;
const DRAG: (f32, f32) = (12.0, -4.0);

/// Everything one frame reports.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    pub frame: u64,
    pub stats: FrameStats,
    pub submitted: usize,
    pub particles: usize,
    pub camera: Vec3,
}

pub struct Demo {
    backend: Backend,
    config: RenderConfig,
    shaders: ShaderRegistry,
    scene: Scene,
    emitter: ParticleEmitter,
    camera: QuatCamera,
    bindings: Bindings,
    paused: Rc<Cell<bool>>,
    following: Rc<Cell<bool>>,
    elapsed: Duration,
}

impl Demo {
    pub fn new(mut backend: Backend, config: RenderConfig) -> Result<Self, RenderError> {
        let mut shaders = ShaderRegistry::new();
        let lit = shaders.register(backend.program(&LIT, 0));
        let flat = shaders.register(backend.program(&FLAT, 1));
        let sky = shaders.register(backend.program(&SKY, 2));

        let gl = backend.gl();
        let panel = lit_node(gl, quad(Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.5, 1.0, 0.0)), lit)?
            .with_transform(Mat4::from_translation(Vec3::new(-1.5, 0.0, 0.0)));
        let arrow = lit_node(gl, upvote(Vec3::new(0.0, 1.5, 0.0), 0.6), lit)?
            .with_transform(Mat4::from_rotation_y(0.4));
        let mut floor = Floor::new(gl, lit)?.with_transform(Mat4::from_scale(Vec3::new(6.0, 1.0, 6.0)));
        let skybox = Skybox::new(gl, sky, TextureId(0))?;
        let emitter = ParticleEmitter::new(gl, flat, focus(0.0), config.emitter.clone())?;

        let mut scene = Scene::new();
        let panel = Rc::new(panel);
        let arrow = Rc::new(arrow);
        floor.reflect(panel.clone());
        floor.reflect(arrow.clone());
        scene.add(floor);
        scene.add_shared(panel);
        scene.add_shared(arrow);
        scene.add(skybox);

        let mut camera = QuatCamera::new();
        let mut perspective = config.camera.perspective;
        perspective.aspect = WIDTH as f32 / HEIGHT as f32;
        camera.set_perspective(perspective);
        camera.move_to(focus(0.0) + config.camera.follow_offset);
        camera.rotate_to(focus(0.0));

        let paused = Rc::new(Cell::new(false));
        let following = Rc::new(Cell::new(true));
        let mut bindings = Bindings::default_bindings();
        let flag = Rc::clone(&paused);
        bindings.on(Action::Pause, move |_| {
            flag.set(!flag.get());
            tracing::info!(paused = flag.get(), "pause toggled");
        });
        let flag = Rc::clone(&following);
        bindings.on(Action::CameraFollow, move |_| {
            flag.set(!flag.get());
            tracing::info!(following = flag.get(), "follow toggled");
        });

        tracing::info!(backend = backend.name(), %scene, %camera, "demo ready");
        Ok(Self {
            backend,
            config,
            shaders,
            scene,
            emitter,
            camera,
            bindings,
            paused,
            following,
            elapsed: Duration::ZERO,
        })
    }

    /// Input, then tick, then draw.
    pub fn frame(&mut self, frame: u64, dt: Duration) -> Result<FrameReport, RenderError> {
        for event in SCRIPT.iter().filter(|e| e.frame == frame) {
            if event.down {
                self.bindings.press(event.key);
            } else {
                self.bindings.release(event.key);
            }
        }
        self.drive_camera(frame);

        if !self.paused.get() {
            self.elapsed += dt;
            self.emitter.move_to(focus(self.elapsed.as_secs_f32()));
            self.emitter.tick(self.backend.gl(), dt);
        }

        let mut ctx = FrameContext::new(self.backend.gl(), &self.camera, &self.shaders);
        self.scene.draw(&mut ctx)?;
        ctx.draw(&self.emitter)?;
        let stats = ctx.finish();
        let submitted = self.backend.end_frame();

        Ok(FrameReport {
            frame,
            stats,
            submitted,
            particles: self.emitter.count(),
            camera: self.camera.position(),
        })
    }

    fn drive_camera(&mut self, frame: u64) {
        let cfg = &self.config.camera;
        if DRAG_FRAMES.contains(&frame) {
            let (dx, dy) = DRAG;
            self.camera
                .rotate(Vec3::new(dy * cfg.mouse_sensitivity, dx * cfg.mouse_sensitivity, 0.0));
        }

        let delta = self.bindings.camera_delta(cfg.move_speed);
        if delta.vertical != 0.0 {
            let position = self.camera.position() + Vec3::Y * delta.vertical;
            self.camera.move_to(position);
        }
        if delta.local != Vec3::ZERO {
            self.following.set(false);
            self.camera.translate(delta.local);
        } else if self.following.get() {
            let target = self.emitter.origin();
            self.camera.lerp(target + cfg.follow_offset, target, cfg.follow_amount);
        }
    }

    pub fn shutdown(self) {
        let Self {
            mut backend,
            emitter,
            ..
        } = self;
        emitter.release(backend.gl());
    }
}

fn lit_node(
    gl: &mut dyn GraphicsContext,
    vertices: Vec<f32>,
    shader: ShaderId,
) -> Result<Node, RenderError> {
    let normals = Vec3::Z.to_array().repeat(vertices.len() / 3);
    let shape = StaticShape::new(gl, Geometry::new(vertices).with_normals(normals))?;
    Ok(Node::new(shape, shader))
}

/// The point the emitter and the follow camera track at time `t`.
fn focus(t: f32) -> Vec3 {
    let angle = t * ORBIT_SPEED;
    Vec3::new(angle.cos() * ORBIT_RADIUS, 0.5, angle.sin() * ORBIT_RADIUS)
}
