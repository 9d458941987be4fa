//! A bounded particle pool streamed into a GPU buffer every tick.
//!
//! Particles are spawned at the emitter origin, integrated with explicit
//! Euler steps under a constant force and evicted oldest first once the pool
//! is full. Each live particle renders as one triangle pointing along its
//! velocity.

use std::collections::VecDeque;
use std::time::Duration;

use glam::{Mat4, Vec3};
use lumen_common::LocalTransform;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use crate::encode::{AttribSource, encode_into};
use crate::error::RenderError;
use crate::gpu::{BufferId, BufferTarget, BufferUsage, GraphicsContext, ShaderId};
use crate::scene::{DrawContext, Drawable};
use crate::shape::{COMPONENT_SIZE, Shape, VERTEX_DIM, VertexFormat, bind_attribs, unbind_attribs};

/// Vertices per particle triangle.
pub const PARTICLE_VERTICES: usize = 3;
/// Bytes per particle in the streaming buffer.
pub const PARTICLE_BYTES: usize = PARTICLE_VERTICES * VERTEX_DIM * COMPONENT_SIZE;

/// Emitter tuning. Everything that used to be a global constant lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Maximum number of live particles.
    pub capacity: usize,
    /// Upper bound on particles spawned per second, on top of the one
    /// spawned every tick.
    pub rate: f32,
    /// Initial speed scale of a spawned particle.
    pub force: f32,
    /// Acceleration applied to every particle, per second.
    pub gravity: Vec3,
    /// Distance from a particle's position to the tip of its triangle.
    pub tip_length: f32,
    /// Half-width of the triangle's base.
    pub base_width: f32,
    pub seed: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            rate: 100.0,
            force: 0.09,
            gravity: Vec3::new(0.0, -0.2, 0.0),
            tip_length: 0.1,
            base_width: 0.05,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Last non-zero direction of travel.
    heading: Vec3,
}

impl Particle {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            heading: velocity.try_normalize().unwrap_or(Vec3::Y),
        }
    }

    /// A particle at `origin` moving mostly upward with horizontal jitter.
    pub fn random(origin: Vec3, force: f32, rng: &mut impl Rng) -> Self {
        let velocity = Vec3::new(
            (0.5 - rng.r#gen::<f32>()) * force,
            rng.r#gen::<f32>() * force,
            (0.5 - rng.r#gen::<f32>()) * force,
        );
        Self::new(origin, velocity)
    }

    pub fn heading(&self) -> Vec3 {
        self.heading
    }

    /// One Euler step: accelerate by `force`, then move.
    pub fn tick(&mut self, force: Vec3) {
        self.velocity += force;
        self.position += self.velocity;
        if let Some(heading) = self.velocity.try_normalize() {
            self.heading = heading;
        }
    }

    /// Triangle vertices: tip ahead of the position, base behind it.
    pub fn vertices(&self, tip_length: f32, base_width: f32) -> [f32; 9] {
        let h = self.heading;
        let side = h.any_orthonormal_vector() * base_width;
        let tip = self.position + h * tip_length;
        let back = self.position - h * base_width;
        let (l, r) = (back - side, back + side);
        [tip.x, tip.y, tip.z, l.x, l.y, l.z, r.x, r.y, r.z]
    }
}

/// Owns the particle pool and its streaming vertex buffer.
#[derive(Debug)]
pub struct ParticleEmitter<R = Pcg64Mcg> {
    vbo: BufferId,
    shader: ShaderId,
    origin: Vec3,
    config: EmitterConfig,
    particles: VecDeque<Particle>,
    rng: R,
    vertices: Vec<f32>,
    bytes: Vec<u8>,
}

impl ParticleEmitter<Pcg64Mcg> {
    /// Emitter seeded from `config.seed`.
    pub fn new(
        gl: &mut dyn GraphicsContext,
        shader: ShaderId,
        origin: Vec3,
        config: EmitterConfig,
    ) -> Result<Self, RenderError> {
        let rng = Pcg64Mcg::seed_from_u64(config.seed);
        Self::with_rng(gl, shader, origin, config, rng)
    }
}

impl<R: Rng> ParticleEmitter<R> {
    /// Allocate the streaming buffer for `config.capacity` particles.
    pub fn with_rng(
        gl: &mut dyn GraphicsContext,
        shader: ShaderId,
        origin: Vec3,
        config: EmitterConfig,
        rng: R,
    ) -> Result<Self, RenderError> {
        let vbo = gl.create_buffer()?;
        let size = config.capacity * PARTICLE_BYTES;
        gl.buffer_init(vbo, BufferTarget::Vertex, size, BufferUsage::Dynamic);
        tracing::debug!(capacity = config.capacity, bytes = size, "particle buffer allocated");
        Ok(Self {
            vbo,
            shader,
            origin,
            particles: VecDeque::with_capacity(config.capacity),
            vertices: Vec::with_capacity(config.capacity * PARTICLE_VERTICES * VERTEX_DIM),
            bytes: Vec::with_capacity(size),
            config,
            rng,
        })
    }

    /// Spawn, evict and integrate without touching the GPU.
    pub fn step(&mut self, elapsed: Duration) {
        let t = elapsed.as_secs_f32();
        let n = (self.config.rate * t * self.rng.r#gen::<f32>()).floor() as usize;
        let spawn = n.saturating_add(1);
        let capacity = self.config.capacity;

        let overflow = (self.particles.len() + spawn.min(capacity)).saturating_sub(capacity);
        self.particles.drain(..overflow.min(self.particles.len()));

        // A batch larger than the pool only keeps its newest `capacity` members.
        for _ in 0..spawn.min(capacity) {
            let p = Particle::random(self.origin, self.config.force, &mut self.rng);
            self.particles.push_back(p);
        }

        let force = self.config.gravity * t;
        for p in &mut self.particles {
            p.tick(force);
        }
        tracing::trace!(
            spawned = spawn.min(capacity),
            evicted = overflow,
            live = self.particles.len(),
            "particles stepped"
        );
    }

    /// Step the simulation and stream the live set to the GPU.
    pub fn tick(&mut self, gl: &mut dyn GraphicsContext, elapsed: Duration) {
        self.step(elapsed);
        self.upload(gl);
    }

    /// Re-encode every live particle from the start of the buffer.
    pub fn upload(&mut self, gl: &mut dyn GraphicsContext) {
        self.vertices.clear();
        for p in &self.particles {
            self.vertices
                .extend_from_slice(&p.vertices(self.config.tip_length, self.config.base_width));
        }
        self.bytes.clear();
        encode_into(
            0,
            self.particles.len() * PARTICLE_VERTICES,
            &[AttribSource::f32(VERTEX_DIM, &self.vertices)],
            &mut self.bytes,
        );
        if !self.bytes.is_empty() {
            gl.buffer_sub_data(self.vbo, BufferTarget::Vertex, 0, &self.bytes);
        }
    }

    /// Spawn point for subsequent particles. Live particles are unaffected.
    pub fn move_to(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Live particles, oldest first.
    pub fn particles(&self) -> impl ExactSizeIterator<Item = &Particle> {
        self.particles.iter()
    }

    /// Number of live particles.
    pub fn count(&self) -> usize {
        self.particles.len()
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vbo
    }

    pub fn release(self, gl: &mut dyn GraphicsContext) {
        gl.delete_buffer(self.vbo);
    }
}

impl<R: Rng> Shape for ParticleEmitter<R> {
    fn len(&self) -> usize {
        self.particles.len() * PARTICLE_VERTICES
    }

    fn stride(&self) -> usize {
        VertexFormat::POSITION.stride()
    }

    fn draw(&self, ctx: &mut DrawContext<'_>) {
        if self.particles.is_empty() {
            return;
        }
        let bound = bind_attribs(ctx, self.vbo, VertexFormat::POSITION);
        ctx.gl().draw_arrays(0, Shape::len(self) as u32);
        unbind_attribs(ctx, bound);
    }
}

impl<R: Rng> Drawable for ParticleEmitter<R> {
    fn draw(&self, ctx: &mut DrawContext<'_>) {
        let model = Drawable::transform(self, ctx.parent());
        ctx.upload_model(&model);
        Shape::draw(self, ctx);
    }

    /// Particles live in world space, so only the parent applies.
    fn transform(&self, parent: &LocalTransform) -> Mat4 {
        LocalTransform::Identity.compose(parent)
    }

    fn shader(&self) -> ShaderId {
        self.shader
    }
}
