//! Render core: cameras, scene composition, buffer encoding and particles.
//!
//! Everything here talks to the GPU through [`GraphicsContext`], so the same
//! scene can be drawn by a real backend or recorded by [`RecordingContext`].
//!
//! # Invariants
//! - A node's model matrix is `local × parent`; a missing side is identity.
//! - Within one frame a shader is activated only when it changes, and its
//!   camera uniforms are uploaded once.
//! - Euler pitch stays inside ±π/2; the quaternion camera's rotation stays unit.
//! - An emitter never holds more than its capacity after a tick, and never
//!   reallocates its streaming buffer.
//! - Encoded vertex data is interleaved little-endian, one full vertex per row.

pub mod camera;
pub mod config;
pub mod encode;
mod error;
pub mod gpu;
pub mod particle;
pub mod recording;
pub mod scene;
pub mod shape;
pub mod skybox;

pub use camera::{Camera, CameraControl, EulerCamera, FixedCamera, Perspective, QuatCamera};
pub use config::{CameraConfig, RenderConfig};
pub use error::{ConfigError, RenderError};
pub use gpu::{GraphicsContext, Shader, ShaderId, ShaderRegistry};
pub use particle::{EmitterConfig, ParticleEmitter};
pub use recording::{GpuCommand, RecordingContext};
pub use scene::{DrawContext, Drawable, FrameContext, FrameStats, Node, Scene, SharedDrawable};
pub use shape::{DynamicShape, Geometry, Shape, StaticShape};
pub use skybox::{Floor, Skybox};

pub fn crate_info() -> &'static str {
    "lumen-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
