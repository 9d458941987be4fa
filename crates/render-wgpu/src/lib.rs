//! wgpu backend for the lumen render core.
//!
//! [`WgpuContext`] implements [`lumen_render::GraphicsContext`] on top of an
//! offscreen colour target and a depth/stencil target. Built-in WGSL programs
//! cover lit meshes, flat particles and the sky.
//!
//! # Invariants
//! - Uniform values are snapshotted per draw; a later upload never changes an
//!   earlier draw in the same frame.
//! - Render pipelines are created lazily and cached by program, vertex layout,
//!   depth state and stencil state.
//! - A stencil clear splits the frame into a new render pass.

mod error;
mod gpu;
mod shaders;

pub use error::WgpuError;
pub use gpu::{COLOR_FORMAT, DEPTH_FORMAT, UNIFORM_SLOT_COUNT, WgpuContext};
pub use shaders::{BuiltinShader, FLAT, LIT, SKY, UNIFORM_SLOTS};

pub fn crate_info() -> &'static str {
    "lumen-render-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert_eq!(crate_info(), "lumen-render-wgpu v0.1.0");
    }
}
