//! A graphics context that records commands instead of issuing them.
//!
//! Keeps a CPU copy of every buffer so tests and the headless driver can
//! inspect exactly what would have reached the GPU.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};

use crate::error::RenderError;
use crate::gpu::{
    AttribLayout, AttribSlot, BufferId, BufferTarget, BufferUsage, DepthState, GraphicsContext,
    ProgramId, StencilState, TextureId, TextureTarget, UniformSlot,
};

/// One recorded call on the graphics context.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateBuffer(BufferId),
    BufferInit {
        buffer: BufferId,
        target: BufferTarget,
        size: usize,
        usage: BufferUsage,
    },
    BufferData {
        buffer: BufferId,
        target: BufferTarget,
        len: usize,
        usage: BufferUsage,
    },
    BufferSubData {
        buffer: BufferId,
        target: BufferTarget,
        offset: usize,
        len: usize,
    },
    DeleteBuffer(BufferId),
    UseProgram(ProgramId),
    UniformMat4 {
        slot: UniformSlot,
        value: Mat4,
    },
    UniformVec3 {
        slot: UniformSlot,
        value: Vec3,
    },
    EnableAttrib {
        slot: AttribSlot,
        buffer: BufferId,
        layout: AttribLayout,
    },
    DisableAttrib(AttribSlot),
    DrawArrays {
        first: u32,
        count: u32,
    },
    DrawElements {
        indices: BufferId,
        count: u32,
    },
    BindTexture {
        target: TextureTarget,
        texture: TextureId,
    },
    SetDepth(DepthState),
    SetStencil(Option<StencilState>),
    ClearStencil,
}

impl GpuCommand {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawArrays { .. } | Self::DrawElements { .. })
    }
}

/// Command-log backend. Used by tests and by headless runs.
#[derive(Debug, Default)]
pub struct RecordingContext {
    commands: Vec<GpuCommand>,
    buffers: BTreeMap<BufferId, Vec<u8>>,
    next_buffer: u32,
    /// When set, `create_buffer` fails as an exhausted driver would.
    pub fail_allocations: bool,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drain the command log, keeping buffer contents.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn count(&self, pred: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(*c)).count()
    }

    pub fn draw_calls(&self) -> usize {
        self.count(GpuCommand::is_draw)
    }

    /// Number of uploads (of any type) to `slot`.
    pub fn uniform_uploads(&self, slot: UniformSlot) -> usize {
        self.count(|c| match c {
            GpuCommand::UniformMat4 { slot: s, .. } | GpuCommand::UniformVec3 { slot: s, .. } => {
                *s == slot
            }
            _ => false,
        })
    }

    /// Last matrix uploaded to `slot`, if any.
    pub fn last_mat4(&self, slot: UniformSlot) -> Option<Mat4> {
        self.commands.iter().rev().find_map(|c| match c {
            GpuCommand::UniformMat4 { slot: s, value } if *s == slot => Some(*value),
            _ => None,
        })
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn storage(&mut self, buffer: BufferId) -> &mut Vec<u8> {
        match self.buffers.get_mut(&buffer) {
            Some(data) => data,
            None => panic!("{buffer:?} was never created or has been deleted"),
        }
    }
}

impl GraphicsContext for RecordingContext {
    fn create_buffer(&mut self) -> Result<BufferId, RenderError> {
        if self.fail_allocations {
            return Err(RenderError::BufferAllocation(
                "recording context refused allocation".into(),
            ));
        }
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(id, Vec::new());
        self.commands.push(GpuCommand::CreateBuffer(id));
        Ok(id)
    }

    fn buffer_init(&mut self, buffer: BufferId, target: BufferTarget, size: usize, usage: BufferUsage) {
        let storage = self.storage(buffer);
        storage.clear();
        storage.resize(size, 0);
        self.commands.push(GpuCommand::BufferInit {
            buffer,
            target,
            size,
            usage,
        });
    }

    fn buffer_data(&mut self, buffer: BufferId, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let storage = self.storage(buffer);
        storage.clear();
        storage.extend_from_slice(data);
        self.commands.push(GpuCommand::BufferData {
            buffer,
            target,
            len: data.len(),
            usage,
        });
    }

    fn buffer_sub_data(&mut self, buffer: BufferId, target: BufferTarget, offset: usize, data: &[u8]) {
        let storage = self.storage(buffer);
        let end = offset + data.len();
        assert!(
            end <= storage.len(),
            "write of {} bytes at {offset} overruns {buffer:?} ({} bytes)",
            data.len(),
            storage.len()
        );
        storage[offset..end].copy_from_slice(data);
        self.commands.push(GpuCommand::BufferSubData {
            buffer,
            target,
            offset,
            len: data.len(),
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.commands.push(GpuCommand::DeleteBuffer(buffer));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn uniform_mat4(&mut self, slot: UniformSlot, value: &Mat4) {
        self.commands.push(GpuCommand::UniformMat4 { slot, value: *value });
    }

    fn uniform_vec3(&mut self, slot: UniformSlot, value: Vec3) {
        self.commands.push(GpuCommand::UniformVec3 { slot, value });
    }

    fn enable_attrib(&mut self, slot: AttribSlot, buffer: BufferId, layout: AttribLayout) {
        self.commands.push(GpuCommand::EnableAttrib {
            slot,
            buffer,
            layout,
        });
    }

    fn disable_attrib(&mut self, slot: AttribSlot) {
        self.commands.push(GpuCommand::DisableAttrib(slot));
    }

    fn draw_arrays(&mut self, first: u32, count: u32) {
        self.commands.push(GpuCommand::DrawArrays { first, count });
    }

    fn draw_elements(&mut self, indices: BufferId, count: u32) {
        self.commands.push(GpuCommand::DrawElements { indices, count });
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId) {
        self.commands.push(GpuCommand::BindTexture { target, texture });
    }

    fn set_depth(&mut self, state: DepthState) {
        self.commands.push(GpuCommand::SetDepth(state));
    }

    fn set_stencil(&mut self, state: Option<StencilState>) {
        self.commands.push(GpuCommand::SetStencil(state));
    }

    fn clear_stencil(&mut self) {
        self.commands.push(GpuCommand::ClearStencil);
    }
}
