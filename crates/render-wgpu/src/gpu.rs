use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use lumen_render::gpu::{
    AttribLayout, AttribSlot, BufferId, BufferTarget, BufferUsage, CompareFunc, DepthState,
    ProgramId, StencilOp, StencilState, TextureId, TextureTarget, UniformSlot,
};
use lumen_render::{GraphicsContext, RenderError, Shader};
use wgpu::util::DeviceExt;

use crate::error::WgpuError;
use crate::shaders::BuiltinShader;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Number of 64-byte slots in a program's uniform block.
pub const UNIFORM_SLOT_COUNT: usize = 8;
const UNIFORM_BLOCK_SIZE: usize = std::mem::size_of::<UniformBlock>();
const INITIAL_UNIFORM_BLOCKS: usize = 64;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.15,
    a: 1.0,
};

/// CPU copy of one program's uniforms. Snapshotted into the dynamic uniform
/// buffer at every draw, so later uploads never affect earlier draws.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct UniformBlock {
    slots: [[f32; 16]; UNIFORM_SLOT_COUNT],
}

impl UniformBlock {
    fn write_mat4(&mut self, slot: UniformSlot, value: &Mat4) -> bool {
        match self.slots.get_mut(slot.0 as usize) {
            Some(dst) => {
                *dst = value.to_cols_array();
                true
            }
            None => false,
        }
    }

    fn write_vec3(&mut self, slot: UniformSlot, value: Vec3) -> bool {
        match self.slots.get_mut(slot.0 as usize) {
            Some(dst) => {
                *dst = [0.0; 16];
                dst[..3].copy_from_slice(&value.to_array());
                true
            }
            None => false,
        }
    }
}

fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// wgpu has no 8-bit index format, so index data is stored as `u16`.
fn gpu_bytes(target: BufferTarget, data: &[u8]) -> Cow<'_, [u8]> {
    match target {
        BufferTarget::Vertex => Cow::Borrowed(data),
        BufferTarget::Index => Cow::Owned(
            data.iter()
                .flat_map(|&i| u16::from(i).to_le_bytes())
                .collect(),
        ),
    }
}

fn gpu_offset(target: BufferTarget, offset: usize) -> usize {
    match target {
        BufferTarget::Vertex => offset,
        BufferTarget::Index => offset * 2,
    }
}

fn buffer_usages(target: BufferTarget) -> wgpu::BufferUsages {
    let usage = match target {
        BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
        BufferTarget::Index => wgpu::BufferUsages::INDEX,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

fn buffer_label(usage: BufferUsage) -> &'static str {
    match usage {
        BufferUsage::Static => "static_buffer",
        BufferUsage::Dynamic => "dynamic_buffer",
    }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        4 => wgpu::VertexFormat::Float32x4,
        n => panic!("vertex attributes have 1 to 4 components, got {n}"),
    }
}

fn compare_function(f: CompareFunc) -> wgpu::CompareFunction {
    match f {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
    }
}

fn depth_stencil_state(depth: DepthState, stencil: Option<StencilState>) -> wgpu::DepthStencilState {
    let stencil = match stencil {
        Some(s) => {
            let face = wgpu::StencilFaceState {
                compare: compare_function(s.compare),
                fail_op: stencil_operation(s.fail),
                depth_fail_op: stencil_operation(s.depth_fail),
                pass_op: stencil_operation(s.pass),
            };
            wgpu::StencilState {
                front: face,
                back: face,
                read_mask: s.read_mask,
                write_mask: s.write_mask,
            }
        }
        None => wgpu::StencilState::default(),
    };
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: depth.write,
        depth_compare: compare_function(depth.compare),
        stencil,
        bias: Default::default(),
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    target: BufferTarget,
    /// Size in caller bytes, before index widening.
    len: usize,
    /// Mirror of the GPU contents, padded to `COPY_BUFFER_ALIGNMENT`.
    shadow: Vec<u8>,
}

struct Program {
    label: String,
    module: wgpu::ShaderModule,
}

/// Everything a render pipeline is specialised on. The stencil reference is
/// dynamic pass state and is zeroed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    attribs: Vec<(AttribSlot, AttribLayout)>,
    depth: DepthState,
    stencil: Option<StencilState>,
}

#[derive(Clone, Copy)]
enum DrawKind {
    Arrays { first: u32, count: u32 },
    Elements { indices: BufferId, count: u32 },
}

struct DrawCall {
    key: PipelineKey,
    vertex_buffers: Vec<BufferId>,
    uniform_offset: u32,
    stencil_reference: u32,
    kind: DrawKind,
}

/// Draws between two stencil clears. wgpu can only clear at pass start.
#[derive(Default)]
struct PassSegment {
    clear_stencil: bool,
    draws: Vec<DrawCall>,
}

/// Render targets the frame is drawn into.
struct Targets {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl Targets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let create = |label, format, usage| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage,
                    view_formats: &[],
                })
                .create_view(&Default::default())
        };
        Self {
            color: create(
                "color_target",
                COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            ),
            depth: create(
                "depth_stencil_target",
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            ),
            width,
            height,
        }
    }
}

/// A [`GraphicsContext`] that replays GL-style calls through wgpu.
///
/// Calls are recorded as draws with snapshotted uniforms and turned into
/// render passes on [`WgpuContext::submit`]. Buffer writes go through the
/// queue immediately, so a buffer rewritten between two draws of the same
/// frame shows its last contents in both.
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    targets: Targets,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_stride: usize,
    uniform_capacity: usize,
    buffers: HashMap<BufferId, Option<GpuBuffer>>,
    next_buffer: u32,
    programs: HashMap<ProgramId, Program>,
    next_program: u32,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    program: Option<ProgramId>,
    blocks: HashMap<ProgramId, UniformBlock>,
    attribs: BTreeMap<AttribSlot, (BufferId, AttribLayout)>,
    depth: DepthState,
    stencil: Option<StencilState>,
    uniform_data: Vec<u8>,
    segments: Vec<PassSegment>,
}

impl WgpuContext {
    /// Open a device with no surface and render into an offscreen target.
    pub fn new_headless(width: u32, height: u32) -> Result<Self, WgpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(WgpuError::NoAdapter)?;
        tracing::info!(adapter = %adapter.get_info().name, "GPU adapter selected");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;
        Ok(Self::from_device(device, queue, width, height))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE as u64),
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let uniform_stride = align_up(UNIFORM_BLOCK_SIZE, alignment);
        let (uniform_buffer, uniform_bind_group) = create_uniforms(
            &device,
            &bind_group_layout,
            uniform_stride * INITIAL_UNIFORM_BLOCKS,
        );
        let targets = Targets::new(&device, width, height);

        Self {
            device,
            queue,
            targets,
            pipeline_layout,
            bind_group_layout,
            uniform_buffer,
            uniform_bind_group,
            uniform_stride,
            uniform_capacity: INITIAL_UNIFORM_BLOCKS,
            buffers: HashMap::new(),
            next_buffer: 0,
            programs: HashMap::new(),
            next_program: 0,
            pipelines: HashMap::new(),
            program: None,
            blocks: HashMap::new(),
            attribs: BTreeMap::new(),
            depth: DepthState::default(),
            stencil: None,
            uniform_data: Vec::new(),
            segments: vec![PassSegment::default()],
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.targets = Targets::new(&self.device, width, height);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.targets.width, self.targets.height)
    }

    /// Compile a WGSL module with `vs_main` and `fs_main` entry points.
    ///
    /// Its uniforms must follow the 64-byte slot layout at group 0, binding 0.
    pub fn register_program(&mut self, label: &str, wgsl: &str) -> ProgramId {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        let id = ProgramId(self.next_program);
        self.next_program += 1;
        self.programs.insert(
            id,
            Program {
                label: label.to_owned(),
                module,
            },
        );
        tracing::debug!(label, ?id, "program registered");
        id
    }

    /// Register a built-in program and return its shader handle.
    pub fn register_builtin(&mut self, builtin: &BuiltinShader) -> Shader {
        let id = self.register_program(builtin.name, builtin.source);
        builtin.shader(id)
    }

    /// Encode every recorded draw into render passes and submit them.
    /// Returns the number of draws issued.
    pub fn submit(&mut self) -> usize {
        let segments = std::mem::replace(&mut self.segments, vec![PassSegment::default()]);
        let uniform_data = std::mem::take(&mut self.uniform_data);

        let blocks = uniform_data.len() / self.uniform_stride;
        if blocks > self.uniform_capacity {
            let capacity = blocks.next_power_of_two();
            let (buffer, bind_group) = create_uniforms(
                &self.device,
                &self.bind_group_layout,
                self.uniform_stride * capacity,
            );
            self.uniform_buffer = buffer;
            self.uniform_bind_group = bind_group;
            self.uniform_capacity = capacity;
            tracing::debug!(capacity, "uniform buffer grown");
        }
        if !uniform_data.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &uniform_data);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        let mut issued = 0;
        for (i, segment) in segments.iter().enumerate() {
            let first = i == 0;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if first {
                            wgpu::LoadOp::Clear(CLEAR_COLOR)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: if first {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if first || segment.clear_stencil {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                ..Default::default()
            });
            for draw in &segment.draws {
                if self.encode_draw(&mut pass, draw) {
                    issued += 1;
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!(draws = issued, passes = segments.len(), "frame submitted");
        issued
    }

    fn encode_draw(&self, pass: &mut wgpu::RenderPass<'_>, draw: &DrawCall) -> bool {
        let Some(pipeline) = self.pipelines.get(&draw.key) else {
            return false;
        };
        let mut vertex_buffers = Vec::with_capacity(draw.vertex_buffers.len());
        for id in &draw.vertex_buffers {
            match self.live_buffer(*id) {
                Some(b) => vertex_buffers.push(b),
                None => {
                    tracing::debug!(?id, "vertex buffer missing or empty, draw skipped");
                    return false;
                }
            }
        }
        let index_buffer = match draw.kind {
            DrawKind::Elements { indices, .. } => match self.live_buffer(indices) {
                Some(b) => Some(b),
                None => {
                    tracing::debug!(?indices, "index buffer missing or empty, draw skipped");
                    return false;
                }
            },
            DrawKind::Arrays { .. } => None,
        };

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
        pass.set_stencil_reference(draw.stencil_reference);
        for (i, b) in vertex_buffers.iter().enumerate() {
            pass.set_vertex_buffer(i as u32, b.buffer.slice(..));
        }
        match (draw.kind, index_buffer) {
            (DrawKind::Elements { count, .. }, Some(ib)) => {
                pass.set_index_buffer(ib.buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..count, 0, 0..1);
            }
            (DrawKind::Arrays { first, count }, _) => pass.draw(first..first + count, 0..1),
            (DrawKind::Elements { .. }, None) => return false,
        }
        true
    }

    fn live_buffer(&self, id: BufferId) -> Option<&GpuBuffer> {
        self.buffers
            .get(&id)
            .and_then(Option::as_ref)
            .filter(|b| !b.shadow.is_empty())
    }

    fn store(&mut self, buffer: BufferId, target: BufferTarget, len: usize, shadow: Vec<u8>, gpu: wgpu::Buffer) {
        let entry = GpuBuffer {
            buffer: gpu,
            target,
            len,
            shadow,
        };
        if let Some(Some(old)) = self.buffers.insert(buffer, Some(entry)) {
            old.buffer.destroy();
        }
    }

    fn record(&mut self, kind: DrawKind) {
        let Some(program) = self.program else {
            tracing::debug!("draw without an active program, skipped");
            return;
        };
        let key = PipelineKey {
            program,
            attribs: self.attribs.iter().map(|(slot, (_, layout))| (*slot, *layout)).collect(),
            depth: self.depth,
            stencil: self.stencil.map(|s| StencilState { reference: 0, ..s }),
        };
        if !self.pipelines.contains_key(&key) {
            let Some(p) = self.programs.get(&program) else {
                tracing::debug!(?program, "program not registered, draw skipped");
                return;
            };
            let pipeline = create_pipeline(&self.device, &self.pipeline_layout, &key, p);
            tracing::debug!(label = %p.label, cached = self.pipelines.len() + 1, "render pipeline created");
            self.pipelines.insert(key.clone(), pipeline);
        }

        let block = self.blocks.get(&program).copied().unwrap_or_else(UniformBlock::zeroed);
        let uniform_offset = self.uniform_data.len();
        self.uniform_data.extend_from_slice(bytemuck::bytes_of(&block));
        self.uniform_data.resize(uniform_offset + self.uniform_stride, 0);

        let draw = DrawCall {
            key,
            vertex_buffers: self.attribs.values().map(|(buffer, _)| *buffer).collect(),
            uniform_offset: uniform_offset as u32,
            stencil_reference: self.stencil.map_or(0, |s| s.reference),
            kind,
        };
        if let Some(segment) = self.segments.last_mut() {
            segment.draws.push(draw);
        }
    }

    fn block(&mut self) -> Option<&mut UniformBlock> {
        match self.program {
            Some(program) => Some(self.blocks.entry(program).or_insert_with(UniformBlock::zeroed)),
            None => {
                tracing::trace!("uniform upload without an active program, ignored");
                None
            }
        }
    }
}

fn create_uniforms(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    size: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("uniform_buffer"),
        size: size as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("uniform_bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE as u64),
            }),
        }],
    });
    (buffer, bind_group)
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    key: &PipelineKey,
    program: &Program,
) -> wgpu::RenderPipeline {
    // One vertex buffer binding per attribute; several may share a buffer.
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
        .attribs
        .iter()
        .map(|(slot, layout)| {
            [wgpu::VertexAttribute {
                format: vertex_format(layout.components),
                offset: layout.offset as u64,
                shader_location: slot.0,
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .attribs
        .iter()
        .zip(&attributes)
        .map(|((_, layout), attributes)| wgpu::VertexBufferLayout {
            array_stride: layout.stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(program.label.as_str()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            // Mirrored geometry flips winding.
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(depth_stencil_state(key.depth, key.stencil)),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

impl GraphicsContext for WgpuContext {
    fn create_buffer(&mut self) -> Result<BufferId, RenderError> {
        let id = BufferId(self.next_buffer);
        self.next_buffer = self
            .next_buffer
            .checked_add(1)
            .ok_or_else(|| RenderError::BufferAllocation("buffer ids exhausted".into()))?;
        self.buffers.insert(id, None);
        Ok(id)
    }

    fn buffer_init(&mut self, buffer: BufferId, target: BufferTarget, size: usize, usage: BufferUsage) {
        let padded = align_up(gpu_offset(target, size), wgpu::COPY_BUFFER_ALIGNMENT as usize);
        if padded as u64 > self.device.limits().max_buffer_size {
            tracing::error!(?buffer, size, "buffer exceeds device limit, left unallocated");
            if let Some(Some(old)) = self.buffers.insert(buffer, None) {
                old.buffer.destroy();
            }
            return;
        }
        let gpu = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(buffer_label(usage)),
            size: padded as u64,
            usage: buffer_usages(target),
            mapped_at_creation: false,
        });
        self.store(buffer, target, size, vec![0; padded], gpu);
    }

    fn buffer_data(&mut self, buffer: BufferId, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let mut shadow = gpu_bytes(target, data).into_owned();
        shadow.resize(align_up(shadow.len(), wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
        let gpu = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(buffer_label(usage)),
            contents: &shadow,
            usage: buffer_usages(target),
        });
        self.store(buffer, target, data.len(), shadow, gpu);
    }

    fn buffer_sub_data(&mut self, buffer: BufferId, _target: BufferTarget, offset: usize, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(&buffer).and_then(Option::as_mut) else {
            tracing::debug!(?buffer, "write to unallocated buffer ignored");
            return;
        };
        assert!(
            offset + data.len() <= entry.len,
            "write of {} bytes at {offset} overruns {buffer:?} ({} bytes)",
            data.len(),
            entry.len
        );
        let bytes = gpu_bytes(entry.target, data);
        let start = gpu_offset(entry.target, offset);
        let end = start + bytes.len();
        entry.shadow[start..end].copy_from_slice(&bytes);

        // Queue writes must cover whole 4-byte words.
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        let lo = start / align * align;
        let hi = align_up(end, align).min(entry.shadow.len());
        if hi > lo {
            self.queue.write_buffer(&entry.buffer, lo as u64, &entry.shadow[lo..hi]);
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(Some(entry)) = self.buffers.remove(&buffer) {
            entry.buffer.destroy();
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program) {
            tracing::debug!(?program, "activating unregistered program");
        }
        self.program = Some(program);
    }

    fn uniform_mat4(&mut self, slot: UniformSlot, value: &Mat4) {
        if let Some(block) = self.block() {
            if !block.write_mat4(slot, value) {
                tracing::debug!(?slot, "uniform slot outside block, ignored");
            }
        }
    }

    fn uniform_vec3(&mut self, slot: UniformSlot, value: Vec3) {
        if let Some(block) = self.block() {
            if !block.write_vec3(slot, value) {
                tracing::debug!(?slot, "uniform slot outside block, ignored");
            }
        }
    }

    fn enable_attrib(&mut self, slot: AttribSlot, buffer: BufferId, layout: AttribLayout) {
        assert!(
            (1..=4).contains(&layout.components),
            "vertex attributes have 1 to 4 components, got {}",
            layout.components
        );
        self.attribs.insert(slot, (buffer, layout));
    }

    fn disable_attrib(&mut self, slot: AttribSlot) {
        self.attribs.remove(&slot);
    }

    fn draw_arrays(&mut self, first: u32, count: u32) {
        if count > 0 {
            self.record(DrawKind::Arrays { first, count });
        }
    }

    fn draw_elements(&mut self, indices: BufferId, count: u32) {
        if count > 0 {
            self.record(DrawKind::Elements { indices, count });
        }
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId) {
        tracing::trace!(?target, ?texture, "texture binding not sampled by built-in programs");
    }

    fn set_depth(&mut self, state: DepthState) {
        self.depth = state;
    }

    fn set_stencil(&mut self, state: Option<StencilState>) {
        self.stencil = state;
    }

    fn clear_stencil(&mut self) {
        match self.segments.last_mut() {
            Some(segment) if segment.draws.is_empty() => segment.clear_stencil = true,
            _ => self.segments.push(PassSegment {
                clear_stencil: true,
                draws: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_bytes_are_widened() {
        let bytes = gpu_bytes(BufferTarget::Index, &[1, 2, 255]);
        assert_eq!(bytes.as_ref(), &[1, 0, 2, 0, 255, 0]);
        assert_eq!(gpu_offset(BufferTarget::Index, 3), 6);
        assert!(matches!(gpu_bytes(BufferTarget::Vertex, &[1, 2]), Cow::Borrowed(_)));
    }

    #[test]
    fn uniform_block_slots() {
        assert_eq!(UNIFORM_BLOCK_SIZE, 512);
        let mut block = UniformBlock::zeroed();
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert!(block.write_mat4(UniformSlot(2), &m));
        assert_eq!(block.slots[2], m.to_cols_array());
        assert!(block.write_vec3(UniformSlot(4), Vec3::new(4.0, 5.0, 6.0)));
        assert_eq!(&block.slots[4][..4], &[4.0, 5.0, 6.0, 0.0]);
        assert!(!block.write_vec3(UniformSlot(8), Vec3::ONE));
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(512, 256), 512);
        assert_eq!(vertex_format(2), wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn stencil_state_maps_both_faces() {
        let state = depth_stencil_state(
            DepthState {
                compare: CompareFunc::LessEqual,
                write: false,
            },
            Some(StencilState::write(1)),
        );
        assert_eq!(state.format, DEPTH_FORMAT);
        assert!(!state.depth_write_enabled);
        assert_eq!(state.depth_compare, wgpu::CompareFunction::LessEqual);
        assert_eq!(state.stencil.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(state.stencil.back.compare, wgpu::CompareFunction::Always);
        assert_eq!(state.stencil.write_mask, 0xFF);
        let off = depth_stencil_state(DepthState::default(), None);
        assert!(!off.stencil.is_enabled());
    }

    /// Runs only where an adapter is available.
    #[test]
    fn headless_frame_submits() {
        let Ok(mut gl) = WgpuContext::new_headless(32, 32) else {
            return;
        };
        let shader = gl.register_builtin(&crate::shaders::FLAT);
        let vbo = gl.create_buffer().unwrap();
        let triangle: Vec<u8> = [0.0f32, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        gl.buffer_data(vbo, BufferTarget::Vertex, &triangle, BufferUsage::Static);
        gl.use_program(shader.program());
        gl.uniform_mat4(UniformSlot(0), &Mat4::IDENTITY);
        gl.enable_attrib(
            AttribSlot(0),
            vbo,
            AttribLayout {
                components: 3,
                stride: 12,
                offset: 0,
            },
        );
        gl.draw_arrays(0, 3);
        gl.clear_stencil();
        gl.draw_arrays(0, 3);
        assert_eq!(gl.submit(), 2);
        assert_eq!(gl.submit(), 0);
    }
}
