//! wgpu implementation of [`GpuDevice`].
//!
//! Draw calls are recorded during the frame and replayed into a single
//! render pass by [`WgpuDevice::flush`]. Everything a draw reads that may
//! change later in the same frame is snapshotted at record time:
//!
//! - per-draw uniforms go to a dynamic-offset uniform arena
//! - the matrix block visible to the program goes to a second arena
//! - dynamic vertex data goes to a vertex arena
//!
//! Writing a uniform for one primitive therefore never affects another
//! primitive's draw, even though every write lands before the submit.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::{
    Buffer, BufferUsage, DeviceError, DrawUniforms, GpuDevice, HandleAllocator, MATRIX_BLOCK,
    MATRIX_BLOCK_SIZE, Program, ShaderLibrary, Topology, UniformValue, VertexArray, VertexLayout,
};

const DRAW_UNIFORMS_SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;
const MIN_ARENA_SIZE: u64 = 4096;

/// Growable GPU buffer rebuilt from CPU bytes every frame.
struct FrameArena {
    label: &'static str,
    usage: wgpu::BufferUsages,
    align: u64,
    data: Vec<u8>,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
    /// Bumped whenever `buffer` is reallocated
    generation: u64,
}

impl FrameArena {
    fn new(label: &'static str, usage: wgpu::BufferUsages, align: u64) -> Self {
        Self {
            label,
            usage,
            align: align.max(wgpu::COPY_BUFFER_ALIGNMENT),
            data: Vec::new(),
            buffer: None,
            capacity: 0,
            generation: 0,
        }
    }

    /// Appends `bytes` at the next aligned offset and returns that offset.
    fn push(&mut self, bytes: &[u8]) -> u64 {
        let offset = align_up(self.data.len() as u64, self.align);
        self.data.resize(offset as usize, 0);
        self.data.extend_from_slice(bytes);
        offset
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.data.is_empty() {
            return;
        }
        let len = align_up(self.data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        self.data.resize(len as usize, 0);

        if self.buffer.is_none() || self.capacity < len {
            let capacity = len.next_power_of_two().max(MIN_ARENA_SIZE);
            tracing::debug!(arena = self.label, capacity, "Reallocating frame arena");
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: self.usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.capacity = capacity;
            self.generation += 1;
        }

        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, &self.data);
        }
    }

    fn clear(&mut self) {
        self.data.clear();
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferRole {
    Empty,
    StaticVertex,
    DynamicVertex,
    Uniform,
}

struct BufferSlot {
    role: BufferRole,
    /// CPU copy of dynamic and uniform contents
    data: Vec<u8>,
    /// Dedicated GPU buffer for static vertex data
    gpu: Option<wgpu::Buffer>,
    gpu_capacity: u64,
    /// Offset of this frame's snapshot inside the matching arena
    frame_offset: Option<u64>,
}

impl BufferSlot {
    fn new() -> Self {
        Self {
            role: BufferRole::Empty,
            data: Vec::new(),
            gpu: None,
            gpu_capacity: 0,
            frame_offset: None,
        }
    }
}

struct ProgramSlot {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    uniforms: DrawUniforms,
    block_slot: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u32,
    layout: VertexLayout,
    topology: Topology,
}

#[derive(Debug, Clone, Copy)]
enum VertexSource {
    Static(u32),
    Arena { offset: u64, len: u64 },
}

#[derive(Debug, Clone, Copy)]
struct DrawCommand {
    pipeline: PipelineKey,
    vertex: VertexSource,
    first: u32,
    count: u32,
    matrix_offset: u32,
    locals_offset: u32,
}

/// [`GpuDevice`] backed by a wgpu device and queue.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    target_format: wgpu::TextureFormat,
    library: ShaderLibrary,
    handles: HandleAllocator,

    buffers: HashMap<u32, BufferSlot>,
    vertex_arrays: HashMap<u32, Option<(u32, VertexLayout)>>,
    programs: HashMap<u32, ProgramSlot>,
    uniform_slots: HashMap<u32, u32>,
    current_program: Option<u32>,

    matrix_layout: wgpu::BindGroupLayout,
    locals_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    texture_bind_group: wgpu::BindGroup,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    vertex_arena: FrameArena,
    matrix_arena: FrameArena,
    locals_arena: FrameArena,
    matrix_bind_group: Option<(u64, wgpu::BindGroup)>,
    locals_bind_group: Option<(u64, wgpu::BindGroup)>,
    identity_offset: Option<u64>,
    commands: Vec<DrawCommand>,
}

impl WgpuDevice {
    /// Creates a device rendering into targets of `target_format`.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        target_format: wgpu::TextureFormat,
        library: ShaderLibrary,
    ) -> Self {
        let uniform_align = device.limits().min_uniform_buffer_offset_alignment as u64;

        let matrix_layout = create_dynamic_uniform_layout(
            &device,
            "primview matrix block layout",
            MATRIX_BLOCK_SIZE as u64,
        );
        let locals_layout = create_dynamic_uniform_layout(
            &device,
            "primview locals layout",
            DRAW_UNIFORMS_SIZE,
        );

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("primview texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("primview pipeline layout"),
            bind_group_layouts: &[&matrix_layout, &locals_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Texture unit 0 defaults to opaque white so untextured sampling is a no-op.
        let white = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("primview white texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let white_view = white.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("primview sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let texture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("primview texture bind group"),
            layout: &texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&white_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self {
            device,
            queue,
            target_format,
            library,
            handles: HandleAllocator::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            programs: HashMap::new(),
            uniform_slots: HashMap::new(),
            current_program: None,
            matrix_layout,
            locals_layout,
            pipeline_layout,
            texture_bind_group,
            pipelines: HashMap::new(),
            vertex_arena: FrameArena::new(
                "primview vertex arena",
                wgpu::BufferUsages::VERTEX,
                wgpu::COPY_BUFFER_ALIGNMENT,
            ),
            matrix_arena: FrameArena::new(
                "primview matrix arena",
                wgpu::BufferUsages::UNIFORM,
                uniform_align,
            ),
            locals_arena: FrameArena::new(
                "primview locals arena",
                wgpu::BufferUsages::UNIFORM,
                uniform_align,
            ),
            matrix_bind_group: None,
            locals_bind_group: None,
            identity_offset: None,
            commands: Vec::new(),
        }
    }

    /// Format of the color targets pipelines are built for.
    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Number of draws recorded since the last flush.
    pub fn pending_draws(&self) -> usize {
        self.commands.len()
    }

    /// Replays the recorded frame into one render pass targeting `view`.
    ///
    /// `clear` selects between clearing the target first and loading its
    /// current contents. Recorded draws and per-frame snapshots are
    /// discarded afterwards.
    pub fn flush(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear: Option<wgpu::Color>,
    ) {
        if self.commands.is_empty() && clear.is_none() {
            self.end_frame();
            return;
        }

        self.vertex_arena.upload(&self.device, &self.queue);
        self.matrix_arena.upload(&self.device, &self.queue);
        self.locals_arena.upload(&self.device, &self.queue);
        self.refresh_arena_bind_groups();

        let commands = std::mem::take(&mut self.commands);
        tracing::trace!(draws = commands.len(), "Flushing frame");

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("primview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            // Both arenas hold data whenever at least one draw was recorded.
            if let (Some((_, matrix_bg)), Some((_, locals_bg))) =
                (&self.matrix_bind_group, &self.locals_bind_group)
            {
                pass.set_bind_group(2, &self.texture_bind_group, &[]);

                let mut current: Option<PipelineKey> = None;
                for cmd in &commands {
                    let Some(pipeline) = self.pipelines.get(&cmd.pipeline) else {
                        continue;
                    };
                    let vertex_slice = match cmd.vertex {
                        VertexSource::Static(id) => {
                            match self.buffers.get(&id).and_then(|b| b.gpu.as_ref()) {
                                Some(buffer) => buffer.slice(..),
                                None => continue,
                            }
                        }
                        VertexSource::Arena { offset, len } => match &self.vertex_arena.buffer {
                            Some(buffer) => buffer.slice(offset..offset + len),
                            None => continue,
                        },
                    };

                    if current != Some(cmd.pipeline) {
                        pass.set_pipeline(pipeline);
                        current = Some(cmd.pipeline);
                    }
                    pass.set_bind_group(0, matrix_bg, &[cmd.matrix_offset]);
                    pass.set_bind_group(1, locals_bg, &[cmd.locals_offset]);
                    pass.set_vertex_buffer(0, vertex_slice);
                    pass.draw(cmd.first..cmd.first + cmd.count, 0..1);
                }
            }
        }

        // Keep the allocation for the next frame.
        self.commands = commands;
        self.commands.clear();
        self.end_frame();
    }

    fn end_frame(&mut self) {
        self.vertex_arena.clear();
        self.matrix_arena.clear();
        self.locals_arena.clear();
        self.identity_offset = None;
        for slot in self.buffers.values_mut() {
            slot.frame_offset = None;
        }
    }

    fn refresh_arena_bind_groups(&mut self) {
        if let Some(buffer) = &self.matrix_arena.buffer {
            let generation = self.matrix_arena.generation;
            if self.matrix_bind_group.as_ref().map(|(g, _)| *g) != Some(generation) {
                let bg = create_dynamic_uniform_bind_group(
                    &self.device,
                    "primview matrix bind group",
                    &self.matrix_layout,
                    buffer,
                    MATRIX_BLOCK_SIZE as u64,
                );
                self.matrix_bind_group = Some((generation, bg));
            }
        }
        if let Some(buffer) = &self.locals_arena.buffer {
            let generation = self.locals_arena.generation;
            if self.locals_bind_group.as_ref().map(|(g, _)| *g) != Some(generation) {
                let bg = create_dynamic_uniform_bind_group(
                    &self.device,
                    "primview locals bind group",
                    &self.locals_layout,
                    buffer,
                    DRAW_UNIFORMS_SIZE,
                );
                self.locals_bind_group = Some((generation, bg));
            }
        }
    }

    fn next_id(&mut self, kind: &'static str) -> Result<std::num::NonZeroU32, DeviceError> {
        self.handles
            .next()
            .ok_or(DeviceError::ResourceExhausted(kind))
    }

    fn buffer_mut(&mut self, buffer: &Buffer) -> Result<&mut BufferSlot, DeviceError> {
        self.buffers
            .get_mut(&buffer.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: Buffer::KIND,
                raw: buffer.raw(),
            })
    }

    fn program_mut(&mut self, program: &Program) -> Result<&mut ProgramSlot, DeviceError> {
        self.programs
            .get_mut(&program.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: Program::KIND,
                raw: program.raw(),
            })
    }

    fn compile_module(&self, id: &str, vertex: &str, fragment: &str) -> Result<wgpu::ShaderModule, DeviceError> {
        let source = self.library.module_source(id)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(id),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::ShaderCompile {
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                message: format!("{id}: {err}"),
            });
        }
        Ok(module)
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<(), DeviceError> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or(DeviceError::NoProgramBound)?;

        let attributes: Vec<wgpu::VertexAttribute> = key
            .layout
            .attributes
            .iter()
            .map(|attr| wgpu::VertexAttribute {
                format: match attr.components {
                    1 => wgpu::VertexFormat::Float32,
                    2 => wgpu::VertexFormat::Float32x2,
                    3 => wgpu::VertexFormat::Float32x3,
                    _ => wgpu::VertexFormat::Float32x4,
                },
                offset: attr.offset as u64,
                shader_location: attr.location,
            })
            .collect();

        let topology = match key.topology {
            Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            Topology::LineList => wgpu::PrimitiveTopology::LineList,
        };

        tracing::debug!(program = key.program, ?topology, "Creating render pipeline");

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("primview pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: key.layout.stride as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::ShaderCompile {
                vertex: "vs_main".to_string(),
                fragment: "fs_main".to_string(),
                message: format!("pipeline for program {}: {err}", key.program),
            });
        }

        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    /// Arena offset of the matrix block the program reads this frame.
    fn snapshot_matrix(&mut self, block_slot: Option<u32>) -> u64 {
        let slot = block_slot
            .and_then(|slot| self.uniform_slots.get(&slot))
            .and_then(|id| self.buffers.get_mut(id))
            .filter(|slot| slot.data.len() >= MATRIX_BLOCK_SIZE);

        match slot {
            Some(slot) => match slot.frame_offset {
                Some(offset) => offset,
                None => {
                    let offset = self.matrix_arena.push(&slot.data[..MATRIX_BLOCK_SIZE]);
                    slot.frame_offset = Some(offset);
                    offset
                }
            },
            None => match self.identity_offset {
                Some(offset) => offset,
                None => {
                    let identity = glam::Mat4::IDENTITY.to_cols_array();
                    let offset = self.matrix_arena.push(bytemuck::cast_slice(&identity));
                    self.identity_offset = Some(offset);
                    offset
                }
            },
        }
    }
}

impl GpuDevice for WgpuDevice {
    fn create_vertex_array(&mut self) -> Result<VertexArray, DeviceError> {
        let id = self.next_id(VertexArray::KIND)?;
        self.vertex_arrays.insert(id.get(), None);
        Ok(VertexArray::from_raw(id))
    }

    fn create_buffer(&mut self) -> Result<Buffer, DeviceError> {
        let id = self.next_id(Buffer::KIND)?;
        self.buffers.insert(id.get(), BufferSlot::new());
        Ok(Buffer::from_raw(id))
    }

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Program, DeviceError> {
        let vertex = self.compile_module(vertex_source, vertex_source, fragment_source)?;
        let fragment = self.compile_module(fragment_source, vertex_source, fragment_source)?;

        let id = self.next_id(Program::KIND)?;
        self.programs.insert(
            id.get(),
            ProgramSlot {
                vertex,
                fragment,
                uniforms: DrawUniforms::default(),
                block_slot: None,
            },
        );
        Ok(Program::from_raw(id))
    }

    fn configure_vertex_array(
        &mut self,
        vao: &VertexArray,
        buffer: &Buffer,
        layout: VertexLayout,
    ) -> Result<(), DeviceError> {
        self.buffer_mut(buffer)?;
        let slot = self
            .vertex_arrays
            .get_mut(&vao.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: VertexArray::KIND,
                raw: vao.raw(),
            })?;
        *slot = Some((buffer.raw(), layout));
        Ok(())
    }

    fn upload_vertices(
        &mut self,
        buffer: &Buffer,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        let device = Arc::clone(&self.device);
        let queue = Arc::clone(&self.queue);
        let slot = self.buffer_mut(buffer)?;
        slot.frame_offset = None;

        match usage {
            BufferUsage::Static => {
                slot.role = BufferRole::StaticVertex;
                slot.data.clear();
                let len = align_up(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
                if len == 0 {
                    return Ok(());
                }
                if slot.gpu.is_none() || slot.gpu_capacity < len {
                    slot.gpu = Some(device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("primview static vertex buffer"),
                        size: len,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }));
                    slot.gpu_capacity = len;
                }
                if let Some(gpu) = &slot.gpu {
                    let mut padded = data.to_vec();
                    padded.resize(len as usize, 0);
                    queue.write_buffer(gpu, 0, &padded);
                }
            }
            BufferUsage::Dynamic => {
                slot.role = BufferRole::DynamicVertex;
                slot.gpu = None;
                slot.gpu_capacity = 0;
                slot.data.clear();
                slot.data.extend_from_slice(data);
            }
        }
        Ok(())
    }

    fn upload_uniform(&mut self, buffer: &Buffer, data: &[u8]) -> Result<(), DeviceError> {
        let slot = self.buffer_mut(buffer)?;
        slot.role = BufferRole::Uniform;
        slot.frame_offset = None;
        slot.data.clear();
        slot.data.extend_from_slice(data);
        Ok(())
    }

    fn bind_uniform_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), DeviceError> {
        self.buffer_mut(buffer)?;
        self.uniform_slots.insert(slot, buffer.raw());
        Ok(())
    }

    fn bind_uniform_block(
        &mut self,
        program: &Program,
        block: &str,
        slot: u32,
    ) -> Result<(), DeviceError> {
        if block != MATRIX_BLOCK {
            return Err(DeviceError::UnknownUniformBlock(block.to_string()));
        }
        self.program_mut(program)?.block_slot = Some(slot);
        Ok(())
    }

    fn use_program(&mut self, program: &Program) -> Result<(), DeviceError> {
        self.program_mut(program)?;
        self.current_program = Some(program.raw());
        Ok(())
    }

    fn set_uniform(
        &mut self,
        program: &Program,
        name: &str,
        value: UniformValue,
    ) -> Result<(), DeviceError> {
        self.program_mut(program)?.uniforms.set(name, value)
    }

    fn draw_arrays(
        &mut self,
        vao: &VertexArray,
        topology: Topology,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError> {
        let program_id = self.current_program.ok_or(DeviceError::NoProgramBound)?;
        let binding = *self
            .vertex_arrays
            .get(&vao.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: VertexArray::KIND,
                raw: vao.raw(),
            })?;
        let (buffer_id, layout) =
            binding.ok_or(DeviceError::VertexArrayNotConfigured(vao.raw()))?;

        if count == 0 {
            return Ok(());
        }

        let key = PipelineKey {
            program: program_id,
            layout,
            topology,
        };
        self.ensure_pipeline(key)?;

        let vertex = {
            let slot = self
                .buffers
                .get_mut(&buffer_id)
                .ok_or(DeviceError::InvalidHandle {
                    kind: Buffer::KIND,
                    raw: buffer_id,
                })?;
            match slot.role {
                BufferRole::StaticVertex => VertexSource::Static(buffer_id),
                BufferRole::DynamicVertex => {
                    let offset = match slot.frame_offset {
                        Some(offset) => offset,
                        None => {
                            let offset = self.vertex_arena.push(&slot.data);
                            slot.frame_offset = Some(offset);
                            offset
                        }
                    };
                    VertexSource::Arena {
                        offset,
                        len: slot.data.len() as u64,
                    }
                }
                BufferRole::Empty | BufferRole::Uniform => {
                    tracing::trace!(buffer = buffer_id, "Skipping draw from empty vertex buffer");
                    return Ok(());
                }
            }
        };

        let (uniforms, block_slot) = {
            let program = self
                .programs
                .get(&program_id)
                .ok_or(DeviceError::NoProgramBound)?;
            (program.uniforms, program.block_slot)
        };
        let matrix_offset = self.snapshot_matrix(block_slot);
        let locals_offset = self.locals_arena.push(bytemuck::bytes_of(&uniforms));

        self.commands.push(DrawCommand {
            pipeline: key,
            vertex,
            first,
            count,
            matrix_offset: matrix_offset as u32,
            locals_offset: locals_offset as u32,
        });
        Ok(())
    }

    fn release_buffer(&mut self, buffer: Buffer) {
        self.buffers.remove(&buffer.raw());
        self.uniform_slots.retain(|_, b| *b != buffer.raw());
    }

    fn release_vertex_array(&mut self, vao: VertexArray) {
        self.vertex_arrays.remove(&vao.raw());
    }

    fn release_program(&mut self, program: Program) {
        self.programs.remove(&program.raw());
        self.pipelines.retain(|key, _| key.program != program.raw());
        if self.current_program == Some(program.raw()) {
            self.current_program = None;
        }
    }
}

fn create_dynamic_uniform_layout(
    device: &wgpu::Device,
    label: &str,
    size: u64,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        }],
    })
}

fn create_dynamic_uniform_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    size: u64,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(size),
            }),
        }],
    })
}
