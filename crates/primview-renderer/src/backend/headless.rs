//! In-memory device that records every call.
//!
//! `HeadlessDevice` keeps buffer contents on the CPU and appends each call
//! to a log, so the command stream a renderer produces can be inspected
//! without a GPU: readback of uniform buffers, draw counts, allocation
//! counts. Failures can be injected to exercise error paths.

use std::collections::{HashMap, HashSet};

use glam::Mat4;

use super::{
    Buffer, BufferUsage, DeviceError, DrawUniforms, GpuDevice, HandleAllocator, MATRIX_BLOCK,
    MATRIX_BLOCK_SIZE, Program, ShaderLibrary, Topology, UniformValue, VertexArray, VertexLayout,
};

/// A call received by [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateVertexArray(u32),
    CreateBuffer(u32),
    CompileProgram {
        program: u32,
        vertex: String,
        fragment: String,
    },
    ConfigureVertexArray {
        vao: u32,
        buffer: u32,
        layout: VertexLayout,
    },
    UploadVertices {
        buffer: u32,
        bytes: usize,
        usage: BufferUsage,
    },
    UploadUniform {
        buffer: u32,
        bytes: usize,
    },
    BindUniformBuffer {
        slot: u32,
        buffer: u32,
    },
    BindUniformBlock {
        program: u32,
        block: String,
        slot: u32,
    },
    UseProgram(u32),
    SetUniform {
        program: u32,
        name: String,
        value: UniformValue,
    },
    Draw(DrawCall),
    ReleaseBuffer(u32),
    ReleaseVertexArray(u32),
    ReleaseProgram(u32),
}

/// Snapshot of the state a draw call was issued with.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: u32,
    /// Fragment source id of the program, handy for telling programs apart
    pub fragment_source: String,
    pub vao: u32,
    pub buffer: u32,
    pub topology: Topology,
    pub first: u32,
    pub count: u32,
    /// Per-draw uniforms of the program at the time of the call
    pub uniforms: DrawUniforms,
    /// Matrix block contents visible to the program, if bound
    pub proj_view: Option<Mat4>,
}

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    usage: Option<BufferUsage>,
}

#[derive(Debug)]
struct ProgramState {
    vertex: String,
    fragment: String,
    uniforms: DrawUniforms,
    blocks: HashMap<String, u32>,
}

/// CPU-only [`GpuDevice`] implementation.
#[derive(Debug)]
pub struct HeadlessDevice {
    handles: HandleAllocator,
    buffers: HashMap<u32, BufferState>,
    vertex_arrays: HashMap<u32, Option<(u32, VertexLayout)>>,
    programs: HashMap<u32, ProgramState>,
    uniform_slots: HashMap<u32, u32>,
    current_program: Option<u32>,
    calls: Vec<DeviceCall>,
    failing_sources: HashSet<String>,
    library: Option<ShaderLibrary>,
    created_buffers: usize,
    created_vertex_arrays: usize,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            handles: HandleAllocator::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            programs: HashMap::new(),
            uniform_slots: HashMap::new(),
            current_program: None,
            calls: Vec::new(),
            failing_sources: HashSet::new(),
            library: None,
            created_buffers: 0,
            created_vertex_arrays: 0,
        }
    }

    /// Device that only accepts source ids present in `library`.
    pub fn with_library(library: ShaderLibrary) -> Self {
        Self {
            library: Some(library),
            ..Self::new()
        }
    }

    /// Makes every program using `source` fail to compile.
    pub fn fail_source(&mut self, source: impl Into<String>) {
        self.failing_sources.insert(source.into());
    }

    /// Caps the number of handles (of any kind) the device will issue.
    pub fn limit_handles(&mut self, limit: u32) {
        self.handles.set_limit(Some(limit));
    }

    /// All calls received since creation or the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Draw calls in submission order.
    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.calls.iter().filter_map(|call| match call {
            DeviceCall::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draw_calls().count()
    }

    /// Number of `use_program` calls logged.
    pub fn program_switches(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::UseProgram(_)))
            .count()
    }

    /// Total buffers ever created.
    pub fn created_buffers(&self) -> usize {
        self.created_buffers
    }

    /// Total vertex arrays ever created.
    pub fn created_vertex_arrays(&self) -> usize {
        self.created_vertex_arrays
    }

    /// Buffers, vertex arrays and programs not yet released.
    pub fn live_resources(&self) -> usize {
        self.buffers.len() + self.vertex_arrays.len() + self.programs.len()
    }

    /// Current contents of a buffer.
    pub fn buffer_contents(&self, buffer: u32) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    /// Usage hint of the last vertex upload to a buffer.
    pub fn buffer_usage(&self, buffer: u32) -> Option<BufferUsage> {
        self.buffers.get(&buffer).and_then(|b| b.usage)
    }

    /// Buffer attached to a uniform slot.
    pub fn uniform_slot(&self, slot: u32) -> Option<u32> {
        self.uniform_slots.get(&slot).copied()
    }

    /// Reads the matrix stored in the buffer attached to `slot`.
    pub fn read_matrix_block(&self, slot: u32) -> Option<Mat4> {
        let buffer = self.uniform_slot(slot)?;
        read_matrix(self.buffer_contents(buffer)?)
    }

    /// Slot a program's named uniform block is connected to.
    pub fn program_block_slot(&self, program: u32, block: &str) -> Option<u32> {
        self.programs.get(&program)?.blocks.get(block).copied()
    }

    /// Vertex and fragment source ids of a program.
    pub fn program_sources(&self, program: u32) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|p| (p.vertex.as_str(), p.fragment.as_str()))
    }

    /// Current value of a program's uniform.
    pub fn program_uniform(&self, program: u32, name: &str) -> Option<UniformValue> {
        self.programs.get(&program)?.uniforms.get(name)
    }

    pub fn current_program(&self) -> Option<u32> {
        self.current_program
    }

    fn next_id(&mut self, kind: &'static str) -> Result<std::num::NonZeroU32, DeviceError> {
        self.handles
            .next()
            .ok_or(DeviceError::ResourceExhausted(kind))
    }

    fn buffer_mut(&mut self, buffer: &Buffer) -> Result<&mut BufferState, DeviceError> {
        self.buffers
            .get_mut(&buffer.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: Buffer::KIND,
                raw: buffer.raw(),
            })
    }

    fn program_mut(&mut self, program: &Program) -> Result<&mut ProgramState, DeviceError> {
        self.programs
            .get_mut(&program.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: Program::KIND,
                raw: program.raw(),
            })
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_vertex_array(&mut self) -> Result<VertexArray, DeviceError> {
        let id = self.next_id(VertexArray::KIND)?;
        self.vertex_arrays.insert(id.get(), None);
        self.created_vertex_arrays += 1;
        self.calls.push(DeviceCall::CreateVertexArray(id.get()));
        Ok(VertexArray::from_raw(id))
    }

    fn create_buffer(&mut self) -> Result<Buffer, DeviceError> {
        let id = self.next_id(Buffer::KIND)?;
        self.buffers.insert(id.get(), BufferState::default());
        self.created_buffers += 1;
        self.calls.push(DeviceCall::CreateBuffer(id.get()));
        Ok(Buffer::from_raw(id))
    }

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Program, DeviceError> {
        for source in [vertex_source, fragment_source] {
            let known = match &self.library {
                Some(library) => library.contains(source),
                None => !source.is_empty(),
            };
            if !known {
                return Err(DeviceError::UnknownShaderSource(source.to_string()));
            }
            if self.failing_sources.contains(source) {
                return Err(DeviceError::ShaderCompile {
                    vertex: vertex_source.to_string(),
                    fragment: fragment_source.to_string(),
                    message: format!("injected failure in '{source}'"),
                });
            }
        }

        let id = self.next_id(Program::KIND)?;
        self.programs.insert(
            id.get(),
            ProgramState {
                vertex: vertex_source.to_string(),
                fragment: fragment_source.to_string(),
                uniforms: DrawUniforms::default(),
                blocks: HashMap::new(),
            },
        );
        self.calls.push(DeviceCall::CompileProgram {
            program: id.get(),
            vertex: vertex_source.to_string(),
            fragment: fragment_source.to_string(),
        });
        Ok(Program::from_raw(id))
    }

    fn configure_vertex_array(
        &mut self,
        vao: &VertexArray,
        buffer: &Buffer,
        layout: VertexLayout,
    ) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(&buffer.raw()) {
            return Err(DeviceError::InvalidHandle {
                kind: Buffer::KIND,
                raw: buffer.raw(),
            });
        }
        let slot = self
            .vertex_arrays
            .get_mut(&vao.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: VertexArray::KIND,
                raw: vao.raw(),
            })?;
        *slot = Some((buffer.raw(), layout));
        self.calls.push(DeviceCall::ConfigureVertexArray {
            vao: vao.raw(),
            buffer: buffer.raw(),
            layout,
        });
        Ok(())
    }

    fn upload_vertices(
        &mut self,
        buffer: &Buffer,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        let state = self.buffer_mut(buffer)?;
        state.data.clear();
        state.data.extend_from_slice(data);
        state.usage = Some(usage);
        self.calls.push(DeviceCall::UploadVertices {
            buffer: buffer.raw(),
            bytes: data.len(),
            usage,
        });
        Ok(())
    }

    fn upload_uniform(&mut self, buffer: &Buffer, data: &[u8]) -> Result<(), DeviceError> {
        let state = self.buffer_mut(buffer)?;
        state.data.clear();
        state.data.extend_from_slice(data);
        self.calls.push(DeviceCall::UploadUniform {
            buffer: buffer.raw(),
            bytes: data.len(),
        });
        Ok(())
    }

    fn bind_uniform_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), DeviceError> {
        self.buffer_mut(buffer)?;
        self.uniform_slots.insert(slot, buffer.raw());
        self.calls.push(DeviceCall::BindUniformBuffer {
            slot,
            buffer: buffer.raw(),
        });
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
        self.program_mut(program)?
            .blocks
            .insert(block.to_string(), slot);
        self.calls.push(DeviceCall::BindUniformBlock {
            program: program.raw(),
            block: block.to_string(),
            slot,
        });
        Ok(())
    }

    fn use_program(&mut self, program: &Program) -> Result<(), DeviceError> {
        self.program_mut(program)?;
        self.current_program = Some(program.raw());
        self.calls.push(DeviceCall::UseProgram(program.raw()));
        Ok(())
    }

    fn set_uniform(
        &mut self,
        program: &Program,
        name: &str,
        value: UniformValue,
    ) -> Result<(), DeviceError> {
        self.program_mut(program)?.uniforms.set(name, value)?;
        self.calls.push(DeviceCall::SetUniform {
            program: program.raw(),
            name: name.to_string(),
            value,
        });
        Ok(())
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
        let (buffer, _) = binding.ok_or(DeviceError::VertexArrayNotConfigured(vao.raw()))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or(DeviceError::NoProgramBound)?;

        let proj_view = program
            .blocks
            .get(MATRIX_BLOCK)
            .and_then(|slot| self.uniform_slots.get(slot))
            .and_then(|buffer| self.buffers.get(buffer))
            .and_then(|state| read_matrix(&state.data));

        let draw = DrawCall {
            program: program_id,
            fragment_source: program.fragment.clone(),
            vao: vao.raw(),
            buffer,
            topology,
            first,
            count,
            uniforms: program.uniforms,
            proj_view,
        };
        self.calls.push(DeviceCall::Draw(draw));
        Ok(())
    }

    fn release_buffer(&mut self, buffer: Buffer) {
        self.buffers.remove(&buffer.raw());
        self.uniform_slots.retain(|_, b| *b != buffer.raw());
        self.calls.push(DeviceCall::ReleaseBuffer(buffer.raw()));
    }

    fn release_vertex_array(&mut self, vao: VertexArray) {
        self.vertex_arrays.remove(&vao.raw());
        self.calls.push(DeviceCall::ReleaseVertexArray(vao.raw()));
    }

    fn release_program(&mut self, program: Program) {
        self.programs.remove(&program.raw());
        if self.current_program == Some(program.raw()) {
            self.current_program = None;
        }
        self.calls.push(DeviceCall::ReleaseProgram(program.raw()));
    }
}

fn read_matrix(data: &[u8]) -> Option<Mat4> {
    let bytes = data.get(..MATRIX_BLOCK_SIZE)?;
    let cols: [f32; 16] = bytemuck::pod_read_unaligned(bytes);
    Some(Mat4::from_cols_array(&cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VertexAttribute;

    const LAYOUT: VertexLayout = VertexLayout {
        stride: 8,
        attributes: &[VertexAttribute {
            location: 0,
            components: 2,
            offset: 0,
        }],
    };

    #[test]
    fn test_handles_are_unique() {
        let mut device = HeadlessDevice::new();
        let a = device.create_buffer().unwrap();
        let b = device.create_buffer().unwrap();
        let vao = device.create_vertex_array().unwrap();

        assert_ne!(a.raw(), b.raw());
        assert_ne!(b.raw(), vao.raw());
        assert_eq!(device.created_buffers(), 2);
        assert_eq!(device.created_vertex_arrays(), 1);
    }

    #[test]
    fn test_draw_requires_program() {
        let mut device = HeadlessDevice::new();
        let vao = device.create_vertex_array().unwrap();
        let buffer = device.create_buffer().unwrap();
        device.configure_vertex_array(&vao, &buffer, LAYOUT).unwrap();

        let err = device
            .draw_arrays(&vao, Topology::LineList, 0, 2)
            .unwrap_err();
        assert_eq!(err, DeviceError::NoProgramBound);
    }

    #[test]
    fn test_draw_requires_configured_vao() {
        let mut device = HeadlessDevice::new();
        let program = device.compile_program("a.vert", "a.frag").unwrap();
        device.use_program(&program).unwrap();
        let vao = device.create_vertex_array().unwrap();

        let err = device
            .draw_arrays(&vao, Topology::TriangleStrip, 0, 4)
            .unwrap_err();
        assert_eq!(err, DeviceError::VertexArrayNotConfigured(vao.raw()));
    }

    #[test]
    fn test_injected_compile_failure() {
        let mut device = HeadlessDevice::new();
        device.fail_source("broken.frag");

        let err = device
            .compile_program("simple.vert", "broken.frag")
            .unwrap_err();
        assert!(matches!(err, DeviceError::ShaderCompile { .. }));
    }

    #[test]
    fn test_library_rejects_unknown_source() {
        let mut device = HeadlessDevice::with_library(ShaderLibrary::builtin());
        assert!(device.compile_program("simple.vert", "uniform_color.frag").is_ok());

        let err = device
            .compile_program("simple.vert", "glow.frag")
            .unwrap_err();
        assert_eq!(err, DeviceError::UnknownShaderSource("glow.frag".to_string()));
    }

    #[test]
    fn test_matrix_block_readback() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer().unwrap();
        let m = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));

        device
            .upload_uniform(&buffer, bytemuck::cast_slice(&m.to_cols_array()))
            .unwrap();
        device.bind_uniform_buffer(3, &buffer).unwrap();

        assert_eq!(device.read_matrix_block(3), Some(m));
        assert_eq!(device.read_matrix_block(0), None);
    }

    #[test]
    fn test_unknown_block_rejected() {
        let mut device = HeadlessDevice::new();
        let program = device.compile_program("a.vert", "a.frag").unwrap();

        let err = device
            .bind_uniform_block(&program, "Lights", 0)
            .unwrap_err();
        assert_eq!(err, DeviceError::UnknownUniformBlock("Lights".to_string()));
    }

    #[test]
    fn test_release_drops_state() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer().unwrap();
        let program = device.compile_program("a.vert", "a.frag").unwrap();
        assert_eq!(device.live_resources(), 2);

        device.release_buffer(buffer);
        device.release_program(program);
        assert_eq!(device.live_resources(), 0);
    }
}
