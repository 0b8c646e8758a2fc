//! GPU device abstraction.
//!
//! The renderer never talks to a graphics API directly. It drives a
//! [`GpuDevice`], which plays the part of resource factory and shader
//! compiler at once, and owns the move-only handles the device returns.
//!
//! Backends:
//! - [`HeadlessDevice`]: in-memory device that logs every call
//! - `WgpuDevice` (feature `wgpu`): records draws and replays them into a
//!   wgpu render pass

mod handle;
mod headless;
mod shader_library;
mod uniforms;
#[cfg(feature = "wgpu")]
mod wgpu_device;

pub use handle::*;
pub use headless::*;
pub use shader_library::*;
pub use uniforms::*;
#[cfg(feature = "wgpu")]
pub use wgpu_device::*;

/// Errors reported by a device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to compile shader program ({vertex}, {fragment}): {message}")]
    ShaderCompile {
        vertex: String,
        fragment: String,
        message: String,
    },

    #[error("Unknown shader source: {0}")]
    UnknownShaderSource(String),

    #[error("Unknown uniform: {0}")]
    UnknownUniform(String),

    #[error("Uniform '{name}' expects {expected:?}, got {actual:?}")]
    UniformTypeMismatch {
        name: String,
        expected: UniformKind,
        actual: UniformKind,
    },

    #[error("Unknown uniform block: {0}")]
    UnknownUniformBlock(String),

    #[error("GPU resources exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("Invalid {kind} handle: {raw}")]
    InvalidHandle { kind: &'static str, raw: u32 },

    #[error("Vertex array {0} has no buffer attached")]
    VertexArrayNotConfigured(u32),

    #[error("Draw issued with no program in use")]
    NoProgramBound,
}

/// How a vertex buffer's contents are expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Uploaded once, drawn many times
    Static,
    /// Replaced every frame
    Dynamic,
}

/// Primitive assembly mode for a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Consecutive triangles sharing an edge; four vertices make a quad
    TriangleStrip,
    /// Every pair of vertices is an independent segment
    LineList,
}

/// One shader input read from a vertex buffer (32-bit floats only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Number of f32 components (1-4)
    pub components: u32,
    /// Byte offset inside a vertex
    pub offset: u32,
}

/// Mapping from raw buffer bytes to shader inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Bytes between consecutive vertices
    pub stride: u32,
    pub attributes: &'static [VertexAttribute],
}

/// Resource factory, shader compiler and draw submission for the renderer.
///
/// All calls are synchronous from the caller's point of view. GPU
/// completion is never awaited.
pub trait GpuDevice {
    /// Creates a fresh vertex-array handle.
    fn create_vertex_array(&mut self) -> Result<VertexArray, DeviceError>;

    /// Creates a fresh, empty buffer handle.
    fn create_buffer(&mut self) -> Result<Buffer, DeviceError>;

    /// Compiles and links a program from a vertex and a fragment source id.
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Program, DeviceError>;

    /// Describes how `buffer` feeds the inputs of draws through `vao`.
    fn configure_vertex_array(
        &mut self,
        vao: &VertexArray,
        buffer: &Buffer,
        layout: VertexLayout,
    ) -> Result<(), DeviceError>;

    /// Replaces the whole contents of a vertex buffer.
    fn upload_vertices(
        &mut self,
        buffer: &Buffer,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), DeviceError>;

    /// Replaces the whole contents of a uniform buffer.
    fn upload_uniform(&mut self, buffer: &Buffer, data: &[u8]) -> Result<(), DeviceError>;

    /// Attaches a uniform buffer to a binding slot.
    fn bind_uniform_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), DeviceError>;

    /// Connects the program's named uniform block to a binding slot.
    fn bind_uniform_block(
        &mut self,
        program: &Program,
        block: &str,
        slot: u32,
    ) -> Result<(), DeviceError>;

    /// Makes `program` current for subsequent draws.
    fn use_program(&mut self, program: &Program) -> Result<(), DeviceError>;

    /// Sets a named uniform on `program`. The value persists until changed.
    fn set_uniform(
        &mut self,
        program: &Program,
        name: &str,
        value: UniformValue,
    ) -> Result<(), DeviceError>;

    /// Draws `count` vertices starting at `first` with the current program.
    fn draw_arrays(
        &mut self,
        vao: &VertexArray,
        topology: Topology,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError>;

    fn release_buffer(&mut self, buffer: Buffer);

    fn release_vertex_array(&mut self, vao: VertexArray);

    fn release_program(&mut self, program: Program);
}
