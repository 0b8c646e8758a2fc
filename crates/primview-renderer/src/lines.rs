//! Per-frame line segment buffer.

use bytemuck::{Pod, Zeroable};
use primview_core::Line;

use crate::backend::{
    Buffer, BufferUsage, DeviceError, GpuDevice, Topology, VertexArray, VertexAttribute,
    VertexLayout,
};

/// One line endpoint: RGB color, the segment's alpha, then position.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub color: [f32; 3],
    pub alpha: f32,
    pub position: [f32; 2],
}

impl LineVertex {
    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<LineVertex>() as u32,
        attributes: &[
            VertexAttribute {
                location: 0,
                components: 2,
                offset: 16,
            },
            VertexAttribute {
                location: 1,
                components: 4,
                offset: 0,
            },
        ],
    };
}

/// Appends two vertices per segment to `out`. Both endpoints carry the segment alpha.
pub fn pack_lines(lines: &[Line], out: &mut Vec<LineVertex>) {
    out.reserve(lines.len() * 2);
    for line in lines {
        out.push(LineVertex {
            color: line.start_color.to_array(),
            alpha: line.alpha,
            position: line.start.to_array(),
        });
        out.push(LineVertex {
            color: line.end_color.to_array(),
            alpha: line.alpha,
            position: line.end.to_array(),
        });
    }
}

/// Single vertex buffer holding this frame's segments.
///
/// The vertex array and buffer are created on first upload; every upload
/// replaces the whole contents.
#[derive(Debug, Default)]
pub struct DynamicLineBuffer {
    binding: Option<(VertexArray, Buffer)>,
    scratch: Vec<LineVertex>,
    vertex_count: u32,
}

impl DynamicLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.binding.is_some()
    }

    /// Vertices written by the last upload.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn ensure_built<D: GpuDevice>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        if self.binding.is_some() {
            return Ok(());
        }
        tracing::debug!("Creating line vertex layout");

        let vao = device.create_vertex_array()?;
        let buffer = match device.create_buffer() {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_vertex_array(vao);
                return Err(err);
            }
        };
        if let Err(err) = device.configure_vertex_array(&vao, &buffer, LineVertex::LAYOUT) {
            device.release_vertex_array(vao);
            device.release_buffer(buffer);
            return Err(err);
        }

        self.binding = Some((vao, buffer));
        Ok(())
    }

    /// Replaces the buffer contents with `lines` and returns the vertex count.
    pub fn upload<D: GpuDevice>(&mut self, device: &mut D, lines: &[Line]) -> Result<u32, DeviceError> {
        self.ensure_built(device)?;

        self.scratch.clear();
        pack_lines(lines, &mut self.scratch);

        if let Some((_, buffer)) = &self.binding {
            device.upload_vertices(buffer, bytemuck::cast_slice(&self.scratch), BufferUsage::Dynamic)?;
        }
        self.vertex_count = self.scratch.len() as u32;
        Ok(self.vertex_count)
    }

    /// Draws the last uploaded segments with the current program.
    pub fn draw<D: GpuDevice>(&self, device: &mut D) -> Result<(), DeviceError> {
        match &self.binding {
            Some((vao, _)) if self.vertex_count > 0 => {
                device.draw_arrays(vao, Topology::LineList, 0, self.vertex_count)
            }
            _ => Ok(()),
        }
    }

    pub fn release<D: GpuDevice>(self, device: &mut D) {
        if let Some((vao, buffer)) = self.binding {
            device.release_vertex_array(vao);
            device.release_buffer(buffer);
        }
    }
}
