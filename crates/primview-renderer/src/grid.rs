//! Lazily built grid overlay mesh.

use crate::backend::{Buffer, BufferUsage, DeviceError, GpuDevice, Topology, VertexArray};
use crate::geometry::{GeometryVertex, generate_grid_vertices};

#[derive(Debug)]
struct GridMesh {
    vao: VertexArray,
    buffer: Buffer,
    vertex_count: u32,
}

/// Grid line mesh in the unit square, built on first use and kept for the
/// renderer's lifetime.
#[derive(Debug)]
pub struct GridCache {
    cells_x: u16,
    cells_y: u16,
    mesh: Option<GridMesh>,
}

impl GridCache {
    pub fn new(cells_x: u16, cells_y: u16) -> Self {
        Self {
            cells_x,
            cells_y,
            mesh: None,
        }
    }

    pub fn is_built(&self) -> bool {
        self.mesh.is_some()
    }

    /// Vertex count of the built mesh, if any.
    pub fn vertex_count(&self) -> Option<u32> {
        self.mesh.as_ref().map(|mesh| mesh.vertex_count)
    }

    /// Builds the mesh if absent. Later calls allocate nothing.
    pub fn ensure_built<D: GpuDevice>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        if self.mesh.is_some() {
            return Ok(());
        }

        let vertices = generate_grid_vertices(self.cells_x, self.cells_y);
        tracing::debug!(
            cells_x = self.cells_x,
            cells_y = self.cells_y,
            vertices = vertices.len(),
            "Building grid mesh"
        );

        let vao = device.create_vertex_array()?;
        let buffer = match device.create_buffer() {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_vertex_array(vao);
                return Err(err);
            }
        };

        let upload = device
            .upload_vertices(&buffer, bytemuck::cast_slice(&vertices), BufferUsage::Static)
            .and_then(|()| device.configure_vertex_array(&vao, &buffer, GeometryVertex::LAYOUT));
        if let Err(err) = upload {
            device.release_vertex_array(vao);
            device.release_buffer(buffer);
            return Err(err);
        }

        self.mesh = Some(GridMesh {
            vao,
            buffer,
            vertex_count: vertices.len() as u32,
        });
        Ok(())
    }

    /// Builds if needed, then draws the mesh as a line list with the current program.
    pub fn draw<D: GpuDevice>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        self.ensure_built(device)?;
        if let Some(mesh) = &self.mesh {
            device.draw_arrays(&mesh.vao, Topology::LineList, 0, mesh.vertex_count)?;
        }
        Ok(())
    }

    pub fn release<D: GpuDevice>(self, device: &mut D) {
        if let Some(mesh) = self.mesh {
            device.release_vertex_array(mesh.vao);
            device.release_buffer(mesh.buffer);
        }
    }
}
