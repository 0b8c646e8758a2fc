//! Static geometry: the shared unit quad and grid line generation.

use bytemuck::{Pod, Zeroable};

use crate::backend::{
    Buffer, BufferUsage, DeviceError, GpuDevice, Topology, VertexArray, VertexAttribute,
    VertexLayout,
};

/// Position + texture coordinate vertex used by the quad and the grid.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GeometryVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl GeometryVertex {
    pub const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }

    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<GeometryVertex>() as u32,
        attributes: &[
            VertexAttribute {
                location: 0,
                components: 3,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                components: 2,
                offset: 12,
            },
        ],
    };
}

/// Unit quad spanning [-1, 1]² as a 4-vertex triangle strip.
pub const QUAD_VERTICES: [GeometryVertex; 4] = [
    GeometryVertex::new([-1.0, -1.0, 0.0], [0.0, 0.0]),
    GeometryVertex::new([1.0, -1.0, 0.0], [1.0, 0.0]),
    GeometryVertex::new([-1.0, 1.0, 0.0], [0.0, 1.0]),
    GeometryVertex::new([1.0, 1.0, 0.0], [1.0, 1.0]),
];

/// Line-list vertices for a grid of `cells_x` × `cells_y` cells in the unit square.
///
/// Produces `cells_x + 1` vertical and `cells_y + 1` horizontal segments.
/// A zero cell count still yields the boundary line at 0 for that axis.
pub fn generate_grid_vertices(cells_x: u16, cells_y: u16) -> Vec<GeometryVertex> {
    let step = |cells: u16| if cells == 0 { 0.0 } else { 1.0 / cells as f32 };
    let step_x = step(cells_x);
    let step_y = step(cells_y);

    let vertex = |x: f32, y: f32| GeometryVertex::new([x, y, 0.0], [x, y]);

    let mut vertices = Vec::with_capacity(grid_vertex_count(cells_x, cells_y));

    for i in 0..=cells_x {
        let x = i as f32 * step_x;
        vertices.push(vertex(x, 0.0));
        vertices.push(vertex(x, 1.0));
    }

    for j in 0..=cells_y {
        let y = j as f32 * step_y;
        vertices.push(vertex(0.0, y));
        vertices.push(vertex(1.0, y));
    }

    vertices
}

/// Number of vertices [`generate_grid_vertices`] produces.
pub fn grid_vertex_count(cells_x: u16, cells_y: u16) -> usize {
    2 * ((cells_x as usize + 1) + (cells_y as usize + 1))
}

/// The shared unit quad, created once at renderer construction.
#[derive(Debug)]
pub struct UnitQuad {
    vao: VertexArray,
    buffer: Buffer,
}

impl UnitQuad {
    pub const VERTEX_COUNT: u32 = QUAD_VERTICES.len() as u32;

    pub fn new<D: GpuDevice>(device: &mut D) -> Result<Self, DeviceError> {
        let vao = device.create_vertex_array()?;
        let buffer = match device.create_buffer() {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_vertex_array(vao);
                return Err(err);
            }
        };

        let upload = device
            .upload_vertices(
                &buffer,
                bytemuck::cast_slice(&QUAD_VERTICES),
                BufferUsage::Static,
            )
            .and_then(|()| device.configure_vertex_array(&vao, &buffer, GeometryVertex::LAYOUT));
        if let Err(err) = upload {
            device.release_vertex_array(vao);
            device.release_buffer(buffer);
            return Err(err);
        }

        Ok(Self { vao, buffer })
    }

    pub fn draw<D: GpuDevice>(&self, device: &mut D) -> Result<(), DeviceError> {
        device.draw_arrays(&self.vao, Topology::TriangleStrip, 0, Self::VERTEX_COUNT)
    }

    pub fn release<D: GpuDevice>(self, device: &mut D) {
        device.release_vertex_array(self.vao);
        device.release_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<GeometryVertex>(), 20);
        assert_eq!(GeometryVertex::LAYOUT.stride, 20);
    }

    #[test]
    fn test_grid_vertex_count() {
        for (cx, cy) in [(0, 0), (1, 1), (10, 10), (3, 7)] {
            assert_eq!(
                generate_grid_vertices(cx, cy).len(),
                grid_vertex_count(cx, cy)
            );
        }
        assert_eq!(grid_vertex_count(10, 10), 44);
    }

    #[test]
    fn test_grid_spans_unit_square() {
        let vertices = generate_grid_vertices(4, 2);

        // Vertical lines first, at x = 0, 0.25, .., 1
        assert_eq!(vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(vertices[1].position, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[8].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[3].position[0], 0.25);

        // Then horizontal lines at y = 0, 0.5, 1
        assert_eq!(vertices[10].position, [0.0, 0.0, 0.0]);
        assert_eq!(vertices[13].position, [1.0, 0.5, 0.0]);
        assert_eq!(vertices[15].position, [1.0, 1.0, 0.0]);

        for v in &vertices {
            assert!((0.0..=1.0).contains(&v.position[0]));
            assert!((0.0..=1.0).contains(&v.position[1]));
        }
    }

    #[test]
    fn test_zero_cells_keep_boundary() {
        let vertices = generate_grid_vertices(0, 3);
        assert_eq!(vertices.len(), 2 * (1 + 4));
        assert_eq!(vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(vertices[1].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unit_quad_failure_leaves_nothing() {
        let mut device = HeadlessDevice::new();
        device.limit_handles(1);

        assert!(UnitQuad::new(&mut device).is_err());
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_unit_quad_upload() {
        let mut device = HeadlessDevice::new();
        let quad = UnitQuad::new(&mut device).unwrap();

        assert_eq!(device.buffer_usage(quad.buffer.raw()), Some(BufferUsage::Static));
        assert_eq!(
            device.buffer_contents(quad.buffer.raw()).map(<[u8]>::len),
            Some(4 * 20)
        );
        quad.release(&mut device);
        assert_eq!(device.live_resources(), 0);
    }
}
