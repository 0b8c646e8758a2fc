//! Primitive draw dispatcher.

use glam::{Mat4, Vec2, Vec3};
use primview_core::{Camera, Circle, Frame, Line, PrimitiveSlice, Rectangle};

use crate::backend::{GpuDevice, UniformValue};
use crate::config::RendererConfig;
use crate::error::{RendererError, Result};
use crate::geometry::UnitQuad;
use crate::grid::GridCache;
use crate::lines::DynamicLineBuffer;
use crate::shaders::ShaderSet;
use crate::transform::FrameTransform;

/// Depth of the background plane, just behind everything drawn at z = 0.
pub const BACKGROUND_DEPTH: f32 = -0.2;

/// Model matrix mapping the unit quad onto a circle's bounding square.
pub fn circle_model(circle: &Circle) -> Mat4 {
    Mat4::from_translation(circle.center.extend(0.0))
        * Mat4::from_scale(Vec3::new(circle.radius, circle.radius, 1.0))
}

/// Model matrix mapping the unit quad onto a rectangle.
pub fn rectangle_model(rect: &Rectangle) -> Mat4 {
    Mat4::from_translation(rect.center.extend(0.0))
        * Mat4::from_scale(Vec3::new(rect.half_width, rect.half_height, 1.0))
}

/// Model matrix stretching the unit quad over `[0, area]`, slightly behind z = 0.
pub fn background_model(area: Vec2) -> Mat4 {
    Mat4::from_scale((area * 0.5).extend(1.0))
        * Mat4::from_translation(Vec3::new(1.0, 1.0, BACKGROUND_DEPTH))
}

/// Model matrix scaling the unit-square grid to `area`.
pub fn grid_model(area: Vec2) -> Mat4 {
    Mat4::from_scale(area.extend(1.0))
}

/// Immediate-mode renderer for circles, rectangles, lines, a background
/// plane and a grid overlay.
///
/// The renderer owns its device resources but not the device: every call
/// takes the device explicitly. Call [`release`](Self::release) before
/// dropping the device.
///
/// # Example
///
/// ```
/// use glam::{Mat4, Vec2, Vec3, Vec4};
/// use primview_core::{Circle, PrimitiveSlice};
/// use primview_renderer::{HeadlessDevice, PrimitiveRenderer, RendererConfig};
///
/// let mut device = HeadlessDevice::new();
/// let mut renderer = PrimitiveRenderer::new(&mut device, RendererConfig::default())?;
///
/// let mut slice = PrimitiveSlice::new();
/// slice.push(Circle::new(Vec2::new(10.0, 10.0), 4.0, Vec4::ONE));
///
/// renderer.update_frustum(&mut device, &Mat4::IDENTITY)?;
/// renderer.render_background(&mut device, Vec3::splat(0.1))?;
/// renderer.render_frame_layer(&mut device, &slice)?;
/// assert_eq!(device.draw_count(), 2);
///
/// renderer.release(&mut device);
/// # Ok::<(), primview_renderer::RendererError>(())
/// ```
#[derive(Debug)]
pub struct PrimitiveRenderer {
    config: RendererConfig,
    shaders: ShaderSet,
    quad: UnitQuad,
    transform: FrameTransform,
    grid: GridCache,
    lines: DynamicLineBuffer,
    background_model: Mat4,
    grid_model: Mat4,
}

impl PrimitiveRenderer {
    /// Compiles the shader set, uploads the unit quad and creates the
    /// shared matrix buffer.
    ///
    /// Any failure is reported as [`RendererError::Init`]; resources
    /// created before the failure are released.
    pub fn new<D: GpuDevice>(device: &mut D, config: RendererConfig) -> Result<Self> {
        let slot = config.uniform_block_slot;

        tracing::info!("Compiling shader programs");
        let shaders = ShaderSet::compile(device, &config.shaders)
            .map_err(RendererError::init("compile shaders"))?;

        tracing::info!("Creating unit quad");
        let quad = match UnitQuad::new(device) {
            Ok(quad) => quad,
            Err(err) => {
                shaders.release(device);
                return Err(RendererError::init("create unit quad")(err));
            }
        };

        tracing::info!(slot, "Creating matrix uniform buffer");
        let transform = match FrameTransform::new(device, slot) {
            Ok(transform) => transform,
            Err(err) => {
                quad.release(device);
                shaders.release(device);
                return Err(RendererError::init("create matrix uniform buffer")(err));
            }
        };

        tracing::info!(slot, "Binding uniform blocks");
        if let Err(err) = shaders.bind(device, slot) {
            transform.release(device);
            quad.release(device);
            shaders.release(device);
            return Err(RendererError::init("bind uniform blocks")(err));
        }

        let area = config.area_size.as_vec2();
        let [cells_x, cells_y] = config.grid_cells;

        Ok(Self {
            background_model: background_model(area),
            grid_model: grid_model(area),
            grid: GridCache::new(cells_x, cells_y),
            lines: DynamicLineBuffer::new(),
            config,
            shaders,
            quad,
            transform,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn shaders(&self) -> &ShaderSet {
        &self.shaders
    }

    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    pub fn grid(&self) -> &GridCache {
        &self.grid
    }

    pub fn lines(&self) -> &DynamicLineBuffer {
        &self.lines
    }

    /// Writes the camera's projection-view matrix to the shared block.
    pub fn update_frustum<D: GpuDevice>(&mut self, device: &mut D, camera: &impl Camera) -> Result<()> {
        self.transform.update(device, camera)?;
        Ok(())
    }

    /// Draws an opaque quad covering the drawing area.
    pub fn render_background<D: GpuDevice>(&mut self, device: &mut D, color: Vec3) -> Result<()> {
        let program = &self.shaders.color;
        device.use_program(program)?;
        device.set_uniform(program, "model", UniformValue::Mat4(self.background_model))?;
        device.set_uniform(program, "color", UniformValue::Vec4(color.extend(1.0)))?;
        self.quad.draw(device)?;
        Ok(())
    }

    /// Draws the grid overlay, building its mesh on first use.
    pub fn render_grid<D: GpuDevice>(&mut self, device: &mut D, color: Vec3) -> Result<()> {
        let program = &self.shaders.color;
        device.use_program(program)?;
        device.set_uniform(program, "model", UniformValue::Mat4(self.grid_model))?;
        device.set_uniform(program, "color", UniformValue::Vec4(color.extend(1.0)))?;
        self.grid.draw(device)?;
        Ok(())
    }

    /// Draws one slice: circles, then rectangles, then lines.
    ///
    /// Empty groups neither bind their program nor draw.
    pub fn render_frame_layer<D: GpuDevice>(
        &mut self,
        device: &mut D,
        slice: &PrimitiveSlice,
    ) -> Result<()> {
        tracing::trace!(
            circles = slice.circles.len(),
            rectangles = slice.rectangles.len(),
            lines = slice.lines.len(),
            "Rendering frame layer"
        );

        if !slice.circles.is_empty() {
            self.render_circles(device, &slice.circles)?;
        }
        if !slice.rectangles.is_empty() {
            self.render_rectangles(device, &slice.rectangles)?;
        }
        if !slice.lines.is_empty() {
            self.render_lines(device, &slice.lines)?;
        }
        Ok(())
    }

    /// Renders every layer of `frame` in order.
    pub fn render_frame<D: GpuDevice>(&mut self, device: &mut D, frame: &Frame) -> Result<()> {
        for layer in frame.layers() {
            self.render_frame_layer(device, layer)?;
        }
        Ok(())
    }

    fn render_circles<D: GpuDevice>(&mut self, device: &mut D, circles: &[Circle]) -> Result<()> {
        let program = &self.shaders.circle;
        device.use_program(program)?;
        device.set_uniform(program, "textured", UniformValue::Int(0))?;

        for circle in circles {
            device.set_uniform(program, "radius2", UniformValue::Float(circle.radius * circle.radius))?;
            device.set_uniform(program, "center", UniformValue::Vec3(circle.center.extend(0.0)))?;
            device.set_uniform(program, "color", UniformValue::Vec4(circle.color))?;
            device.set_uniform(program, "model", UniformValue::Mat4(circle_model(circle)))?;
            self.quad.draw(device)?;
        }
        Ok(())
    }

    fn render_rectangles<D: GpuDevice>(&mut self, device: &mut D, rects: &[Rectangle]) -> Result<()> {
        let program = &self.shaders.color;
        device.use_program(program)?;

        for rect in rects {
            device.set_uniform(program, "model", UniformValue::Mat4(rectangle_model(rect)))?;
            device.set_uniform(program, "color", UniformValue::Vec4(rect.color))?;
            self.quad.draw(device)?;
        }
        Ok(())
    }

    fn render_lines<D: GpuDevice>(&mut self, device: &mut D, lines: &[Line]) -> Result<()> {
        device.use_program(&self.shaders.lines)?;
        self.lines.upload(device, lines)?;
        self.lines.draw(device)?;
        Ok(())
    }

    /// Releases every device resource the renderer owns.
    pub fn release<D: GpuDevice>(self, device: &mut D) {
        tracing::debug!("Releasing renderer resources");
        self.lines.release(device);
        self.grid.release(device);
        self.transform.release(device);
        self.quad.release(device);
        self.shaders.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;
    use approx::assert_abs_diff_eq;
    use glam::{UVec2, Vec4};

    fn renderer(device: &mut HeadlessDevice) -> PrimitiveRenderer {
        PrimitiveRenderer::new(device, RendererConfig::default()).unwrap()
    }

    #[test]
    fn test_circle_model_bounds_circle() {
        let circle = Circle::new(Vec2::new(5.0, -3.0), 2.0, Vec4::ONE);
        let m = circle_model(&circle);

        let lo = m.transform_point3(Vec3::new(-1.0, -1.0, 0.0));
        let hi = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_abs_diff_eq!(lo, Vec3::new(3.0, -5.0, 0.0));
        assert_abs_diff_eq!(hi, Vec3::new(7.0, -1.0, 0.0));
    }

    #[test]
    fn test_rectangle_model_bounds_rectangle() {
        let rect = Rectangle::new(Vec2::new(10.0, 20.0), 4.0, 1.5, Vec4::ONE);
        let m = rectangle_model(&rect);

        let lo = m.transform_point3(Vec3::new(-1.0, -1.0, 0.0));
        let hi = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_abs_diff_eq!(lo, Vec3::new(6.0, 18.5, 0.0));
        assert_abs_diff_eq!(hi, Vec3::new(14.0, 21.5, 0.0));
    }

    #[test]
    fn test_background_model_covers_area() {
        let m = background_model(Vec2::new(800.0, 600.0));
        let lo = m.transform_point3(Vec3::new(-1.0, -1.0, 0.0));
        let hi = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert_abs_diff_eq!(lo, Vec3::new(0.0, 0.0, -0.2));
        assert_abs_diff_eq!(hi, Vec3::new(800.0, 600.0, -0.2));
    }

    #[test]
    fn test_construction_stages() {
        let mut device = HeadlessDevice::new();
        let renderer = renderer(&mut device);

        // 4 programs, quad vao + buffer, matrix buffer
        assert_eq!(device.live_resources(), 7);
        assert!(!renderer.grid().is_built());
        assert!(!renderer.lines().is_built());
        assert_eq!(device.draw_count(), 0);
    }

    #[test]
    fn test_shader_failure_is_init_error() {
        let mut device = HeadlessDevice::new();
        device.fail_source("circle.frag");

        let err = PrimitiveRenderer::new(&mut device, RendererConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Init {
                stage: "compile shaders",
                ..
            }
        ));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_exhaustion_releases_partial_state() {
        let mut device = HeadlessDevice::new();
        // Enough for the programs and the quad, not the matrix buffer.
        device.limit_handles(6);

        let err = PrimitiveRenderer::new(&mut device, RendererConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Init {
                stage: "create matrix uniform buffer",
                ..
            }
        ));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_quad_failure_releases_partial_state() {
        let mut device = HeadlessDevice::new();
        // Programs and the quad vertex array fit, the quad buffer does not.
        device.limit_handles(5);

        let err = PrimitiveRenderer::new(&mut device, RendererConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Init {
                stage: "create unit quad",
                ..
            }
        ));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_circle_uniforms() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer(&mut device);
        let mut slice = PrimitiveSlice::new();
        slice.push(Circle::new(Vec2::new(1.0, 2.0), 3.0, Vec4::new(1.0, 0.0, 0.0, 0.5)));

        renderer.render_frame_layer(&mut device, &slice).unwrap();

        let draw = device.draw_calls().next().unwrap();
        assert_eq!(draw.program, renderer.shaders().circle.raw());
        assert_eq!(draw.count, 4);
        assert_eq!(draw.uniforms.radius2, 9.0);
        assert_eq!(draw.uniforms.center, [1.0, 2.0, 0.0]);
        assert_eq!(draw.uniforms.color, [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(draw.uniforms.textured, 0);
    }

    #[test]
    fn test_grid_model_uses_area() {
        let mut device = HeadlessDevice::new();
        let config = RendererConfig::default().with_area_size(UVec2::new(200, 100));
        let mut renderer = PrimitiveRenderer::new(&mut device, config).unwrap();

        renderer.render_grid(&mut device, Vec3::ONE).unwrap();

        let draw = device.draw_calls().next().unwrap();
        assert_eq!(
            draw.uniforms.model(),
            Mat4::from_scale(Vec3::new(200.0, 100.0, 1.0))
        );
    }

    #[test]
    fn test_release_frees_everything() {
        let mut device = HeadlessDevice::new();
        let mut renderer = renderer(&mut device);
        renderer.render_grid(&mut device, Vec3::ONE).unwrap();
        let mut slice = PrimitiveSlice::new();
        slice.push(Line::solid(Vec2::ZERO, Vec2::ONE, Vec3::ONE, 1.0));
        renderer.render_frame_layer(&mut device, &slice).unwrap();

        renderer.release(&mut device);
        assert_eq!(device.live_resources(), 0);
    }
}
