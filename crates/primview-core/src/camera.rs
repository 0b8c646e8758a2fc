//! Camera interface consumed by the renderer.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Anything that can provide a combined projection-view matrix.
///
/// The renderer reads nothing else from a camera.
pub trait Camera {
    fn proj_view(&self) -> Mat4;
}

impl Camera for Mat4 {
    fn proj_view(&self) -> Mat4 {
        *self
    }
}

/// Orthographic 2D camera looking down -Z at the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrthoCamera {
    /// World point shown at the viewport center
    pub center: Vec2,
    /// Viewport size in pixels
    pub viewport: Vec2,
    /// Pixels per world unit
    pub zoom: f32,
}

impl OrthoCamera {
    /// Depth range kept visible; background quads sit slightly below z = 0.
    pub const DEPTH: f32 = 1.0;

    pub fn new(center: Vec2, viewport: Vec2, zoom: f32) -> Self {
        Self {
            center,
            viewport,
            zoom,
        }
    }

    /// Camera that fits the rectangle `[0, area]` inside `viewport`.
    pub fn fit_area(area: Vec2, viewport: Vec2) -> Self {
        let zoom = (viewport.x / area.x.max(f32::EPSILON)).min(viewport.y / area.y.max(f32::EPSILON));
        Self::new(area * 0.5, viewport, zoom)
    }

    /// Visible world extent.
    pub fn visible_size(&self) -> Vec2 {
        self.viewport / self.zoom.max(f32::EPSILON)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(-self.center.x, -self.center.y, 0.0))
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let half = self.visible_size() * 0.5;
        Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -Self::DEPTH, Self::DEPTH)
    }
}

impl Camera for OrthoCamera {
    fn proj_view(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
