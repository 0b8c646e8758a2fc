//! Drawable primitive shapes.
//!
//! Primitives are plain values built fresh every frame. The renderer reads
//! them and never validates their fields: a negative radius or half-extent
//! is a caller error that produces wrong pixels, not a failure.

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Filled circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Center in world units
    pub center: Vec2,
    /// Radius in world units, expected to be >= 0
    pub radius: f32,
    /// RGBA fill color
    pub color: Vec4,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32, color: Vec4) -> Self {
        Self {
            center,
            radius,
            color,
        }
    }
}

/// Filled axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    /// Center in world units
    pub center: Vec2,
    /// Half of the width, expected to be >= 0
    pub half_width: f32,
    /// Half of the height, expected to be >= 0
    pub half_height: f32,
    /// RGBA fill color
    pub color: Vec4,
}

impl Rectangle {
    pub fn new(center: Vec2, half_width: f32, half_height: f32, color: Vec4) -> Self {
        Self {
            center,
            half_width,
            half_height,
            color,
        }
    }

    /// Creates a rectangle from its full width and height.
    pub fn from_size(center: Vec2, size: Vec2, color: Vec4) -> Self {
        Self::new(center, size.x * 0.5, size.y * 0.5, color)
    }

    /// Half extents as a vector.
    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.half_width, self.half_height)
    }
}

/// Line segment with a color per endpoint.
///
/// Alpha is stored once per segment and shared by both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Vec2,
    pub end: Vec2,
    /// RGB color at `start`
    pub start_color: Vec3,
    /// RGB color at `end`
    pub end_color: Vec3,
    /// Opacity of the whole segment
    pub alpha: f32,
}

impl Line {
    pub fn new(start: Vec2, start_color: Vec3, end: Vec2, end_color: Vec3, alpha: f32) -> Self {
        Self {
            start,
            end,
            start_color,
            end_color,
            alpha,
        }
    }

    /// Single-colored segment.
    pub fn solid(start: Vec2, end: Vec2, color: Vec3, alpha: f32) -> Self {
        Self::new(start, color, end, color, alpha)
    }

    /// RGBA color at `start`, carrying the segment alpha.
    pub fn start_rgba(&self) -> Vec4 {
        self.start_color.extend(self.alpha)
    }

    /// RGBA color at `end`, carrying the segment alpha.
    pub fn end_rgba(&self) -> Vec4 {
        self.end_color.extend(self.alpha)
    }
}

/// Kind of a primitive, in the order layers are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Circle,
    Rectangle,
    Line,
}

impl ShapeKind {
    /// Dispatch order used when rendering a layer.
    pub const DRAW_ORDER: [ShapeKind; 3] = [ShapeKind::Circle, ShapeKind::Rectangle, ShapeKind::Line];
}

/// Any primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle(Circle),
    Rectangle(Rectangle),
    Line(Line),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Circle(_) => ShapeKind::Circle,
            Shape::Rectangle(_) => ShapeKind::Rectangle,
            Shape::Line(_) => ShapeKind::Line,
        }
    }
}

impl From<Circle> for Shape {
    fn from(circle: Circle) -> Self {
        Shape::Circle(circle)
    }
}

impl From<Rectangle> for Shape {
    fn from(rect: Rectangle) -> Self {
        Shape::Rectangle(rect)
    }
}

impl From<Line> for Shape {
    fn from(line: Line) -> Self {
        Shape::Line(line)
    }
}
