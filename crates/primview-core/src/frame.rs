//! Per-frame primitive containers.

use serde::{Deserialize, Serialize};

use crate::primitives::{Circle, Line, Rectangle, Shape};

/// Primitives of one frame layer, grouped by kind.
///
/// Order inside each sequence is draw order: later primitives of the same
/// kind are drawn on top of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveSlice {
    #[serde(default)]
    pub circles: Vec<Circle>,
    #[serde(default)]
    pub rectangles: Vec<Rectangle>,
    #[serde(default)]
    pub lines: Vec<Line>,
}

impl PrimitiveSlice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a shape to the sequence of its kind.
    pub fn push(&mut self, shape: impl Into<Shape>) {
        match shape.into() {
            Shape::Circle(c) => self.circles.push(c),
            Shape::Rectangle(r) => self.rectangles.push(r),
            Shape::Line(l) => self.lines.push(l),
        }
    }

    /// Total number of primitives.
    pub fn len(&self) -> usize {
        self.circles.len() + self.rectangles.len() + self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all sequences, keeping their capacity.
    pub fn clear(&mut self) {
        self.circles.clear();
        self.rectangles.clear();
        self.lines.clear();
    }

    /// Iterates shapes in dispatch order: circles, rectangles, then lines.
    pub fn shapes(&self) -> impl Iterator<Item = Shape> + '_ {
        self.circles
            .iter()
            .copied()
            .map(Shape::Circle)
            .chain(self.rectangles.iter().copied().map(Shape::Rectangle))
            .chain(self.lines.iter().copied().map(Shape::Line))
    }
}

impl<S: Into<Shape>> Extend<S> for PrimitiveSlice {
    fn extend<T: IntoIterator<Item = S>>(&mut self, iter: T) {
        for shape in iter {
            self.push(shape);
        }
    }
}

impl<S: Into<Shape>> FromIterator<S> for PrimitiveSlice {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut slice = Self::new();
        slice.extend(iter);
        slice
    }
}

/// A frame made of ordered layers; later layers draw on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub layers: Vec<PrimitiveSlice>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the layer at `index`, creating empty layers up to it.
    pub fn layer_mut(&mut self, index: usize) -> &mut PrimitiveSlice {
        if self.layers.len() <= index {
            self.layers.resize_with(index + 1, PrimitiveSlice::default);
        }
        &mut self.layers[index]
    }

    pub fn layers(&self) -> &[PrimitiveSlice] {
        &self.layers
    }

    /// Total number of primitives across layers.
    pub fn primitive_count(&self) -> usize {
        self.layers.iter().map(PrimitiveSlice::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ShapeKind;
    use glam::{Vec2, Vec3, Vec4};

    #[test]
    fn test_push_routes_by_kind() {
        let mut slice = PrimitiveSlice::new();
        slice.push(Line::solid(Vec2::ZERO, Vec2::X, Vec3::ONE, 1.0));
        slice.push(Circle::new(Vec2::ZERO, 1.0, Vec4::ONE));
        slice.push(Rectangle::new(Vec2::ZERO, 1.0, 1.0, Vec4::ONE));
        slice.push(Circle::new(Vec2::ONE, 2.0, Vec4::ONE));

        assert_eq!(slice.circles.len(), 2);
        assert_eq!(slice.rectangles.len(), 1);
        assert_eq!(slice.lines.len(), 1);
        assert_eq!(slice.circles[1].radius, 2.0);
    }

    #[test]
    fn test_shapes_in_dispatch_order() {
        let slice: PrimitiveSlice = [
            Shape::Line(Line::solid(Vec2::ZERO, Vec2::X, Vec3::ONE, 1.0)),
            Shape::Rectangle(Rectangle::new(Vec2::ZERO, 1.0, 1.0, Vec4::ONE)),
            Shape::Circle(Circle::new(Vec2::ZERO, 1.0, Vec4::ONE)),
        ]
        .into_iter()
        .collect();

        let kinds: Vec<ShapeKind> = slice.shapes().map(|s| s.kind()).collect();
        assert_eq!(kinds, ShapeKind::DRAW_ORDER.to_vec());
    }

    #[test]
    fn test_frame_layer_mut_grows() {
        let mut frame = Frame::new();
        frame
            .layer_mut(2)
            .push(Circle::new(Vec2::ZERO, 1.0, Vec4::ONE));

        assert_eq!(frame.layers().len(), 3);
        assert!(frame.layers()[0].is_empty());
        assert_eq!(frame.primitive_count(), 1);
    }
}
