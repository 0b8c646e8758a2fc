//! primview Core Data Structures
//!
//! This crate contains the data the 2D primitive renderer consumes:
//! - Primitives: circles, rectangles and colored line segments
//! - PrimitiveSlice: one frame layer, grouped by primitive kind
//! - Frame: ordered layers built by the application each frame
//! - Camera: source of the projection-view matrix

pub mod camera;
pub mod frame;
pub mod primitives;

pub use camera::*;
pub use frame::*;
pub use primitives::*;
