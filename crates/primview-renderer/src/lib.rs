//! primview Renderer
//!
//! Immediate-mode 2D renderer for circles, rectangles, colored line
//! segments, a background plane and a grid overlay.
//!
//! # Architecture
//!
//! - [`backend::GpuDevice`] - Resource factory and shader compiler the renderer drives
//! - [`backend::HeadlessDevice`] - In-memory device for tests and command inspection
//! - `backend::WgpuDevice` - wgpu backend (feature `wgpu`)
//! - [`PrimitiveRenderer`] - Dispatches primitives to programs and draws
//! - [`RendererConfig`] - Construction settings, loadable from RON
//!
//! Resources built lazily (grid mesh, line vertex layout) are created once
//! and kept until [`PrimitiveRenderer::release`].

pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod lines;
pub mod renderer;
pub mod shaders;
pub mod transform;

pub use backend::{DeviceError, GpuDevice, HeadlessDevice, ShaderLibrary};
#[cfg(feature = "wgpu")]
pub use backend::WgpuDevice;
pub use config::{ProgramSources, RendererConfig, ShaderSources};
pub use error::RendererError;
pub use renderer::*;

pub use primview_core as core;
