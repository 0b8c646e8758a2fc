//! Renderer configuration, stored as RON.

use std::path::Path;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::error::{RendererError, Result};

/// Vertex and fragment source ids of one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSources {
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Source ids for the four programs of the shader set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSources {
    /// Flat color (rectangles, background, grid)
    pub color: ProgramSources,
    /// Signed-distance circle
    pub circle: ProgramSources,
    /// Per-vertex color lines
    pub lines: ProgramSources,
    pub textured: ProgramSources,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            color: ProgramSources::new("simple.vert", "uniform_color.frag"),
            circle: ProgramSources::new("circle.vert", "circle.frag"),
            lines: ProgramSources::new("lines.vert", "lines.frag"),
            textured: ProgramSources::new("simple.vert", "textured.frag"),
        }
    }
}

/// Construction-time settings of a [`PrimitiveRenderer`](crate::PrimitiveRenderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// World-space size of the drawing area covered by background and grid
    pub area_size: UVec2,
    /// Grid subdivisions along x and y
    pub grid_cells: [u16; 2],
    /// Binding slot shared by the matrix uniform buffer and every program's matrix block
    pub uniform_block_slot: u32,
    pub shaders: ShaderSources,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            area_size: UVec2::new(800, 600),
            grid_cells: [10, 10],
            uniform_block_slot: 0,
            shaders: ShaderSources::default(),
        }
    }
}

impl RendererConfig {
    pub fn with_area_size(mut self, area_size: UVec2) -> Self {
        self.area_size = area_size;
        self
    }

    pub fn with_grid_cells(mut self, cells_x: u16, cells_y: u16) -> Self {
        self.grid_cells = [cells_x, cells_y];
        self
    }

    pub fn with_uniform_block_slot(mut self, slot: u32) -> Self {
        self.uniform_block_slot = slot;
        self
    }

    /// Parses a RON document. Missing fields keep their defaults.
    pub fn from_ron_str(content: &str) -> Result<Self> {
        ron::from_str(content).map_err(|e| RendererError::Config(e.to_string()))
    }

    /// Loads a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| RendererError::Io(e.to_string()))?;
        let config = Self::from_ron_str(&content)?;
        tracing::info!("Loaded renderer config from {:?}", path);
        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| RendererError::Config(e.to_string()))
    }
}
