//! Uniform values and the per-draw uniform table shared by all programs.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::DeviceError;

/// Name of the uniform block holding the projection-view matrix.
pub const MATRIX_BLOCK: &str = "MatrixBlock";

/// Size in bytes of the matrix block (one column-major `mat4`).
pub const MATRIX_BLOCK_SIZE: usize = std::mem::size_of::<[[f32; 4]; 4]>();

/// A value assigned to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }
}

/// Type tag of a [`UniformValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

/// Per-draw uniforms, laid out to match the `Locals` struct of the
/// built-in WGSL shaders (112 bytes).
///
///  offset   0  model     mat4x4<f32>
///  offset  64  color     vec4<f32>
///  offset  80  center    vec3<f32>
///  offset  92  radius2   f32
///  offset  96  textured  i32
///  offset 100  tex_smp   i32
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub center: [f32; 3],
    pub radius2: f32,
    pub textured: i32,
    pub tex_smp: i32,
    pub _pad: [i32; 2],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            color: [1.0; 4],
            center: [0.0; 3],
            radius2: 0.0,
            textured: 0,
            tex_smp: 0,
            _pad: [0; 2],
        }
    }
}

impl DrawUniforms {
    /// Names accepted by [`DrawUniforms::set`], with their types.
    pub const FIELDS: [(&'static str, UniformKind); 6] = [
        ("model", UniformKind::Mat4),
        ("color", UniformKind::Vec4),
        ("center", UniformKind::Vec3),
        ("radius2", UniformKind::Float),
        ("textured", UniformKind::Int),
        ("tex_smp", UniformKind::Int),
    ];

    /// Looks up the declared type of a uniform.
    pub fn kind_of(name: &str) -> Option<UniformKind> {
        Self::FIELDS
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, kind)| *kind)
    }

    /// Assigns a named uniform, rejecting unknown names and type mismatches.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), DeviceError> {
        match (name, value) {
            ("model", UniformValue::Mat4(m)) => self.model = m.to_cols_array_2d(),
            ("color", UniformValue::Vec4(v)) => self.color = v.to_array(),
            ("center", UniformValue::Vec3(v)) => self.center = v.to_array(),
            ("radius2", UniformValue::Float(f)) => self.radius2 = f,
            ("textured", UniformValue::Int(i)) => self.textured = i,
            ("tex_smp", UniformValue::Int(i)) => self.tex_smp = i,
            _ => {
                return Err(match Self::kind_of(name) {
                    Some(expected) => DeviceError::UniformTypeMismatch {
                        name: name.to_string(),
                        expected,
                        actual: value.kind(),
                    },
                    None => DeviceError::UnknownUniform(name.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Reads a named uniform back.
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        match name {
            "model" => Some(UniformValue::Mat4(self.model())),
            "color" => Some(UniformValue::Vec4(Vec4::from_array(self.color))),
            "center" => Some(UniformValue::Vec3(Vec3::from_array(self.center))),
            "radius2" => Some(UniformValue::Float(self.radius2)),
            "textured" => Some(UniformValue::Int(self.textured)),
            "tex_smp" => Some(UniformValue::Int(self.tex_smp)),
            _ => None,
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}
