//! The four programs used by the renderer.

use crate::backend::{DeviceError, GpuDevice, MATRIX_BLOCK, Program, UniformValue};
use crate::config::{ProgramSources, ShaderSources};

/// Texture unit sampled by the circle and textured programs.
pub const SAMPLER_UNIT: i32 = 0;

/// Flat-color, circle, line and textured programs, each wired to the
/// shared matrix block at construction.
#[derive(Debug)]
pub struct ShaderSet {
    pub color: Program,
    pub circle: Program,
    pub lines: Program,
    pub textured: Program,
}

impl ShaderSet {
    /// Compiles all four programs.
    ///
    /// Programs compiled before a failure are released again, so an error
    /// leaves nothing behind on the device.
    pub fn compile<D: GpuDevice>(device: &mut D, sources: &ShaderSources) -> Result<Self, DeviceError> {
        let color = compile_one(device, &sources.color)?;
        let circle = match compile_one(device, &sources.circle) {
            Ok(program) => program,
            Err(err) => return Err(release_all(device, [color], err)),
        };
        let lines = match compile_one(device, &sources.lines) {
            Ok(program) => program,
            Err(err) => return Err(release_all(device, [color, circle], err)),
        };
        let textured = match compile_one(device, &sources.textured) {
            Ok(program) => program,
            Err(err) => return Err(release_all(device, [color, circle, lines], err)),
        };

        Ok(Self {
            color,
            circle,
            lines,
            textured,
        })
    }

    /// Fixes sampler units and connects every program's matrix block to `slot`.
    pub fn bind<D: GpuDevice>(&self, device: &mut D, slot: u32) -> Result<(), DeviceError> {
        for program in [&self.circle, &self.textured] {
            device.set_uniform(program, "tex_smp", UniformValue::Int(SAMPLER_UNIT))?;
        }
        for program in self.programs() {
            device.bind_uniform_block(program, MATRIX_BLOCK, slot)?;
        }
        Ok(())
    }

    pub fn programs(&self) -> [&Program; 4] {
        [&self.color, &self.circle, &self.lines, &self.textured]
    }

    pub fn release<D: GpuDevice>(self, device: &mut D) {
        device.release_program(self.color);
        device.release_program(self.circle);
        device.release_program(self.lines);
        device.release_program(self.textured);
    }
}

fn compile_one<D: GpuDevice>(device: &mut D, sources: &ProgramSources) -> Result<Program, DeviceError> {
    tracing::debug!(vertex = %sources.vertex, fragment = %sources.fragment, "Compiling program");
    device.compile_program(&sources.vertex, &sources.fragment)
}

/// Releases `programs` and hands `err` back.
fn release_all<D: GpuDevice, const N: usize>(
    device: &mut D,
    programs: [Program; N],
    err: DeviceError,
) -> DeviceError {
    for program in programs {
        device.release_program(program);
    }
    err
}
