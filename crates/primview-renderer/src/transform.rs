//! Shared projection-view uniform buffer.

use glam::Mat4;
use primview_core::Camera;

use crate::backend::{Buffer, DeviceError, GpuDevice};

/// Owns the uniform buffer every program reads its `MatrixBlock` from.
#[derive(Debug)]
pub struct FrameTransform {
    buffer: Buffer,
    slot: u32,
}

impl FrameTransform {
    /// Creates the buffer, fills it with identity and attaches it to `slot`.
    pub fn new<D: GpuDevice>(device: &mut D, slot: u32) -> Result<Self, DeviceError> {
        let buffer = device.create_buffer()?;
        write_matrix(device, &buffer, Mat4::IDENTITY)?;
        device.bind_uniform_buffer(slot, &buffer)?;
        Ok(Self { buffer, slot })
    }

    /// Writes the camera's projection-view matrix. Draws issued afterwards see it.
    pub fn update<D: GpuDevice>(
        &self,
        device: &mut D,
        camera: &impl Camera,
    ) -> Result<(), DeviceError> {
        write_matrix(device, &self.buffer, camera.proj_view())
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn release<D: GpuDevice>(self, device: &mut D) {
        device.release_buffer(self.buffer);
    }
}

fn write_matrix<D: GpuDevice>(device: &mut D, buffer: &Buffer, matrix: Mat4) -> Result<(), DeviceError> {
    let cols = matrix.to_cols_array();
    device.upload_uniform(buffer, bytemuck::cast_slice(&cols))
}
