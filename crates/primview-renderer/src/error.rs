//! Renderer error types.

use crate::backend::DeviceError;

/// Errors surfaced by [`PrimitiveRenderer`](crate::PrimitiveRenderer) and its configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RendererError {
    /// Construction failed; no renderer was produced.
    #[error("Renderer initialization failed while trying to {stage}: {source}")]
    Init {
        stage: &'static str,
        #[source]
        source: DeviceError,
    },

    /// A device call failed while drawing.
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Invalid renderer configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl RendererError {
    pub(crate) fn init(stage: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| RendererError::Init { stage, source }
    }
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error_message() {
        let err = RendererError::init("compile shaders")(DeviceError::UnknownShaderSource(
            "circle.frag".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Renderer initialization failed while trying to compile shaders: Unknown shader source: circle.frag"
        );
    }

    #[test]
    fn test_device_error_converts() {
        let err: RendererError = DeviceError::NoProgramBound.into();
        assert_eq!(err, RendererError::Device(DeviceError::NoProgramBound));
    }
}
