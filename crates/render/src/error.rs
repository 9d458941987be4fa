use crate::gpu::ShaderId;

/// Errors surfaced by the render core.
///
/// Precondition violations (mismatched attribute lengths, out-of-range
/// encodes, writes past a buffer's allocation) are programming errors and
/// panic instead of appearing here.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("GPU buffer allocation failed: {0}")]
    BufferAllocation(String),
    #[error("shader {0:?} is not registered")]
    UnknownShader(ShaderId),
}

/// Errors from loading render configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
