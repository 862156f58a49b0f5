//! CLI error types and conversions

use super::validate::ValidationError;
use crate::pipeline::PipelineError;
use crate::platform::PlatformError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Validation error
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Platform error
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Pipeline error
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
