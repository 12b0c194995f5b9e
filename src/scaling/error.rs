//! Errors raised by the rescale pipeline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::error::ECSError;

/// Convenience alias for pipeline operations.
pub type ScalingResult<T> = Result<T, ScalingError>;

/// Failures of the rescale pipeline and its inputs.
#[derive(Debug, Error)]
pub enum ScalingError {
    /// The environment reported a non-positive viewport dimension.
    #[error("invalid viewport {width}x{height}: dimensions must be positive")]
    InvalidViewport {
        /// Reported width.
        width: i32,
        /// Reported height.
        height: i32,
    },

    /// A reference resolution was not finite and positive.
    #[error("invalid reference resolution {width}x{height}")]
    InvalidReference {
        /// Authored width.
        width: f32,
        /// Authored height.
        height: f32,
    },

    /// An axis blend weight fell outside `[0, 1]`.
    #[error("axis blend weight {0} is outside [0, 1]")]
    InvalidWeight(f32),

    /// Configuration could not be applied.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Record store or scheduling failure.
    #[error(transparent)]
    Engine(#[from] ECSError),
}

impl ScalingError {
    /// Returns `true` if this error reports a broken stage ordering contract.
    pub fn is_ordering_violation(&self) -> bool {
        matches!(self, ScalingError::Engine(e) if e.is_ordering_violation())
    }
}
