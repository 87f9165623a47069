//! Error handling for the render optimizer

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Errors surfaced by configuration and lifecycle operations.
///
/// Per-frame work never returns these: culling, sampling, telemetry and task
/// failures are logged and absorbed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerError {
    #[error("Invalid level table: {message}")]
    InvalidLevels { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Optimizer has been destroyed")]
    Destroyed,
}

impl OptimizerError {
    pub fn invalid_levels<S: Into<String>>(message: S) -> Self {
        Self::InvalidLevels { message: message.into() }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig { message: message.into() }
    }
}
