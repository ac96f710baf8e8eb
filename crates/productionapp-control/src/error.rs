//! Error types for productionapp-control.

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by an automation engine.
///
/// The first three variants are the distinguished conditions the
/// orchestrator interprets; the rest are passed through as failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A stack with this name already exists in the project.
    #[error("stack '{0}' already exists")]
    StackAlreadyExists(String),

    /// Another update is already running against this stack.
    #[error("stack '{0}' already has an update in progress")]
    ConcurrentUpdate(String),

    /// No stack with this name exists in the project.
    #[error("no stack named '{0}' found")]
    StackNotFound(String),

    /// The engine command exited unsuccessfully.
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Process exit code (-1 if killed by a signal).
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// I/O error talking to the engine.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine produced output that could not be understood.
    #[error("unexpected engine output: {0}")]
    Protocol(String),

    /// Any other engine failure.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Create a generic engine error.
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Errors that can occur in the control service.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Malformed deployment descriptor, rejected before any engine call.
    #[error("invalid deployment: {0}")]
    Validation(String),

    /// A deployment with this name is already live.
    #[error("deployment '{0}' already exists, pick a unique name")]
    AlreadyExists(String),

    /// Another operation is already mutating this deployment.
    #[error("deployment '{0}' already has an update in progress")]
    ConcurrentConflict(String),

    /// Resources were destroyed but the stack record could not be removed.
    #[error("deployment '{name}' was destroyed but its stack record could not be removed: {message}")]
    PartialTeardown {
        /// Deployment name.
        name: String,
        /// Error reported while removing the record.
        message: String,
    },

    /// Any other engine failure.
    #[error(transparent)]
    Engine(EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<EngineError> for ControlError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::StackAlreadyExists(name) => Self::AlreadyExists(name),
            EngineError::ConcurrentUpdate(name) => Self::ConcurrentConflict(name),
            other => Self::Engine(other),
        }
    }
}
