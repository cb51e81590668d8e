use thiserror::Error;

/// Failure kinds surfaced by the execution engine.
///
/// Each variant maps to a distinct client signal in the HTTP adapter, so
/// the adapter can translate without string matching.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}")]
    Validation(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("server is busy, please try again later")]
    QueueFull,

    #[error("request cancelled before completion")]
    Cancelled,

    #[error("sandbox runtime not available: {0}")]
    SandboxUnavailable(String),

    #[error("workspace failure: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("failed to launch sandbox: {0}")]
    SandboxLaunch(String),

    #[error("execution timed out")]
    Timeout,

    #[error("execution failed with non-zero exit")]
    RuntimeFailure,

    #[error("container metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("internal execution error: {0}")]
    Internal(String),
}
