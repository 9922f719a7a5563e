//! Engine error types.

use offboard_graph::GraphError;

/// Errors raised by the engine and the orchestration layer.
///
/// Discovery and remediation never return these for upstream failures;
/// those become [`SourceError`](crate::SourceError)s and failed
/// [`RemediationOutcome`](crate::RemediationOutcome)s instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("case not found: {0}")]
    CaseNotFound(String),

    #[error("employee not found: {0}")]
    EmployeeNotFound(String),

    #[error("employee {0} has no email on record")]
    MissingPrincipal(String),

    #[error("invalid revoke scope: {0}")]
    InvalidScope(String),

    #[error("case provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
