//! CLI error types and exit codes

use offboard_engine::EngineError;
use offboard_graph::{ErrorKind, GraphError};
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General or configuration error
/// - 2: Identity provider not configured or access denied
/// - 3: Upstream (identity provider) error
/// - 4: Validation error
/// - 5: Remediation finished with failed operations
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity provider integration is not configured.")]
    NotConfigured,

    #[error("Access denied by the identity provider: {0}")]
    AccessDenied(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Discovery failed for {principal}: {reason}")]
    Discovery { principal: String, reason: String },

    #[error("Remediation incomplete: {failed} of {total} operations failed")]
    RemediationIncomplete { failed: usize, total: usize },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 1,
            CliError::NotConfigured | CliError::AccessDenied(_) => 2,
            CliError::Upstream(_) | CliError::Discovery { .. } => 3,
            CliError::Validation(_) => 4,
            CliError::RemediationIncomplete { .. } => 5,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {suggestion}");
            } else {
                eprintln!("\nSuggestion: {suggestion}");
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::NotConfigured => Some(
                "Set OFFBOARD_TENANT_ID, OFFBOARD_CLIENT_ID and OFFBOARD_CLIENT_SECRET (or add them to .env).",
            ),
            CliError::AccessDenied(_) => {
                Some("Grant the listed application permission to the app registration and consent for the tenant.")
            }
            CliError::RemediationIncomplete { .. } => {
                Some("Re-run the same command; completed operations are idempotent.")
            }
            _ => None,
        }
    }
}

impl From<GraphError> for CliError {
    fn from(e: GraphError) -> Self {
        match e.kind() {
            ErrorKind::Configuration => CliError::Config(e.to_string()),
            ErrorKind::PermissionDenied | ErrorKind::Unauthorized => {
                CliError::AccessDenied(e.to_string())
            }
            _ => CliError::Upstream(e.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config(e) => CliError::Config(e.to_string()),
            EngineError::Graph(e) => e.into(),
            EngineError::InvalidScope(_) => CliError::Validation(e.to_string()),
            other => CliError::Upstream(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("JSON error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::NotConfigured.exit_code(), 2);
        assert_eq!(CliError::Validation("x".into()).exit_code(), 4);
        assert_eq!(
            CliError::RemediationIncomplete { failed: 1, total: 3 }.exit_code(),
            5
        );
    }

    #[test]
    fn test_graph_error_mapping() {
        let err: CliError = GraphError::Config("bad".into()).into();
        assert!(matches!(err, CliError::Config(_)));

        let err: CliError = GraphError::Transient {
            operation: "list_user_oauth_grants",
            status: 503,
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }
}
