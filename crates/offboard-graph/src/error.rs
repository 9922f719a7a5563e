//! Error types for the Graph client.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using `GraphError`.
pub type GraphResult<T> = Result<T, GraphError>;

/// Upstream error codes that mean "your tenant is not licensed for this",
/// rather than "your app lacks a permission".
const LICENSE_GATED_CODES: &[&str] = &[
    "Authentication_RequestFromNonPremiumTenantOrB2CTenant",
    "Authentication_RequestFromUnsupportedUserRole",
    "Authorization_RequestDenied_LicenseRequired",
];

/// Coarse classification of a [`GraphError`], used by callers that only
/// need to decide between "retry", "treat as gone" and "report".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Unauthorized,
    RateLimited,
    Transient,
    UpstreamUnavailable,
    Configuration,
    Unknown,
}

/// Errors that can occur when talking to the identity provider.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OAuth2` client-credentials authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Subject, grant, assignment or app does not exist upstream.
    #[error("{operation}: resource not found ({code})")]
    NotFound { operation: &'static str, code: String },

    /// The app registration lacks the API permission needed for the operation.
    #[error("{operation}: permission denied ({code}): {message}; requires {permission}")]
    PermissionDenied {
        operation: &'static str,
        permission: &'static str,
        code: String,
        message: String,
    },

    /// Access token rejected.
    #[error("{operation}: unauthorized: {message}")]
    Unauthorized {
        operation: &'static str,
        message: String,
    },

    /// Throttled and retries exhausted.
    #[error("{operation}: rate limited after {attempts} attempts")]
    RateLimited {
        operation: &'static str,
        attempts: u32,
        retry_after_secs: Option<u64>,
    },

    /// Gateway or availability failure that outlived the retry budget.
    #[error("{operation}: transient upstream failure (HTTP {status})")]
    Transient { operation: &'static str, status: u16 },

    /// Feature gated by tenant tier or licence (e.g. sign-in logs).
    #[error("{operation}: upstream unavailable ({code}): {message}")]
    UpstreamUnavailable {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// Anything else, with enough context to diagnose.
    #[error("{operation}: Graph API error (HTTP {status}, {code}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
    #[serde(rename = "innerError")]
    pub inner_error: Option<serde_json::Value>,
}

impl GraphError {
    /// Builds a typed error from a non-success upstream response.
    pub fn from_response(operation: &'static str, status: StatusCode, body: &str) -> Self {
        let (code, message) = match serde_json::from_str::<ODataError>(body) {
            Ok(odata) => (odata.error.code, odata.error.message),
            Err(_) => (
                status.canonical_reason().unwrap_or("Unknown").to_string(),
                body.to_string(),
            ),
        };

        match status {
            StatusCode::NOT_FOUND => Self::NotFound { operation, code },
            StatusCode::UNAUTHORIZED => Self::Unauthorized { operation, message },
            StatusCode::FORBIDDEN if LICENSE_GATED_CODES.contains(&code.as_str()) => {
                Self::UpstreamUnavailable {
                    operation,
                    code,
                    message,
                }
            }
            StatusCode::FORBIDDEN => Self::PermissionDenied {
                operation,
                permission: required_permission(operation),
                code,
                message,
            },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited {
                operation,
                attempts: 0,
                retry_after_secs: None,
            },
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Self::Transient {
                operation,
                status: status.as_u16(),
            },
            _ => Self::Api {
                operation,
                status: status.as_u16(),
                code,
                message,
            },
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Unauthorized { .. } | Self::Auth(_) => ErrorKind::Unauthorized,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Http(e) if e.is_timeout() || e.is_connect() => ErrorKind::Transient,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Http(_) | Self::Json(_) | Self::Url(_) | Self::Api { .. } => ErrorKind::Unknown,
        }
    }

    /// Returns true if the resource is already gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if a caller may retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// HTTP status associated with the error, when there is one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Unauthorized { .. } => Some(401),
            Self::PermissionDenied { .. } | Self::UpstreamUnavailable { .. } => Some(403),
            Self::RateLimited { .. } => Some(429),
            Self::Transient { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Least-privilege Graph permission each operation needs.
#[must_use]
pub fn required_permission(operation: &'static str) -> &'static str {
    match operation {
        "get_user_by_principal" => "User.Read.All",
        "list_user_oauth_grants" => "DelegatedPermissionGrant.Read.All",
        "delete_oauth_grant" | "update_oauth_grant_scopes" => {
            "DelegatedPermissionGrant.ReadWrite.All"
        }
        "list_user_app_role_assignments" => "AppRoleAssignment.Read.All",
        "delete_app_role_assignment" => "AppRoleAssignment.ReadWrite.All",
        "list_sign_ins" => "AuditLog.Read.All",
        "list_registered_devices" => "Device.Read.All",
        "get_service_principal" | "get_service_principal_by_app_id" => "Application.Read.All",
        "revoke_sign_in_sessions" => "User.RevokeSessions.All",
        _ => "Directory.Read.All",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_error_parsing() {
        let json = r#"{
            "error": {
                "code": "Request_ResourceNotFound",
                "message": "Resource not found",
                "innerError": {"date": "2024-01-15"}
            }
        }"#;

        let error: ODataError = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.code, "Request_ResourceNotFound");
        assert_eq!(error.error.message, "Resource not found");
        assert!(error.error.inner_error.is_some());
    }

    #[test]
    fn test_not_found_classification() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"gone"}}"#;
        let err = GraphError::from_response("delete_oauth_grant", StatusCode::NOT_FOUND, body);
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_forbidden_carries_required_permission() {
        let body = r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges"}}"#;
        let err =
            GraphError::from_response("delete_oauth_grant", StatusCode::FORBIDDEN, body);
        match err {
            GraphError::PermissionDenied {
                operation,
                permission,
                code,
                ..
            } => {
                assert_eq!(operation, "delete_oauth_grant");
                assert_eq!(permission, "DelegatedPermissionGrant.ReadWrite.All");
                assert_eq!(code, "Authorization_RequestDenied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_license_gating_is_upstream_unavailable() {
        let body = r#"{"error":{"code":"Authentication_RequestFromNonPremiumTenantOrB2CTenant","message":"Premium license required"}}"#;
        let err = GraphError::from_response("list_sign_ins", StatusCode::FORBIDDEN, body);
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_error_keeps_context() {
        let err = GraphError::from_response(
            "revoke_sign_in_sessions",
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom",
        );
        let text = err.to_string();
        assert!(text.contains("revoke_sign_in_sessions"));
        assert!(text.contains("500"));
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_gateway_errors_are_retryable() {
        let err =
            GraphError::from_response("list_sign_ins", StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
    }
}
