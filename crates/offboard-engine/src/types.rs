//! Domain types shared by discovery, remediation and orchestration.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use offboard_graph::{ErrorKind, GraphError, GraphUser};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directory user, resolved fresh for every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Object id in the identity provider.
    pub provider_id: String,
    pub display_name: Option<String>,
    pub principal_name: String,
    pub enabled: bool,
}

impl From<GraphUser> for Identity {
    fn from(user: GraphUser) -> Self {
        let enabled = user.is_enabled();
        Self {
            provider_id: user.id,
            display_name: user.display_name,
            principal_name: user.user_principal_name,
            enabled,
        }
    }
}

/// The mechanism through which access lingers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    OAuthGrant,
    AppRoleAssignment,
    Session,
    RegisteredDevice,
}

/// How the access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentKind {
    /// Admin consent on behalf of every user in the tenant.
    AllPrincipals,
    /// The user consented for themselves.
    Principal,
    RoleAssignment,
    SignIn,
    Device,
}

/// Risk classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    #[default]
    Active,
    Revoked,
    Deleted,
}

/// One lingering access mechanism held by a subject.
///
/// Only discovery creates these. Afterwards only `status` changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessArtifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub subject_id: String,
    pub app_id: String,
    pub app_display_name: String,
    /// Ordered, no duplicates.
    pub scopes: Vec<String>,
    pub consent_kind: ConsentKind,
    pub risk_level: RiskLevel,
    pub status: ArtifactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AccessArtifact {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ArtifactStatus::Active
    }

    /// Marks the artifact revoked. Revoking twice is a no-op.
    pub fn mark_revoked(&mut self) {
        if self.status == ArtifactStatus::Active {
            self.status = ArtifactStatus::Revoked;
        }
    }

    pub fn mark_deleted(&mut self) {
        self.status = ArtifactStatus::Deleted;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingType {
    LingeringOAuthGrant,
    /// Lingering application service principal access (app-role assignment).
    #[serde(rename = "LingeringASP")]
    LingeringAsp,
    PostOffboardLogin,
    PostOffboardSuspiciousLogin,
    /// Raised by other scanners; never by this engine.
    #[serde(rename = "AdminMFAWeak")]
    AdminMfaWeak,
    /// Raised by other scanners; never by this engine.
    #[serde(rename = "DWDHighRisk")]
    DwdHighRisk,
    OffboardingNotEnforced,
}

impl fmt::Display for FindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LingeringOAuthGrant => "LingeringOAuthGrant",
            Self::LingeringAsp => "LingeringASP",
            Self::PostOffboardLogin => "PostOffboardLogin",
            Self::PostOffboardSuspiciousLogin => "PostOffboardSuspiciousLogin",
            Self::AdminMfaWeak => "AdminMFAWeak",
            Self::DwdHighRisk => "DWDHighRisk",
            Self::OffboardingNotEnforced => "OffboardingNotEnforced",
        };
        f.write_str(name)
    }
}

/// A risk observation derived at discovery time. Closed, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_ref: Option<String>,
    pub subject_id: String,
    pub summary: String,
    /// Artifacts that gave rise to the finding.
    #[serde(default)]
    pub artifact_ids: Vec<String>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Finding {
    #[must_use]
    pub fn new(
        finding_type: FindingType,
        severity: RiskLevel,
        subject_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            finding_type,
            severity,
            case_ref: None,
            subject_id: subject_id.into(),
            summary: summary.into(),
            artifact_ids: Vec::new(),
            detected_at: Utc::now(),
            closed_at: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Closes the finding. Closing an already closed finding keeps the
    /// original timestamp.
    pub fn close(&mut self, at: DateTime<Utc>) {
        if self.closed_at.is_none() {
            self.closed_at = Some(at);
        }
    }
}

/// Result of one externally invoked operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub action: String,
    pub success: bool,
    #[serde(default)]
    pub detail: BTreeMap<String, serde_json::Value>,
}

impl RemediationOutcome {
    #[must_use]
    pub fn succeeded(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: true,
            detail: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn failed(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: false,
            detail: BTreeMap::from([("error".to_string(), error.into().into())]),
        }
    }

    /// Failure carrying the upstream error classification and, for
    /// permission errors, the missing permission.
    #[must_use]
    pub fn from_graph_error(action: impl Into<String>, error: &GraphError) -> Self {
        let mut outcome = Self::failed(action, error.to_string())
            .with("error_kind", serde_json::to_value(error.kind()).unwrap_or_default());
        if let GraphError::PermissionDenied { permission, .. } = error {
            outcome = outcome.with("required_permission", *permission);
        }
        outcome
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// Aggregate of the outcomes of one remediation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleResult {
    /// True when every outcome succeeded.
    pub success: bool,
    pub action: String,
    pub outcomes: Vec<RemediationOutcome>,
}

impl BundleResult {
    #[must_use]
    pub fn from_outcomes(action: impl Into<String>, outcomes: Vec<RemediationOutcome>) -> Self {
        Self {
            success: outcomes.iter().all(|o| o.success),
            action: action.into(),
            outcomes,
        }
    }

    /// Concatenates bundles in order under a new action name.
    #[must_use]
    pub fn merge(action: impl Into<String>, bundles: Vec<BundleResult>) -> Self {
        let outcomes = bundles.into_iter().flat_map(|b| b.outcomes).collect();
        Self::from_outcomes(action, outcomes)
    }

    /// Number of outcomes that succeeded.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Number of outcomes that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.succeeded_count()
    }
}

/// What a remediation bundle took away from the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Grants and app-role assignments confirmed gone.
    pub deleted_artifact_ids: Vec<String>,
    /// The identity provider confirmed session revocation.
    pub sessions_revoked: bool,
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    /// Reads the successful deletes and the confirmed session revocation
    /// out of a bundle. Skipped outcomes contribute nothing.
    #[must_use]
    pub fn from_bundle(bundle: &BundleResult, resolved_at: DateTime<Utc>) -> Self {
        let mut deleted_artifact_ids = Vec::new();
        let mut sessions_revoked = false;
        for outcome in bundle.outcomes.iter().filter(|o| o.success) {
            let id_key = match outcome.action.as_str() {
                "delete_oauth_grant" => "grant_id",
                "delete_app_role_assignment" => "assignment_id",
                "revoke_sign_in_sessions" => {
                    sessions_revoked |=
                        outcome.detail.get("confirmed") == Some(&serde_json::Value::Bool(true));
                    continue;
                }
                _ => continue,
            };
            if let Some(id) = outcome.detail.get(id_key).and_then(|v| v.as_str()) {
                deleted_artifact_ids.push(id.to_string());
            }
        }
        Self {
            deleted_artifact_ids,
            sessions_revoked,
            resolved_at,
        }
    }

    /// True when nothing was taken away.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted_artifact_ids.is_empty() && !self.sessions_revoked
    }
}

/// A sub-operation failure recorded instead of aborting the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    /// Which fetch failed, e.g. `oauth_grants`.
    pub source: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceError {
    #[must_use]
    pub fn from_graph(source: &str, error: &GraphError) -> Self {
        Self {
            source: source.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Value of a sub-operation that may have failed. On failure `value` is
/// the empty default and `error` says why.
#[derive(Debug, Clone, PartialEq)]
pub struct OpResult<T> {
    pub value: T,
    pub error: Option<SourceError>,
}

impl<T: Default> OpResult<T> {
    #[must_use]
    pub fn from_result(source: &str, result: Result<T, GraphError>) -> Self {
        match result {
            Ok(value) => Self { value, error: None },
            Err(e) => Self {
                value: T::default(),
                error: Some(SourceError::from_graph(source, &e)),
            },
        }
    }
}

impl<T> OpResult<T> {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
