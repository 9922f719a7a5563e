//! Orchestration over an external case store.
//!
//! [`OrchestratedCaseProvider`] wraps a [`CaseProvider`] (the system of
//! record for cases, employees and findings) and runs the matching live
//! identity-provider action before every mutating call. The live leg never
//! blocks the delegate: its failures are logged and reported in the
//! response, and the delegate is always invoked.
//!
//! When a live leg removes access, the case store is told through
//! [`CaseProvider::resolve_findings`] so the recorded scan can close the
//! findings that removal resolved.

mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::discovery::{DiscoveryContext, DiscoveryResult};
use crate::engine::OffboardingEngine;
use crate::error::{EngineError, EngineResult};
use crate::remediation::RemediationAction;
use crate::types::{BundleResult, RemediationOutcome, Resolution};

pub use memory::{InMemoryCaseProvider, ProviderCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response from the case store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ProviderResponse {
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            data: serde_json::Value::Null,
        }
    }
}

/// Offboarding case as held by the case store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub employee_id: String,
    pub status: String,
    /// Effective offboarding date.
    #[serde(default)]
    pub offboarding_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: String,
    /// Principal name in the identity provider.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// An employee's standing with one app, as tracked by the case store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUserRecord {
    pub employee_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_cases: usize,
    pub open_cases: usize,
    pub open_findings: usize,
    pub high_risk_findings: usize,
}

/// A remediation request against a case. The subject comes from the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseAction {
    RevokeGrant { grant_id: String },
    RevokeAllGrants,
    RevokeAppGrants { app_id: String },
    UpdateGrantScopes { grant_id: String, scopes: Vec<String> },
    RevokeSessions,
    RevokeAppRoleAssignments {
        #[serde(default)]
        app_id: Option<String>,
    },
    FullRemediation,
}

impl CaseAction {
    /// The live action when it names its own target, without needing the
    /// case subject.
    #[must_use]
    pub fn without_subject(&self) -> Option<RemediationAction> {
        match self {
            Self::RevokeGrant { grant_id } => Some(RemediationAction::RevokeOauthGrant {
                grant_id: grant_id.clone(),
            }),
            Self::UpdateGrantScopes { grant_id, scopes } => {
                Some(RemediationAction::UpdateGrantScopes {
                    grant_id: grant_id.clone(),
                    scopes: scopes.clone(),
                })
            }
            _ => None,
        }
    }

    /// The live action for the case subject.
    #[must_use]
    pub fn for_principal(&self, principal: &str) -> RemediationAction {
        let principal = principal.to_string();
        match self {
            Self::RevokeGrant { grant_id } => RemediationAction::RevokeOauthGrant {
                grant_id: grant_id.clone(),
            },
            Self::RevokeAllGrants => RemediationAction::RevokeAllOauthGrants { principal },
            Self::RevokeAppGrants { app_id } => RemediationAction::RevokeOauthGrantsForApp {
                principal,
                app_id: app_id.clone(),
            },
            Self::UpdateGrantScopes { grant_id, scopes } => RemediationAction::UpdateGrantScopes {
                grant_id: grant_id.clone(),
                scopes: scopes.clone(),
            },
            Self::RevokeSessions => RemediationAction::RevokeSignInSessions { principal },
            Self::RevokeAppRoleAssignments { app_id } => {
                RemediationAction::RevokeAppRoleAssignments {
                    principal,
                    app_id: app_id.clone(),
                }
            }
            Self::FullRemediation => RemediationAction::FullRemediation { principal },
        }
    }
}

/// Caller-supplied context forwarded to the case store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOptions {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What `revoke_employee_access` revokes: `all`, `grants`, `sessions` or
/// `app:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RevokeScope {
    All,
    Grants,
    Sessions,
    App(String),
}

impl FromStr for RevokeScope {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "grants" => Ok(Self::Grants),
            "sessions" => Ok(Self::Sessions),
            other => match other.strip_prefix("app:") {
                Some(id) if !id.trim().is_empty() => Ok(Self::App(id.trim().to_string())),
                _ => Err(EngineError::InvalidScope(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for RevokeScope {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RevokeScope> for String {
    fn from(scope: RevokeScope) -> Self {
        scope.to_string()
    }
}

impl fmt::Display for RevokeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Grants => write!(f, "grants"),
            Self::Sessions => write!(f, "sessions"),
            Self::App(id) => write!(f, "app:{id}"),
        }
    }
}

/// Live result for one user in a fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBundle {
    pub employee_id: String,
    pub principal: Option<String>,
    pub bundle: BundleResult,
}

/// The identity-provider leg of an orchestrated call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LiveLeg {
    Completed { bundle: BundleResult },
    Batch { bundles: Vec<UserBundle> },
    Scanned { result: DiscoveryResult },
    Failed { error: String },
}

impl LiveLeg {
    /// True when every live operation succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Completed { bundle } => bundle.success,
            Self::Batch { bundles } => bundles.iter().all(|b| b.bundle.success),
            Self::Scanned { result } => result.error.is_none(),
            Self::Failed { .. } => false,
        }
    }
}

/// Merged response: the delegate's status, its payload and the live leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratedResponse {
    pub status: ResponseStatus,
    pub delegate: ProviderResponse,
    pub live: LiveLeg,
    /// Case store replies to the findings resolved by the live leg, one
    /// per affected case.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolutions: Vec<ProviderResponse>,
}

impl OrchestratedResponse {
    fn merge(delegate: ProviderResponse, live: LiveLeg) -> Self {
        Self {
            status: delegate.status,
            delegate,
            live,
            resolutions: Vec::new(),
        }
    }

    fn with_resolutions(mut self, resolutions: Vec<ProviderResponse>) -> Self {
        self.resolutions = resolutions;
        self
    }
}

/// The external case store.
#[async_trait]
pub trait CaseProvider: Send + Sync {
    async fn get_case(&self, case_id: &str) -> EngineResult<Option<CaseRecord>>;

    async fn list_cases(&self) -> EngineResult<Vec<CaseRecord>>;

    async fn get_employee(&self, employee_id: &str) -> EngineResult<Option<EmployeeRecord>>;

    async fn get_dashboard_stats(&self) -> EngineResult<DashboardStats>;

    /// Users the store tracks for an app.
    async fn list_app_users(&self, app_id: &str) -> EngineResult<Vec<AppUserRecord>>;

    async fn execute_remediation(
        &self,
        case_id: &str,
        action: &CaseAction,
        options: &RemediationOptions,
    ) -> EngineResult<ProviderResponse>;

    async fn revoke_employee_access(
        &self,
        employee_id: &str,
        scope: &RevokeScope,
    ) -> EngineResult<ProviderResponse>;

    async fn global_app_removal(&self, app_id: &str, app_name: &str)
        -> EngineResult<ProviderResponse>;

    async fn revoke_app_for_users(
        &self,
        app_id: &str,
        user_ids: &[String],
    ) -> EngineResult<ProviderResponse>;

    /// Stores the outcome of a live scan against the case.
    async fn record_scan(
        &self,
        case_id: &str,
        result: &DiscoveryResult,
    ) -> EngineResult<ProviderResponse>;

    /// Applies access removed by a live remediation to the case's recorded
    /// scan, closing the findings it resolved.
    async fn resolve_findings(
        &self,
        case_id: &str,
        resolution: &Resolution,
    ) -> EngineResult<ProviderResponse>;
}

/// A [`CaseProvider`] that also acts on the identity provider.
///
/// App ids passed to the app-wide operations are identity-provider ids
/// (service principal object id or application id).
#[derive(Debug)]
pub struct OrchestratedCaseProvider<P: CaseProvider> {
    delegate: P,
    engine: Arc<OffboardingEngine>,
}

impl<P: CaseProvider> OrchestratedCaseProvider<P> {
    pub fn new(delegate: P, engine: Arc<OffboardingEngine>) -> Self {
        Self { delegate, engine }
    }

    pub fn delegate(&self) -> &P {
        &self.delegate
    }

    pub fn engine(&self) -> &OffboardingEngine {
        &self.engine
    }

    pub async fn get_dashboard_stats(&self) -> EngineResult<DashboardStats> {
        self.delegate.get_dashboard_stats().await
    }

    pub async fn list_cases(&self) -> EngineResult<Vec<CaseRecord>> {
        self.delegate.list_cases().await
    }

    pub async fn get_case(&self, case_id: &str) -> EngineResult<Option<CaseRecord>> {
        self.delegate.get_case(case_id).await
    }

    /// Runs `action` live, then records it in the case store whatever the
    /// live outcome. Grant-id actions run without resolving the case
    /// subject; the rest target the case employee's principal.
    #[instrument(skip(self, options))]
    pub async fn execute_remediation(
        &self,
        case_id: &str,
        action: &CaseAction,
        options: &RemediationOptions,
    ) -> EngineResult<OrchestratedResponse> {
        let remediation = self.engine.remediation();
        let live = match action.without_subject() {
            Some(live_action) => LiveLeg::Completed {
                bundle: remediation.execute(&live_action).await,
            },
            None => match self.case_subject(case_id).await {
                Ok((_, principal)) => LiveLeg::Completed {
                    bundle: remediation.execute(&action.for_principal(&principal)).await,
                },
                Err(e) => LiveLeg::Failed {
                    error: e.to_string(),
                },
            },
        };
        log_live(case_id, &live);

        let delegate = self
            .delegate
            .execute_remediation(case_id, action, options)
            .await?;
        let mut resolutions = Vec::new();
        if let Some(resolution) = resolution_of(&live) {
            resolutions.push(self.delegate.resolve_findings(case_id, &resolution).await?);
        }
        Ok(OrchestratedResponse::merge(delegate, live).with_resolutions(resolutions))
    }

    /// Revokes an employee's access by scope, then records it.
    #[instrument(skip(self))]
    pub async fn revoke_employee_access(
        &self,
        employee_id: &str,
        scope: &RevokeScope,
    ) -> EngineResult<OrchestratedResponse> {
        let live = match self.employee_principal(employee_id).await {
            Ok(principal) => LiveLeg::Completed {
                bundle: self.revoke_by_scope(&principal, scope).await,
            },
            Err(e) => LiveLeg::Failed {
                error: e.to_string(),
            },
        };
        log_live(employee_id, &live);

        let delegate = self
            .delegate
            .revoke_employee_access(employee_id, scope)
            .await?;
        let mut resolutions = Vec::new();
        if let Some(resolution) = resolution_of(&live) {
            let cases = self.delegate.list_cases().await?;
            for case in cases.iter().filter(|c| c.employee_id == employee_id) {
                resolutions.push(self.delegate.resolve_findings(&case.id, &resolution).await?);
            }
        }
        Ok(OrchestratedResponse::merge(delegate, live).with_resolutions(resolutions))
    }

    /// Revokes the app's grants from every active user of the app, then
    /// records the removal.
    #[instrument(skip(self))]
    pub async fn global_app_removal(
        &self,
        app_id: &str,
        app_name: &str,
    ) -> EngineResult<OrchestratedResponse> {
        let live = match self.delegate.list_app_users(app_id).await {
            Ok(users) => {
                let active: Vec<AppUserRecord> = users.into_iter().filter(|u| u.active).collect();
                info!(app_id, app_name, users = active.len(), "Removing app from active users");
                self.fan_out(app_id, active).await
            }
            Err(e) => LiveLeg::Failed {
                error: e.to_string(),
            },
        };
        log_live(app_id, &live);

        let delegate = self.delegate.global_app_removal(app_id, app_name).await?;
        Ok(OrchestratedResponse::merge(delegate, live))
    }

    /// Revokes the app's grants from the given users that are still active
    /// on it, then records the removal.
    #[instrument(skip(self))]
    pub async fn revoke_app_for_users(
        &self,
        app_id: &str,
        user_ids: &[String],
    ) -> EngineResult<OrchestratedResponse> {
        let live = match self.delegate.list_app_users(app_id).await {
            Ok(users) => {
                let selected = users
                    .into_iter()
                    .filter(|u| u.active && user_ids.contains(&u.employee_id))
                    .collect();
                self.fan_out(app_id, selected).await
            }
            Err(e) => LiveLeg::Failed {
                error: e.to_string(),
            },
        };
        log_live(app_id, &live);

        let delegate = self.delegate.revoke_app_for_users(app_id, user_ids).await?;
        Ok(OrchestratedResponse::merge(delegate, live))
    }

    /// Runs live discovery for the case subject and records the result.
    #[instrument(skip(self))]
    pub async fn scan_case(&self, case_id: &str) -> EngineResult<OrchestratedResponse> {
        let result = match self.case_subject(case_id).await {
            Ok((case, principal)) => {
                let context = DiscoveryContext {
                    case_ref: Some(case.id.clone()),
                    offboarded_at: case.offboarding_date,
                };
                self.engine
                    .discovery()
                    .discover_user_access(&principal, &context)
                    .await
            }
            Err(e) => DiscoveryResult::failed(case_id, e.to_string()),
        };
        let delegate = self.delegate.record_scan(case_id, &result).await?;

        let live = LiveLeg::Scanned { result };
        log_live(case_id, &live);
        Ok(OrchestratedResponse::merge(delegate, live))
    }

    async fn revoke_by_scope(&self, principal: &str, scope: &RevokeScope) -> BundleResult {
        let remediation = self.engine.remediation();
        match scope {
            RevokeScope::All => remediation.full_remediation(principal).await,
            RevokeScope::Grants => remediation.revoke_all_oauth_grants(principal).await,
            RevokeScope::Sessions => remediation.revoke_sign_in_sessions(principal).await,
            RevokeScope::App(app_id) => {
                let grants = remediation
                    .revoke_oauth_grants_for_app(principal, app_id)
                    .await;
                let assignments = remediation
                    .revoke_app_role_assignments(principal, Some(app_id))
                    .await;
                BundleResult::merge("revoke_app_access", vec![grants, assignments])
            }
        }
    }

    async fn fan_out(&self, app_id: &str, users: Vec<AppUserRecord>) -> LiveLeg {
        let remediation = self.engine.remediation();
        let bundles = stream::iter(users)
            .map(|user| async move {
                let bundle = match user.email.as_deref() {
                    Some(email) => remediation.revoke_oauth_grants_for_app(email, app_id).await,
                    None => BundleResult::from_outcomes(
                        "revoke_oauth_grants_for_app",
                        vec![RemediationOutcome::failed(
                            "resolve_subject",
                            "employee has no email on record",
                        )],
                    ),
                };
                UserBundle {
                    employee_id: user.employee_id,
                    principal: user.email,
                    bundle,
                }
            })
            .buffered(self.engine.config().max_concurrency.max(1))
            .collect()
            .await;
        LiveLeg::Batch { bundles }
    }

    async fn case_subject(&self, case_id: &str) -> EngineResult<(CaseRecord, String)> {
        let case = self
            .delegate
            .get_case(case_id)
            .await?
            .ok_or_else(|| EngineError::CaseNotFound(case_id.to_string()))?;
        let principal = self.employee_principal(&case.employee_id).await?;
        Ok((case, principal))
    }

    async fn employee_principal(&self, employee_id: &str) -> EngineResult<String> {
        let employee = self
            .delegate
            .get_employee(employee_id)
            .await?
            .ok_or_else(|| EngineError::EmployeeNotFound(employee_id.to_string()))?;
        employee
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| EngineError::MissingPrincipal(employee_id.to_string()))
    }
}

/// Access a completed live leg removed, if any.
fn resolution_of(live: &LiveLeg) -> Option<Resolution> {
    let LiveLeg::Completed { bundle } = live else {
        return None;
    };
    let resolution = Resolution::from_bundle(bundle, Utc::now());
    (!resolution.is_empty()).then_some(resolution)
}

fn log_live(target: &str, live: &LiveLeg) {
    match live {
        LiveLeg::Failed { error } => {
            warn!(target, error = %error, "Live identity-provider leg failed; continuing with case store");
        }
        other if !other.succeeded() => {
            warn!(target, "Live identity-provider leg partially failed; continuing with case store");
        }
        _ => info!(target, "Live identity-provider leg completed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoke_scope_parsing() {
        assert_eq!("all".parse::<RevokeScope>().unwrap(), RevokeScope::All);
        assert_eq!("grants".parse::<RevokeScope>().unwrap(), RevokeScope::Grants);
        assert_eq!("sessions".parse::<RevokeScope>().unwrap(), RevokeScope::Sessions);
        assert_eq!(
            "app:sp-1".parse::<RevokeScope>().unwrap(),
            RevokeScope::App("sp-1".into())
        );
        assert!("app:".parse::<RevokeScope>().is_err());
        assert!("everything".parse::<RevokeScope>().is_err());
        assert_eq!(RevokeScope::App("x".into()).to_string(), "app:x");
    }

    #[test]
    fn test_revoke_scope_serde() {
        let scope: RevokeScope = serde_json::from_str(r#""app:sp-9""#).unwrap();
        assert_eq!(scope, RevokeScope::App("sp-9".into()));
        assert_eq!(serde_json::to_string(&RevokeScope::All).unwrap(), r#""all""#);
        assert!(serde_json::from_str::<RevokeScope>(r#""nope""#).is_err());
    }

    #[test]
    fn test_grant_actions_need_no_subject() {
        assert_eq!(
            CaseAction::UpdateGrantScopes {
                grant_id: "g1".into(),
                scopes: vec!["User.Read".into()],
            }
            .without_subject(),
            Some(RemediationAction::UpdateGrantScopes {
                grant_id: "g1".into(),
                scopes: vec!["User.Read".into()],
            })
        );
        assert_eq!(CaseAction::RevokeSessions.without_subject(), None);
        assert_eq!(
            CaseAction::RevokeAppRoleAssignments { app_id: None }.without_subject(),
            None
        );
    }

    #[test]
    fn test_case_action_for_principal() {
        assert_eq!(
            CaseAction::FullRemediation.for_principal("a@b.com"),
            RemediationAction::FullRemediation {
                principal: "a@b.com".into()
            }
        );
        assert_eq!(
            CaseAction::RevokeGrant {
                grant_id: "g1".into()
            }
            .for_principal("a@b.com"),
            RemediationAction::RevokeOauthGrant {
                grant_id: "g1".into()
            }
        );
    }
}
