//! Access revocation.
//!
//! Every operation returns a [`BundleResult`] with one outcome per upstream
//! call; failures are captured, never raised. The service keeps no state
//! between calls.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use offboard_graph::{DirectoryApi, GraphUser, OAuthGrant};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::discovery::NOT_CONFIGURED;
use crate::types::{BundleResult, RemediationOutcome};

/// A remediation request, as carried over the orchestration boundary and
/// the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemediationAction {
    RevokeOauthGrant {
        grant_id: String,
    },
    RevokeAllOauthGrants {
        principal: String,
    },
    RevokeOauthGrantsForApp {
        principal: String,
        app_id: String,
    },
    UpdateGrantScopes {
        grant_id: String,
        scopes: Vec<String>,
    },
    RevokeSignInSessions {
        principal: String,
    },
    RevokeAppRoleAssignments {
        principal: String,
        #[serde(default)]
        app_id: Option<String>,
    },
    FullRemediation {
        principal: String,
    },
}

impl RemediationAction {
    /// Name used for the bundle's `action`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RevokeOauthGrant { .. } => "revoke_oauth_grant",
            Self::RevokeAllOauthGrants { .. } => "revoke_all_oauth_grants",
            Self::RevokeOauthGrantsForApp { .. } => "revoke_oauth_grants_for_app",
            Self::UpdateGrantScopes { .. } => "update_grant_scopes",
            Self::RevokeSignInSessions { .. } => "revoke_sign_in_sessions",
            Self::RevokeAppRoleAssignments { .. } => "revoke_app_role_assignments",
            Self::FullRemediation { .. } => "full_remediation",
        }
    }
}

/// Revokes access in the identity provider.
///
/// Without a directory (no credentials configured) every operation is a
/// no-op that reports success with a `skipped` outcome.
#[derive(Clone)]
pub struct RemediationService {
    directory: Option<Arc<dyn DirectoryApi>>,
    max_concurrency: usize,
}

impl std::fmt::Debug for RemediationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationService")
            .field("configured", &self.directory.is_some())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

enum Subject {
    Found(GraphUser),
    Missing(RemediationOutcome),
}

impl RemediationService {
    #[must_use]
    pub fn new(directory: Option<Arc<dyn DirectoryApi>>, config: &EngineConfig) -> Self {
        Self {
            directory,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.directory.is_some()
    }

    /// Runs a remediation action.
    pub async fn execute(&self, action: &RemediationAction) -> BundleResult {
        match action {
            RemediationAction::RevokeOauthGrant { grant_id } => {
                self.revoke_oauth_grant(grant_id).await
            }
            RemediationAction::RevokeAllOauthGrants { principal } => {
                self.revoke_all_oauth_grants(principal).await
            }
            RemediationAction::RevokeOauthGrantsForApp { principal, app_id } => {
                self.revoke_oauth_grants_for_app(principal, app_id).await
            }
            RemediationAction::UpdateGrantScopes { grant_id, scopes } => {
                self.update_grant_scopes(grant_id, scopes).await
            }
            RemediationAction::RevokeSignInSessions { principal } => {
                self.revoke_sign_in_sessions(principal).await
            }
            RemediationAction::RevokeAppRoleAssignments { principal, app_id } => {
                self.revoke_app_role_assignments(principal, app_id.as_deref())
                    .await
            }
            RemediationAction::FullRemediation { principal } => {
                self.full_remediation(principal).await
            }
        }
    }

    /// Deletes one grant. A grant that is already gone counts as deleted.
    #[instrument(skip(self))]
    pub async fn revoke_oauth_grant(&self, grant_id: &str) -> BundleResult {
        const ACTION: &str = "revoke_oauth_grant";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };
        let outcome = delete_grant(directory, grant_id, None).await;
        BundleResult::from_outcomes(ACTION, vec![outcome])
    }

    /// Deletes every grant the subject holds, one outcome per grant.
    #[instrument(skip(self))]
    pub async fn revoke_all_oauth_grants(&self, principal: &str) -> BundleResult {
        const ACTION: &str = "revoke_all_oauth_grants";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };
        let user = match resolve_subject(directory, principal).await {
            Subject::Found(user) => user,
            Subject::Missing(outcome) => return BundleResult::from_outcomes(ACTION, vec![outcome]),
        };
        let outcomes = self.revoke_grants_of(directory, &user, None).await;
        BundleResult::from_outcomes(ACTION, outcomes)
    }

    /// Deletes the subject's grants to one client app. `app_id` is the
    /// client's service principal object id or its application id.
    #[instrument(skip(self))]
    pub async fn revoke_oauth_grants_for_app(&self, principal: &str, app_id: &str) -> BundleResult {
        const ACTION: &str = "revoke_oauth_grants_for_app";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };
        let user = match resolve_subject(directory, principal).await {
            Subject::Found(user) => user,
            Subject::Missing(outcome) => return BundleResult::from_outcomes(ACTION, vec![outcome]),
        };
        let outcomes = self.revoke_grants_of(directory, &user, Some(app_id)).await;
        BundleResult::from_outcomes(ACTION, outcomes)
    }

    /// Replaces a grant's scopes. The grant must exist; an empty scope set
    /// is refused in favour of revoking the grant.
    #[instrument(skip(self))]
    pub async fn update_grant_scopes(&self, grant_id: &str, scopes: &[String]) -> BundleResult {
        const ACTION: &str = "update_grant_scopes";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };

        let scope = offboard_graph::split_scopes(&scopes.join(" ")).join(" ");
        if scope.is_empty() {
            let outcome = RemediationOutcome::failed(
                "update_oauth_grant_scopes",
                "scope set is empty; revoke the grant instead",
            )
            .with("grant_id", grant_id);
            return BundleResult::from_outcomes(ACTION, vec![outcome]);
        }

        let outcome = match directory.update_oauth_grant_scopes(grant_id, &scope).await {
            Ok(()) => {
                info!(grant_id, scope = %scope, "Grant scopes updated");
                RemediationOutcome::succeeded("update_oauth_grant_scopes")
            }
            Err(e) => {
                warn!(grant_id, error = %e, "Grant scope update failed");
                RemediationOutcome::from_graph_error("update_oauth_grant_scopes", &e)
            }
        }
        .with("grant_id", grant_id)
        .with("scope", scope.as_str());
        BundleResult::from_outcomes(ACTION, vec![outcome])
    }

    /// Invalidates every refresh token and session of the subject.
    #[instrument(skip(self))]
    pub async fn revoke_sign_in_sessions(&self, principal: &str) -> BundleResult {
        const ACTION: &str = "revoke_sign_in_sessions";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };
        let user = match resolve_subject(directory, principal).await {
            Subject::Found(user) => user,
            Subject::Missing(outcome) => return BundleResult::from_outcomes(ACTION, vec![outcome]),
        };
        BundleResult::from_outcomes(ACTION, vec![revoke_sessions(directory, &user).await])
    }

    /// Removes the subject's app-role assignments, optionally only those on
    /// one resource app (service principal object id).
    #[instrument(skip(self))]
    pub async fn revoke_app_role_assignments(
        &self,
        principal: &str,
        app_id: Option<&str>,
    ) -> BundleResult {
        const ACTION: &str = "revoke_app_role_assignments";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };
        let user = match resolve_subject(directory, principal).await {
            Subject::Found(user) => user,
            Subject::Missing(outcome) => return BundleResult::from_outcomes(ACTION, vec![outcome]),
        };
        let outcomes = self.revoke_assignments_of(directory, &user, app_id).await;
        BundleResult::from_outcomes(ACTION, outcomes)
    }

    /// Grants, then app-role assignments, then sessions.
    ///
    /// Grants go first so a token refreshed during the run cannot re-bind
    /// a session-bound grant after sessions are cleared.
    #[instrument(skip(self))]
    pub async fn full_remediation(&self, principal: &str) -> BundleResult {
        const ACTION: &str = "full_remediation";
        let Some(directory) = self.directory.as_deref() else {
            return skipped(ACTION);
        };
        let user = match resolve_subject(directory, principal).await {
            Subject::Found(user) => user,
            Subject::Missing(outcome) => return BundleResult::from_outcomes(ACTION, vec![outcome]),
        };

        let mut outcomes = self.revoke_grants_of(directory, &user, None).await;
        outcomes.extend(self.revoke_assignments_of(directory, &user, None).await);
        outcomes.push(revoke_sessions(directory, &user).await);

        let bundle = BundleResult::from_outcomes(ACTION, outcomes);
        info!(
            principal,
            success = bundle.success,
            succeeded = bundle.succeeded_count(),
            failed = bundle.failed_count(),
            "Full remediation finished"
        );
        bundle
    }

    async fn revoke_grants_of(
        &self,
        directory: &dyn DirectoryApi,
        user: &GraphUser,
        app_id: Option<&str>,
    ) -> Vec<RemediationOutcome> {
        let grants = match directory.list_user_oauth_grants(&user.id).await {
            Ok(grants) => grants,
            Err(e) => {
                warn!(subject_id = %user.id, error = %e, "Could not list grants");
                return vec![RemediationOutcome::from_graph_error("list_user_oauth_grants", &e)
                    .with("subject_id", user.id.as_str())];
            }
        };

        let grants: Vec<OAuthGrant> = match app_id {
            None => grants,
            Some(app_id) => match client_filter(directory, &grants, app_id).await {
                Ok(client_id) => grants
                    .into_iter()
                    .filter(|g| client_id.as_deref() == Some(g.client_id.as_str()))
                    .collect(),
                Err(outcome) => return vec![outcome],
            },
        };

        stream::iter(grants.iter())
            .map(|g| delete_grant(directory, &g.id, Some(g.client_id.as_str())))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn revoke_assignments_of(
        &self,
        directory: &dyn DirectoryApi,
        user: &GraphUser,
        app_id: Option<&str>,
    ) -> Vec<RemediationOutcome> {
        let assignments = match directory.list_user_app_role_assignments(&user.id).await {
            Ok(assignments) => assignments,
            Err(e) => {
                warn!(subject_id = %user.id, error = %e, "Could not list app role assignments");
                return vec![RemediationOutcome::from_graph_error(
                    "list_user_app_role_assignments",
                    &e,
                )
                .with("subject_id", user.id.as_str())];
            }
        };

        stream::iter(
            assignments
                .iter()
                .filter(|a| app_id.map_or(true, |id| a.resource_id == id)),
        )
        .map(|a| async move {
            let outcome = match directory.delete_app_role_assignment(&user.id, &a.id).await {
                Ok(()) => RemediationOutcome::succeeded("delete_app_role_assignment"),
                Err(e) => {
                    warn!(assignment_id = %a.id, error = %e, "App role assignment removal failed");
                    RemediationOutcome::from_graph_error("delete_app_role_assignment", &e)
                }
            };
            outcome
                .with("assignment_id", a.id.as_str())
                .with("resource_id", a.resource_id.as_str())
        })
        .buffered(self.max_concurrency)
        .collect()
        .await
    }
}

/// Outcome returned when no directory is configured.
fn skipped(action: &str) -> BundleResult {
    let outcome = RemediationOutcome::succeeded(action)
        .with("skipped", true)
        .with("reason", NOT_CONFIGURED);
    BundleResult::from_outcomes(action, vec![outcome])
}

async fn resolve_subject(directory: &dyn DirectoryApi, principal: &str) -> Subject {
    match directory.get_user_by_principal(principal).await {
        Ok(Some(user)) => Subject::Found(user),
        Ok(None) => Subject::Missing(
            RemediationOutcome::failed("resolve_subject", "user not found in directory")
                .with("principal", principal),
        ),
        Err(e) => Subject::Missing(
            RemediationOutcome::from_graph_error("resolve_subject", &e).with("principal", principal),
        ),
    }
}

/// Works out which client service principal `app_id` names. Grants carry
/// the object id; callers often only know the application id.
async fn client_filter(
    directory: &dyn DirectoryApi,
    grants: &[OAuthGrant],
    app_id: &str,
) -> Result<Option<String>, RemediationOutcome> {
    if grants.iter().any(|g| g.client_id == app_id) {
        return Ok(Some(app_id.to_string()));
    }
    match directory.get_service_principal_by_app_id(app_id).await {
        Ok(sp) => Ok(sp.map(|sp| sp.id)),
        Err(e) => Err(
            RemediationOutcome::from_graph_error("get_service_principal_by_app_id", &e)
                .with("app_id", app_id),
        ),
    }
}

async fn delete_grant(
    directory: &dyn DirectoryApi,
    grant_id: &str,
    client_id: Option<&str>,
) -> RemediationOutcome {
    let outcome = match directory.delete_oauth_grant(grant_id).await {
        Ok(()) => RemediationOutcome::succeeded("delete_oauth_grant"),
        Err(e) => {
            warn!(grant_id, error = %e, "Grant deletion failed");
            RemediationOutcome::from_graph_error("delete_oauth_grant", &e)
        }
    }
    .with("grant_id", grant_id);
    match client_id {
        Some(client_id) => outcome.with("client_id", client_id),
        None => outcome,
    }
}

async fn revoke_sessions(directory: &dyn DirectoryApi, user: &GraphUser) -> RemediationOutcome {
    let outcome = match directory.revoke_sign_in_sessions(&user.id).await {
        Ok(true) => RemediationOutcome::succeeded("revoke_sign_in_sessions").with("confirmed", true),
        Ok(false) => {
            warn!(subject_id = %user.id, "Session revocation not confirmed");
            RemediationOutcome::failed(
                "revoke_sign_in_sessions",
                "identity provider did not confirm session revocation",
            )
            .with("confirmed", false)
        }
        Err(e) => {
            warn!(subject_id = %user.id, error = %e, "Session revocation failed");
            RemediationOutcome::from_graph_error("revoke_sign_in_sessions", &e)
        }
    };
    outcome.with("subject_id", user.id.as_str())
}
