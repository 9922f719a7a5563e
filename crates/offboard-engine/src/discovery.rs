//! Access discovery.
//!
//! Builds the artifact inventory for one subject from several independent
//! upstream sources. A failing source contributes nothing and is recorded
//! in [`DiscoveryResult::source_errors`]; it never aborts the run.
//!
//! Access granted implicitly through licence assignment to first-party
//! apps is not exposed by any directory API and is not reported here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use offboard_graph::{
    AppRoleAssignment, DirectoryApi, OAuthGrant, RegisteredDevice, ServicePrincipal, SignInEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::findings::{derive_findings, OffboardingState};
use crate::risk;
use crate::types::{
    AccessArtifact, ArtifactKind, ArtifactStatus, ConsentKind, Finding, Identity, OpResult,
    Resolution, RiskLevel, SourceError,
};

pub(crate) const NOT_CONFIGURED: &str = "identity provider integration is not configured";

/// Case context for a discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryContext {
    /// Stamped onto every artifact and finding.
    pub case_ref: Option<String>,
    /// Effective offboarding date from the case record.
    pub offboarded_at: Option<DateTime<Utc>>,
}

/// Everything discovered about one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub principal: String,
    pub identity: Option<Identity>,
    pub artifacts: Vec<AccessArtifact>,
    pub findings: Vec<Finding>,
    pub source_errors: Vec<SourceError>,
    /// Set when the subject could not be resolved at all.
    pub error: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveryResult {
    /// An empty result explaining why nothing was discovered.
    #[must_use]
    pub fn failed(principal: &str, error: impl Into<String>) -> Self {
        Self {
            principal: principal.to_string(),
            identity: None,
            artifacts: Vec::new(),
            findings: Vec::new(),
            source_errors: Vec::new(),
            error: Some(error.into()),
            discovered_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.source_errors.is_empty()
    }

    /// Highest risk among active artifacts.
    #[must_use]
    pub fn max_risk(&self) -> Option<RiskLevel> {
        self.active_artifacts().map(|a| a.risk_level).max()
    }

    pub fn active_artifacts(&self) -> impl Iterator<Item = &AccessArtifact> {
        self.artifacts.iter().filter(|a| a.is_active())
    }

    /// Active artifacts of one kind.
    pub fn artifacts_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &AccessArtifact> {
        self.active_artifacts().filter(move |a| a.kind == kind)
    }

    /// Carries a remediation into this result. Deleted grants and
    /// assignments become `Deleted`, sessions become `Revoked` once
    /// revocation is confirmed, and an open finding closes when every
    /// artifact it names is no longer active.
    ///
    /// Returns the ids of the findings closed by this call.
    pub fn apply_resolution(&mut self, resolution: &Resolution) -> Vec<Uuid> {
        for artifact in &mut self.artifacts {
            match artifact.kind {
                ArtifactKind::OAuthGrant | ArtifactKind::AppRoleAssignment
                    if resolution.deleted_artifact_ids.contains(&artifact.id) =>
                {
                    artifact.mark_deleted();
                }
                ArtifactKind::Session if resolution.sessions_revoked => artifact.mark_revoked(),
                _ => {}
            }
        }

        let artifacts = &self.artifacts;
        let mut closed = Vec::new();
        for finding in self
            .findings
            .iter_mut()
            .filter(|f| f.is_open() && !f.artifact_ids.is_empty())
        {
            let resolved = finding.artifact_ids.iter().all(|id| {
                artifacts
                    .iter()
                    .any(|a| &a.id == id && !a.is_active())
            });
            if resolved {
                finding.close(resolution.resolved_at);
                closed.push(finding.id);
            }
        }
        if !closed.is_empty() {
            info!(
                principal = %self.principal,
                closed = closed.len(),
                "Findings resolved by remediation"
            );
        }
        closed
    }
}

/// Discovers lingering access for a subject.
#[derive(Clone)]
pub struct DiscoveryService {
    directory: Option<Arc<dyn DirectoryApi>>,
    config: EngineConfig,
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("configured", &self.directory.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Raw upstream data for one subject.
#[derive(Default)]
struct Sources {
    grants: Vec<OAuthGrant>,
    assignments: Vec<AppRoleAssignment>,
    devices: Vec<RegisteredDevice>,
    sign_ins: Vec<SignInEvent>,
    errors: Vec<SourceError>,
}

impl DiscoveryService {
    #[must_use]
    pub fn new(directory: Option<Arc<dyn DirectoryApi>>, config: EngineConfig) -> Self {
        Self { directory, config }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.directory.is_some()
    }

    /// Discovers every access artifact the subject still holds and derives
    /// findings from them.
    ///
    /// Never fails: an unresolvable subject or an unreachable provider give
    /// an empty result with `error` set.
    #[instrument(skip(self, context), fields(case_ref = ?context.case_ref))]
    pub async fn discover_user_access(
        &self,
        principal: &str,
        context: &DiscoveryContext,
    ) -> DiscoveryResult {
        let Some(directory) = self.directory.as_deref() else {
            return DiscoveryResult::failed(principal, NOT_CONFIGURED);
        };

        let identity = match directory.get_user_by_principal(principal).await {
            Ok(Some(user)) => Identity::from(user),
            Ok(None) => {
                info!(principal, "Subject not found in directory");
                return DiscoveryResult::failed(
                    principal,
                    format!("user {principal} not found in directory"),
                );
            }
            Err(e) => {
                warn!(principal, error = %e, "Subject resolution failed");
                return DiscoveryResult::failed(
                    principal,
                    format!("could not resolve {principal}: {e}"),
                );
            }
        };

        let sources = self.fetch_sources(directory, &identity).await;
        let names = self
            .resolve_service_principals(directory, &sources.grants, &sources.assignments)
            .await;

        let mut artifacts = Vec::new();
        artifacts.extend(sources.grants.iter().map(|g| grant_artifact(g, &identity, &names)));
        artifacts.extend(
            sources
                .assignments
                .iter()
                .map(|a| role_assignment_artifact(a, &identity, &names)),
        );
        artifacts.extend(session_artifacts(&sources.sign_ins, &identity));
        artifacts.extend(sources.devices.iter().map(|d| device_artifact(d, &identity)));
        for a in &mut artifacts {
            a.case_ref.clone_from(&context.case_ref);
        }

        let now = Utc::now();
        let state = OffboardingState {
            identity: &identity,
            case_ref: context.case_ref.as_deref(),
            offboarded_at: context.offboarded_at,
            now,
        };
        let findings = derive_findings(&state, &artifacts, &sources.sign_ins);

        info!(
            principal,
            artifacts = artifacts.len(),
            findings = findings.len(),
            source_errors = sources.errors.len(),
            "Discovery complete"
        );

        DiscoveryResult {
            principal: principal.to_string(),
            identity: Some(identity),
            artifacts,
            findings,
            source_errors: sources.errors,
            error: None,
            discovered_at: now,
        }
    }

    /// True when the subject holds at least one grant or app-role
    /// assignment. Each source is asked for a single one-item page, and
    /// assignments are not consulted once a grant is found.
    ///
    /// An absent subject has no access. Upstream failures are returned
    /// rather than guessed at.
    #[instrument(skip(self))]
    pub async fn has_active_access(&self, principal: &str) -> EngineResult<bool> {
        let Some(directory) = self.directory.as_deref() else {
            return Ok(false);
        };
        let Some(user) = directory.get_user_by_principal(principal).await? else {
            return Ok(false);
        };

        if directory.has_oauth_grants(&user.id).await? {
            return Ok(true);
        }
        Ok(directory.has_app_role_assignments(&user.id).await?)
    }

    async fn fetch_sources(&self, directory: &dyn DirectoryApi, identity: &Identity) -> Sources {
        let subject_id = identity.provider_id.as_str();
        let since = Utc::now() - Duration::days(self.config.sign_in_lookback_days);

        let sign_ins = async {
            if self.config.include_sign_ins {
                OpResult::from_result(
                    "sign_ins",
                    directory
                        .list_sign_ins(&identity.principal_name, Some(since))
                        .await,
                )
            } else {
                OpResult {
                    value: Vec::new(),
                    error: None,
                }
            }
        };

        let (grants, assignments, devices, sign_ins) = tokio::join!(
            async {
                OpResult::from_result(
                    "oauth_grants",
                    directory.list_user_oauth_grants(subject_id).await,
                )
            },
            async {
                OpResult::from_result(
                    "app_role_assignments",
                    directory.list_user_app_role_assignments(subject_id).await,
                )
            },
            async {
                OpResult::from_result(
                    "registered_devices",
                    directory.list_registered_devices(subject_id).await,
                )
            },
            sign_ins,
        );

        let mut sources = Sources::default();
        sources.errors.extend(
            [
                grants.error,
                assignments.error,
                devices.error,
                sign_ins.error,
            ]
            .into_iter()
            .flatten(),
        );
        for e in &sources.errors {
            warn!(source = %e.source, kind = ?e.kind, error = %e.message, "Discovery source failed");
        }
        sources.grants = grants.value;
        sources.assignments = assignments.value;
        sources.devices = devices.value;
        sources.sign_ins = sign_ins.value;
        sources
    }

    /// Looks up each distinct client and resource service principal once.
    /// Lookups are best effort; failures leave the id unresolved.
    async fn resolve_service_principals(
        &self,
        directory: &dyn DirectoryApi,
        grants: &[OAuthGrant],
        assignments: &[AppRoleAssignment],
    ) -> HashMap<String, ServicePrincipal> {
        let mut ids: Vec<&str> = Vec::new();
        let wanted = grants
            .iter()
            .map(|g| g.client_id.as_str())
            .chain(assignments.iter().map(|a| a.resource_id.as_str()));
        for id in wanted {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let resolved: Vec<(String, Option<ServicePrincipal>)> = stream::iter(ids)
            .map(|id| async move {
                match directory.get_service_principal(id).await {
                    Ok(sp) => (id.to_string(), sp),
                    Err(e) => {
                        debug!(id, error = %e, "Service principal lookup failed");
                        (id.to_string(), None)
                    }
                }
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        resolved
            .into_iter()
            .filter_map(|(id, sp)| sp.map(|sp| (id, sp)))
            .collect()
    }
}

fn display_name(names: &HashMap<String, ServicePrincipal>, id: &str) -> Option<String> {
    names.get(id).and_then(|sp| sp.display_name.clone())
}

fn grant_artifact(
    grant: &OAuthGrant,
    identity: &Identity,
    names: &HashMap<String, ServicePrincipal>,
) -> AccessArtifact {
    let scopes = grant.scopes();
    let consent_kind = if grant.is_admin_consent() {
        ConsentKind::AllPrincipals
    } else {
        ConsentKind::Principal
    };
    AccessArtifact {
        id: grant.id.clone(),
        kind: ArtifactKind::OAuthGrant,
        subject_id: identity.provider_id.clone(),
        app_id: grant.client_id.clone(),
        app_display_name: display_name(names, &grant.client_id)
            .unwrap_or_else(|| grant.client_id.clone()),
        risk_level: risk::classify(&scopes, consent_kind),
        scopes,
        consent_kind,
        status: ArtifactStatus::Active,
        case_ref: None,
        created_at: None,
    }
}

fn role_assignment_artifact(
    assignment: &AppRoleAssignment,
    identity: &Identity,
    names: &HashMap<String, ServicePrincipal>,
) -> AccessArtifact {
    let sp = names.get(&assignment.resource_id);
    let scopes: Vec<String> = if assignment.is_default_access() {
        Vec::new()
    } else {
        sp.and_then(|sp| sp.role_value(&assignment.app_role_id))
            .map(|v| vec![v.to_string()])
            .unwrap_or_default()
    };
    let app_display_name = assignment
        .resource_display_name
        .clone()
        .or_else(|| display_name(names, &assignment.resource_id))
        .unwrap_or_else(|| assignment.resource_id.clone());

    AccessArtifact {
        id: assignment.id.clone(),
        kind: ArtifactKind::AppRoleAssignment,
        subject_id: identity.provider_id.clone(),
        app_id: assignment.resource_id.clone(),
        app_display_name,
        risk_level: risk::classify(&scopes, ConsentKind::RoleAssignment),
        scopes,
        consent_kind: ConsentKind::RoleAssignment,
        status: ArtifactStatus::Active,
        case_ref: None,
        created_at: assignment.created_date_time,
    }
}

/// Groups successful interactive sign-ins by client app into one session artifact per
/// app, dated by the most recent sign-in.
fn session_artifacts(events: &[SignInEvent], identity: &Identity) -> Vec<AccessArtifact> {
    let mut by_app: BTreeMap<&str, (&str, DateTime<Utc>)> = BTreeMap::new();
    for e in events
        .iter()
        .filter(|e| e.succeeded() && e.is_interactive != Some(false))
    {
        let app_id = e.app_id.as_deref().unwrap_or("unknown");
        let name = e.app_display_name.as_deref().unwrap_or(app_id);
        by_app
            .entry(app_id)
            .and_modify(|(_, latest)| {
                if e.created_date_time > *latest {
                    *latest = e.created_date_time;
                }
            })
            .or_insert((name, e.created_date_time));
    }

    by_app
        .into_iter()
        .map(|(app_id, (name, latest))| AccessArtifact {
            id: format!("session:{app_id}"),
            kind: ArtifactKind::Session,
            subject_id: identity.provider_id.clone(),
            app_id: app_id.to_string(),
            app_display_name: name.to_string(),
            scopes: Vec::new(),
            consent_kind: ConsentKind::SignIn,
            risk_level: risk::classify(&[], ConsentKind::SignIn),
            status: ArtifactStatus::Active,
            case_ref: None,
            created_at: Some(latest),
        })
        .collect()
}

fn device_artifact(device: &RegisteredDevice, identity: &Identity) -> AccessArtifact {
    let device_id = device.device_id.clone().unwrap_or_else(|| device.id.clone());
    AccessArtifact {
        id: device.id.clone(),
        kind: ArtifactKind::RegisteredDevice,
        subject_id: identity.provider_id.clone(),
        app_display_name: device
            .display_name
            .clone()
            .or_else(|| device.operating_system.clone())
            .unwrap_or_else(|| device_id.clone()),
        app_id: device_id,
        scopes: Vec::new(),
        consent_kind: ConsentKind::Device,
        risk_level: risk::classify(&[], ConsentKind::Device),
        status: ArtifactStatus::Active,
        case_ref: None,
        created_at: device.registration_date_time,
    }
}
