//! Finding derivation.
//!
//! Findings are aggregated: at most one per type per discovery run, with
//! severity equal to the highest risk among the artifacts behind it.

use chrono::{DateTime, Utc};
use offboard_graph::SignInEvent;

use crate::types::{AccessArtifact, ArtifactKind, Finding, FindingType, Identity, RiskLevel};

/// What a discovery run knows about the subject's offboarding.
#[derive(Debug, Clone, Copy)]
pub struct OffboardingState<'a> {
    pub identity: &'a Identity,
    pub case_ref: Option<&'a str>,
    /// Effective offboarding date, when the case carries one.
    pub offboarded_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

impl OffboardingState<'_> {
    /// Disabled, or past the effective offboarding date.
    #[must_use]
    pub fn is_offboarded(&self) -> bool {
        !self.identity.enabled || self.offboarding_date_passed()
    }

    fn offboarding_date_passed(&self) -> bool {
        self.offboarded_at.is_some_and(|at| at <= self.now)
    }
}

/// Derives findings for a subject from its artifacts and sign-ins.
///
/// Nothing is raised for a subject that is neither disabled nor past its
/// offboarding date.
#[must_use]
pub fn derive_findings(
    state: &OffboardingState<'_>,
    artifacts: &[AccessArtifact],
    sign_ins: &[SignInEvent],
) -> Vec<Finding> {
    if !state.is_offboarded() {
        return Vec::new();
    }

    let mut findings = Vec::new();

    if let Some(f) = lingering(
        state,
        artifacts,
        ArtifactKind::OAuthGrant,
        FindingType::LingeringOAuthGrant,
        "OAuth grant(s)",
    ) {
        findings.push(f);
    }
    if let Some(f) = lingering(
        state,
        artifacts,
        ArtifactKind::AppRoleAssignment,
        FindingType::LingeringAsp,
        "enterprise app role assignment(s)",
    ) {
        findings.push(f);
    }

    if let Some(offboarded_at) = state.offboarded_at {
        findings.extend(post_offboard_logins(state, offboarded_at, sign_ins));
    }

    if state.identity.enabled && state.offboarding_date_passed() {
        findings.push(finding(
            state,
            FindingType::OffboardingNotEnforced,
            RiskLevel::High,
            format!(
                "{} is past the offboarding date but the account is still enabled",
                state.identity.principal_name
            ),
            Vec::new(),
        ));
    }

    findings
}

fn lingering(
    state: &OffboardingState<'_>,
    artifacts: &[AccessArtifact],
    kind: ArtifactKind,
    finding_type: FindingType,
    noun: &str,
) -> Option<Finding> {
    let active: Vec<&AccessArtifact> = artifacts
        .iter()
        .filter(|a| a.kind == kind && a.is_active())
        .collect();
    let severity = active.iter().map(|a| a.risk_level).max()?;

    let mut apps: Vec<&str> = Vec::new();
    for a in &active {
        if !apps.contains(&a.app_display_name.as_str()) {
            apps.push(&a.app_display_name);
        }
    }

    Some(finding(
        state,
        finding_type,
        severity,
        format!(
            "{} still holds {} active {noun} ({})",
            state.identity.principal_name,
            active.len(),
            apps.join(", ")
        ),
        active.iter().map(|a| a.id.clone()).collect(),
    ))
}

fn post_offboard_logins(
    state: &OffboardingState<'_>,
    offboarded_at: DateTime<Utc>,
    sign_ins: &[SignInEvent],
) -> Vec<Finding> {
    let (risky, plain): (Vec<&SignInEvent>, Vec<&SignInEvent>) = sign_ins
        .iter()
        .filter(|e| e.succeeded() && e.created_date_time > offboarded_at)
        .partition(|e| e.is_risky());

    let mut findings = Vec::new();
    if !risky.is_empty() {
        findings.push(finding(
            state,
            FindingType::PostOffboardSuspiciousLogin,
            RiskLevel::High,
            sign_in_summary(state, &risky, "risky sign-in(s)"),
            risky.iter().map(|e| e.id.clone()).collect(),
        ));
    }
    if !plain.is_empty() {
        findings.push(finding(
            state,
            FindingType::PostOffboardLogin,
            RiskLevel::Medium,
            sign_in_summary(state, &plain, "sign-in(s)"),
            plain.iter().map(|e| e.id.clone()).collect(),
        ));
    }
    findings
}

fn sign_in_summary(state: &OffboardingState<'_>, events: &[&SignInEvent], noun: &str) -> String {
    let latest = events.iter().map(|e| e.created_date_time).max();
    let mut apps: Vec<&str> = Vec::new();
    for e in events {
        let app = e
            .app_display_name
            .as_deref()
            .or(e.app_id.as_deref())
            .unwrap_or("unknown app");
        if !apps.contains(&app) {
            apps.push(app);
        }
    }
    format!(
        "{} successful {noun} by {} after offboarding ({}; latest {})",
        events.len(),
        state.identity.principal_name,
        apps.join(", "),
        latest.map(|t| t.to_rfc3339()).unwrap_or_default()
    )
}

fn finding(
    state: &OffboardingState<'_>,
    finding_type: FindingType,
    severity: RiskLevel,
    summary: String,
    artifact_ids: Vec<String>,
) -> Finding {
    let mut f = Finding::new(
        finding_type,
        severity,
        &state.identity.provider_id,
        summary,
    );
    f.case_ref = state.case_ref.map(str::to_string);
    f.artifact_ids = artifact_ids;
    f.detected_at = state.now;
    f
}
