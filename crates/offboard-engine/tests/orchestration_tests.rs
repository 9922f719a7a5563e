//! Orchestration over an in-memory case store and directory.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use offboard_engine::{
    AppUserRecord, ArtifactKind, ArtifactStatus, CaseAction, CaseRecord, EmployeeRecord,
    EngineConfig, EngineError, FindingType, InMemoryCaseProvider, LiveLeg, OffboardingEngine,
    OrchestratedCaseProvider, ProviderCall, RemediationOptions, ResponseStatus, RevokeScope,
};
use offboard_graph::InjectedFailure;

async fn case_store() -> InMemoryCaseProvider {
    let store = InMemoryCaseProvider::new();
    store
        .add_employee(EmployeeRecord {
            id: "emp-1".into(),
            email: Some(SUBJECT_UPN.into()),
            display_name: Some("Jane Doe".into()),
        })
        .await;
    store
        .add_employee(EmployeeRecord {
            id: "emp-2".into(),
            email: None,
            display_name: Some("No Mail".into()),
        })
        .await;
    store
        .add_case(CaseRecord {
            id: "case-1".into(),
            employee_id: "emp-1".into(),
            status: "open".into(),
            offboarding_date: Some(Utc::now() - Duration::days(2)),
        })
        .await;
    store
        .add_case(CaseRecord {
            id: "case-2".into(),
            employee_id: "emp-2".into(),
            status: "open".into(),
            offboarding_date: None,
        })
        .await;
    store
}

async fn orchestrator() -> (
    OrchestratedCaseProvider<InMemoryCaseProvider>,
    Arc<offboard_graph::InMemoryDirectory>,
) {
    let directory = seeded_directory().await;
    let engine = Arc::new(engine(directory.clone()));
    (
        OrchestratedCaseProvider::new(case_store().await, engine),
        directory,
    )
}

#[tokio::test]
async fn test_revoke_employee_access_all() {
    let (provider, directory) = orchestrator().await;

    let response = provider
        .revoke_employee_access("emp-1", &RevokeScope::All)
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Success);
    match &response.live {
        LiveLeg::Completed { bundle } => {
            assert!(bundle.success);
            assert_eq!(bundle.action, "full_remediation");
        }
        other => panic!("unexpected live leg: {other:?}"),
    }
    assert!(directory.grants().await.is_empty());
    assert_eq!(
        provider.delegate().calls().await,
        vec![
            ProviderCall::RevokeEmployeeAccess {
                employee_id: "emp-1".into(),
                scope: RevokeScope::All,
            },
            ProviderCall::ResolveFindings {
                case_id: "case-1".into(),
            },
        ]
    );
}

#[tokio::test]
async fn test_revoke_employee_access_for_one_app() {
    let (provider, directory) = orchestrator().await;

    let scope: RevokeScope = "app:sp-mailer".parse().unwrap();
    let response = provider
        .revoke_employee_access("emp-1", &scope)
        .await
        .unwrap();

    match &response.live {
        LiveLeg::Completed { bundle } => assert_eq!(bundle.action, "revoke_app_access"),
        other => panic!("unexpected live leg: {other:?}"),
    }
    let remaining: Vec<String> = directory.grants().await.into_iter().map(|g| g.id).collect();
    assert_eq!(remaining, vec!["g-profile"]);
    assert_eq!(directory.app_role_assignments().await.len(), 1);
}

#[tokio::test]
async fn test_live_failure_still_calls_delegate() {
    let (provider, directory) = orchestrator().await;
    directory
        .fail("get_user_by_principal", InjectedFailure::Transient)
        .await;

    let response = provider
        .execute_remediation(
            "case-1",
            &CaseAction::RevokeAllGrants,
            &RemediationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Success);
    assert!(!response.live.succeeded());
    assert_eq!(provider.delegate().calls().await.len(), 1);
    assert_eq!(directory.grants().await.len(), 2);
}

#[tokio::test]
async fn test_missing_case_subject_still_calls_delegate() {
    let (provider, _directory) = orchestrator().await;

    let response = provider
        .execute_remediation(
            "case-404",
            &CaseAction::FullRemediation,
            &RemediationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Error);
    match &response.live {
        LiveLeg::Failed { error } => assert!(error.contains("case-404")),
        other => panic!("unexpected live leg: {other:?}"),
    }
    assert_eq!(provider.delegate().calls().await.len(), 1);

    let response = provider
        .revoke_employee_access("emp-2", &RevokeScope::Sessions)
        .await
        .unwrap();
    assert!(matches!(response.live, LiveLeg::Failed { .. }));
    assert_eq!(provider.delegate().calls().await.len(), 2);
}

#[tokio::test]
async fn test_delegate_error_propagates_after_live_leg() {
    let directory = seeded_directory().await;
    let store = case_store().await;
    store.set_unavailable(true).await;
    let provider = OrchestratedCaseProvider::new(store, Arc::new(engine(directory.clone())));

    let result = provider
        .revoke_employee_access("emp-1", &RevokeScope::Grants)
        .await;

    assert!(matches!(result, Err(EngineError::Provider(_))));
}

#[tokio::test]
async fn test_global_app_removal_fans_out_to_active_users() {
    let directory = seeded_directory().await;
    directory.add_user(user("user-2", "bob@contoso.com", true)).await;
    let mut bob_grant = grant("g-bob", "sp-mailer", "Mail.Send");
    bob_grant.principal_id = Some("user-2".into());
    directory.add_grant(bob_grant).await;
    let mut carol_grant = grant("g-carol", "sp-mailer", "Mail.Send");
    carol_grant.principal_id = Some("user-3".into());
    directory.add_grant(carol_grant).await;

    let store = case_store().await;
    for (id, email, active) in [
        ("emp-1", SUBJECT_UPN, true),
        ("emp-3", "bob@contoso.com", true),
        ("emp-4", "carol@contoso.com", false),
    ] {
        store
            .add_app_user(
                "sp-mailer",
                AppUserRecord {
                    employee_id: id.into(),
                    email: Some(email.into()),
                    active,
                },
            )
            .await;
    }
    let provider = OrchestratedCaseProvider::new(store, Arc::new(engine(directory.clone())));

    let response = provider
        .global_app_removal("sp-mailer", "Mailer")
        .await
        .unwrap();

    match &response.live {
        LiveLeg::Batch { bundles } => {
            assert_eq!(bundles.len(), 2);
            assert!(bundles.iter().all(|b| b.bundle.success));
        }
        other => panic!("unexpected live leg: {other:?}"),
    }
    let remaining: Vec<String> = directory.grants().await.into_iter().map(|g| g.id).collect();
    assert_eq!(remaining, vec!["g-profile", "g-carol"]);
    assert_eq!(response.delegate.data["users_removed"], 2);
}

#[tokio::test]
async fn test_revoke_app_for_selected_users() {
    let directory = seeded_directory().await;
    let store = case_store().await;
    store
        .add_app_user(
            "sp-notes",
            AppUserRecord {
                employee_id: "emp-1".into(),
                email: Some(SUBJECT_UPN.into()),
                active: true,
            },
        )
        .await;
    let provider = OrchestratedCaseProvider::new(store, Arc::new(engine(directory.clone())));

    let response = provider
        .revoke_app_for_users("sp-notes", &["emp-1".to_string(), "emp-9".to_string()])
        .await
        .unwrap();

    match &response.live {
        LiveLeg::Batch { bundles } => {
            assert_eq!(bundles.len(), 1);
            assert_eq!(bundles[0].employee_id, "emp-1");
        }
        other => panic!("unexpected live leg: {other:?}"),
    }
    let remaining: Vec<String> = directory.grants().await.into_iter().map(|g| g.id).collect();
    assert_eq!(remaining, vec!["g-mail"]);
}

#[tokio::test]
async fn test_scan_case_records_findings() {
    let (provider, _directory) = orchestrator().await;

    let response = provider.scan_case("case-1").await.unwrap();

    match &response.live {
        LiveLeg::Scanned { result } => {
            assert!(result.findings.iter().all(|f| f.case_ref.as_deref() == Some("case-1")));
            assert!(!result.findings.is_empty());
        }
        other => panic!("unexpected live leg: {other:?}"),
    }
    let stored = provider.delegate().scan_for("case-1").await.unwrap();
    assert_eq!(stored.artifacts.len(), 3);

    let stats = provider.get_dashboard_stats().await.unwrap();
    assert_eq!(stats.total_cases, 2);
    assert!(stats.high_risk_findings >= 1);
}

#[tokio::test]
async fn test_unconfigured_engine_skips_live_leg() {
    let engine = OffboardingEngine::unconfigured(EngineConfig::default());
    let provider = OrchestratedCaseProvider::new(case_store().await, Arc::new(engine));

    let response = provider
        .execute_remediation(
            "case-1",
            &CaseAction::FullRemediation,
            &RemediationOptions {
                actor: Some("it-admin".into()),
                notes: None,
            },
        )
        .await
        .unwrap();

    match &response.live {
        LiveLeg::Completed { bundle } => {
            assert!(bundle.success);
            assert_eq!(bundle.outcomes[0].detail["skipped"], true);
        }
        other => panic!("unexpected live leg: {other:?}"),
    }
    assert_eq!(response.status, ResponseStatus::Success);
}

#[tokio::test]
async fn test_remediation_closes_resolved_findings() {
    let (provider, directory) = orchestrator().await;
    provider.scan_case("case-1").await.unwrap();
    let before = provider.get_dashboard_stats().await.unwrap();
    assert_eq!(before.open_findings, 2);

    let response = provider
        .execute_remediation(
            "case-1",
            &CaseAction::FullRemediation,
            &RemediationOptions::default(),
        )
        .await
        .unwrap();

    assert!(response.live.succeeded());
    assert!(directory.grants().await.is_empty());
    assert_eq!(response.resolutions.len(), 1);
    assert_eq!(
        response.resolutions[0].data["closed_findings"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );

    let stored = provider.delegate().scan_for("case-1").await.unwrap();
    let grants = stored
        .findings
        .iter()
        .find(|f| f.finding_type == FindingType::LingeringOAuthGrant)
        .unwrap();
    assert!(grants.closed_at.is_some());
    assert!(stored
        .artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::OAuthGrant)
        .all(|a| a.status == ArtifactStatus::Deleted));

    let after = provider.get_dashboard_stats().await.unwrap();
    assert_eq!(after.open_findings, 0);
}

#[tokio::test]
async fn test_partial_revocation_keeps_finding_open() {
    let (provider, _directory) = orchestrator().await;
    provider.scan_case("case-1").await.unwrap();

    provider
        .execute_remediation(
            "case-1",
            &CaseAction::RevokeGrant {
                grant_id: "g-mail".into(),
            },
            &RemediationOptions::default(),
        )
        .await
        .unwrap();

    let stored = provider.delegate().scan_for("case-1").await.unwrap();
    let grants = stored
        .findings
        .iter()
        .find(|f| f.finding_type == FindingType::LingeringOAuthGrant)
        .unwrap();
    assert!(grants.is_open());
    let mail = stored.artifacts.iter().find(|a| a.id == "g-mail").unwrap();
    assert_eq!(mail.status, ArtifactStatus::Deleted);
    let profile = stored.artifacts.iter().find(|a| a.id == "g-profile").unwrap();
    assert!(profile.is_active());
}

#[tokio::test]
async fn test_grant_revocation_runs_without_case_subject() {
    let (provider, directory) = orchestrator().await;

    // emp-2 has no email on record.
    let response = provider
        .execute_remediation(
            "case-2",
            &CaseAction::RevokeGrant {
                grant_id: "g-mail".into(),
            },
            &RemediationOptions::default(),
        )
        .await
        .unwrap();

    match &response.live {
        LiveLeg::Completed { bundle } => {
            assert!(bundle.success);
            assert_eq!(bundle.action, "revoke_oauth_grant");
        }
        other => panic!("unexpected live leg: {other:?}"),
    }
    let remaining: Vec<String> = directory.grants().await.into_iter().map(|g| g.id).collect();
    assert_eq!(remaining, vec!["g-profile"]);
    assert_eq!(directory.call_count("get_user_by_principal").await, 0);

    let response = provider
        .execute_remediation(
            "case-2",
            &CaseAction::RevokeSessions,
            &RemediationOptions::default(),
        )
        .await
        .unwrap();
    assert!(matches!(response.live, LiveLeg::Failed { .. }));
}
