//! Shared fixtures for offboard-engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use offboard_engine::{EngineConfig, OffboardingEngine};
use offboard_graph::{
    AppRole, AppRoleAssignment, GraphUser, InMemoryDirectory, OAuthGrant, RegisteredDevice,
    ServicePrincipal, SignInEvent, SignInStatus,
};

pub const SUBJECT_ID: &str = "user-1";
pub const SUBJECT_UPN: &str = "jane.doe@contoso.com";

pub fn user(id: &str, upn: &str, enabled: bool) -> GraphUser {
    GraphUser {
        id: id.to_string(),
        display_name: Some("Jane Doe".to_string()),
        user_principal_name: upn.to_string(),
        mail: Some(upn.to_string()),
        account_enabled: Some(enabled),
    }
}

pub fn grant(id: &str, client_id: &str, scope: &str) -> OAuthGrant {
    OAuthGrant {
        id: id.to_string(),
        client_id: client_id.to_string(),
        consent_type: "Principal".to_string(),
        principal_id: Some(SUBJECT_ID.to_string()),
        resource_id: "sp-graph".to_string(),
        scope: Some(scope.to_string()),
    }
}

pub fn assignment(id: &str, resource_id: &str, app_role_id: &str) -> AppRoleAssignment {
    AppRoleAssignment {
        id: id.to_string(),
        app_role_id: app_role_id.to_string(),
        principal_id: SUBJECT_ID.to_string(),
        resource_id: resource_id.to_string(),
        resource_display_name: None,
        created_date_time: None,
    }
}

pub fn service_principal(id: &str, app_id: &str, name: &str) -> ServicePrincipal {
    ServicePrincipal {
        id: id.to_string(),
        app_id: Some(app_id.to_string()),
        display_name: Some(name.to_string()),
        app_roles: vec![AppRole {
            id: "role-admin".to_string(),
            value: Some("Admin".to_string()),
            display_name: Some("Administrator".to_string()),
        }],
    }
}

pub fn sign_in(id: &str, app_id: &str, at: DateTime<Utc>) -> SignInEvent {
    SignInEvent {
        id: id.to_string(),
        created_date_time: at,
        user_principal_name: Some(SUBJECT_UPN.to_string()),
        app_id: Some(app_id.to_string()),
        app_display_name: Some(format!("App {app_id}")),
        ip_address: Some("203.0.113.7".to_string()),
        is_interactive: Some(true),
        status: SignInStatus::default(),
        risk_level_aggregated: None,
        risk_state: None,
    }
}

pub fn device(id: &str) -> RegisteredDevice {
    RegisteredDevice {
        id: id.to_string(),
        device_id: Some(format!("dev-{id}")),
        display_name: Some("Jane's laptop".to_string()),
        operating_system: Some("Windows".to_string()),
        account_enabled: Some(true),
        registration_date_time: None,
        approximate_last_sign_in_date_time: None,
    }
}

/// Directory with one disabled subject holding two grants and one
/// assignment.
pub async fn seeded_directory() -> Arc<InMemoryDirectory> {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_user(user(SUBJECT_ID, SUBJECT_UPN, false)).await;
    directory
        .add_grant(grant("g-mail", "sp-mailer", "Mail.Send Files.ReadWrite"))
        .await;
    directory
        .add_grant(grant("g-profile", "sp-notes", "openid profile User.Read"))
        .await;
    directory
        .add_app_role_assignment(assignment("ra-1", "sp-crm", "role-admin"))
        .await;
    directory
        .add_service_principal(service_principal("sp-mailer", "app-mailer", "Mailer"))
        .await;
    directory
        .add_service_principal(service_principal("sp-crm", "app-crm", "CRM"))
        .await;
    directory
}

pub fn engine(directory: Arc<InMemoryDirectory>) -> OffboardingEngine {
    OffboardingEngine::with_directory(directory, EngineConfig::default())
}
