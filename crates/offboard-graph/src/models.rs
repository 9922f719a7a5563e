//! Typed views of the Graph resources the engine reads.
//!
//! Only the fields discovery and remediation use are modelled; everything
//! else in the upstream payload is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything returned in a paginated collection that has a stable object id.
pub trait GraphObject {
    fn object_id(&self) -> &str;
}

/// One page of a Graph collection.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// A directory user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub user_principal_name: String,
    #[serde(default)]
    pub mail: Option<String>,
    /// Missing means enabled: Graph omits it when `$select` does not ask for it.
    #[serde(default)]
    pub account_enabled: Option<bool>,
}

impl GraphUser {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.account_enabled.unwrap_or(true)
    }
}

/// Delegated permission grant (`oauth2PermissionGrant`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthGrant {
    pub id: String,
    /// Object id of the client service principal.
    pub client_id: String,
    /// `Principal` (one user) or `AllPrincipals` (tenant-wide admin consent).
    pub consent_type: String,
    #[serde(default)]
    pub principal_id: Option<String>,
    /// Object id of the resource service principal (e.g. Microsoft Graph).
    pub resource_id: String,
    /// Space-delimited scope string.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthGrant {
    /// Scopes in first-seen order, without blanks or duplicates.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        split_scopes(self.scope.as_deref().unwrap_or_default())
    }

    #[must_use]
    pub fn is_admin_consent(&self) -> bool {
        self.consent_type.eq_ignore_ascii_case("AllPrincipals")
    }
}

/// Splits a space-delimited scope string into an ordered, de-duplicated list.
#[must_use]
pub fn split_scopes(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for part in scope.split_whitespace() {
        if !scopes.iter().any(|s| s == part) {
            scopes.push(part.to_string());
        }
    }
    scopes
}

/// An app-role assignment granted to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    pub id: String,
    /// All-zero GUID means "default access", no specific role.
    pub app_role_id: String,
    pub principal_id: String,
    /// Object id of the resource service principal.
    pub resource_id: String,
    #[serde(default)]
    pub resource_display_name: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
}

impl AppRoleAssignment {
    pub const DEFAULT_ACCESS_ROLE: &'static str = "00000000-0000-0000-0000-000000000000";

    #[must_use]
    pub fn is_default_access(&self) -> bool {
        self.app_role_id == Self::DEFAULT_ACCESS_ROLE
    }
}

/// A role defined by an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRole {
    pub id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Display metadata for an application's service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub id: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub app_roles: Vec<AppRole>,
}

impl ServicePrincipal {
    /// Value of the role with the given id, if the app defines it.
    #[must_use]
    pub fn role_value(&self, app_role_id: &str) -> Option<&str> {
        self.app_roles
            .iter()
            .find(|r| r.id == app_role_id)
            .and_then(|r| r.value.as_deref().or(r.display_name.as_deref()))
    }
}

/// Result status of a sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInStatus {
    /// `0` means success.
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Entry from the sign-in audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInEvent {
    pub id: String,
    pub created_date_time: DateTime<Utc>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_display_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub is_interactive: Option<bool>,
    #[serde(default)]
    pub status: SignInStatus,
    /// `none`, `low`, `medium`, `high`, `hidden`, `unknownFutureValue`.
    #[serde(default)]
    pub risk_level_aggregated: Option<String>,
    /// `none`, `atRisk`, `confirmedCompromised`, `remediated`, `dismissed`, ...
    #[serde(default)]
    pub risk_state: Option<String>,
}

impl SignInEvent {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.error_code == 0
    }

    /// True if the provider flagged the sign-in as risky.
    #[must_use]
    pub fn is_risky(&self) -> bool {
        let risky_level = matches!(
            self.risk_level_aggregated.as_deref(),
            Some("medium" | "high")
        );
        let risky_state = matches!(
            self.risk_state.as_deref(),
            Some("atRisk" | "confirmedCompromised")
        );
        risky_level || risky_state
    }
}

/// Device registered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDevice {
    pub id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub account_enabled: Option<bool>,
    #[serde(default)]
    pub registration_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approximate_last_sign_in_date_time: Option<DateTime<Utc>>,
}

/// Response to `POST /users/{id}/revokeSignInSessions`.
#[derive(Debug, Deserialize)]
pub struct RevokeSessionsResponse {
    #[serde(default)]
    pub value: bool,
}

/// Raw upstream record, one variant per artifact source. Discovery
/// normalizes these into its own artifact type; nothing downstream of the
/// engine sees Graph JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DirectoryRecord {
    Grant(OAuthGrant),
    RoleAssignment(AppRoleAssignment),
    SignIn(SignInEvent),
    Device(RegisteredDevice),
}

macro_rules! impl_graph_object {
    ($($ty:ty),*) => {
        $(impl GraphObject for $ty {
            fn object_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

impl_graph_object!(
    GraphUser,
    OAuthGrant,
    AppRoleAssignment,
    ServicePrincipal,
    SignInEvent,
    RegisteredDevice
);
