//! The operations the offboarding engine needs from an identity provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AppRoleAssignment, GraphUser, OAuthGrant, RegisteredDevice, ServicePrincipal, SignInEvent,
};
use crate::{GraphClient, GraphResult};

/// Identity-provider surface used by discovery and remediation.
///
/// Contract shared by every implementation:
/// - lookups return `Ok(None)` for absent objects;
/// - list operations return fully materialized, ordered, de-duplicated
///   sequences;
/// - deletes succeed when the object is already gone;
/// - `update_oauth_grant_scopes` fails with `NotFound` for a missing grant.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn get_user_by_principal(&self, principal: &str) -> GraphResult<Option<GraphUser>>;

    async fn list_user_oauth_grants(&self, subject_id: &str) -> GraphResult<Vec<OAuthGrant>>;

    async fn list_user_app_role_assignments(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<AppRoleAssignment>>;

    /// Existence check that need not read every page.
    async fn has_oauth_grants(&self, subject_id: &str) -> GraphResult<bool> {
        Ok(!self.list_user_oauth_grants(subject_id).await?.is_empty())
    }

    async fn has_app_role_assignments(&self, subject_id: &str) -> GraphResult<bool> {
        Ok(!self
            .list_user_app_role_assignments(subject_id)
            .await?
            .is_empty())
    }

    async fn list_sign_ins(
        &self,
        principal: &str,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Vec<SignInEvent>>;

    async fn list_registered_devices(&self, subject_id: &str)
        -> GraphResult<Vec<RegisteredDevice>>;

    async fn get_service_principal(&self, id: &str) -> GraphResult<Option<ServicePrincipal>>;

    async fn get_service_principal_by_app_id(
        &self,
        app_id: &str,
    ) -> GraphResult<Option<ServicePrincipal>>;

    async fn delete_oauth_grant(&self, grant_id: &str) -> GraphResult<()>;

    async fn delete_app_role_assignment(
        &self,
        subject_id: &str,
        assignment_id: &str,
    ) -> GraphResult<()>;

    async fn update_oauth_grant_scopes(&self, grant_id: &str, scope: &str) -> GraphResult<()>;

    async fn revoke_sign_in_sessions(&self, subject_id: &str) -> GraphResult<bool>;
}

#[async_trait]
impl DirectoryApi for GraphClient {
    async fn get_user_by_principal(&self, principal: &str) -> GraphResult<Option<GraphUser>> {
        GraphClient::get_user_by_principal(self, principal).await
    }

    async fn list_user_oauth_grants(&self, subject_id: &str) -> GraphResult<Vec<OAuthGrant>> {
        GraphClient::list_user_oauth_grants(self, subject_id).await
    }

    async fn list_user_app_role_assignments(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<AppRoleAssignment>> {
        GraphClient::list_user_app_role_assignments(self, subject_id).await
    }

    async fn has_oauth_grants(&self, subject_id: &str) -> GraphResult<bool> {
        GraphClient::has_oauth_grants(self, subject_id).await
    }

    async fn has_app_role_assignments(&self, subject_id: &str) -> GraphResult<bool> {
        GraphClient::has_app_role_assignments(self, subject_id).await
    }

    async fn list_sign_ins(
        &self,
        principal: &str,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Vec<SignInEvent>> {
        GraphClient::list_sign_ins(self, principal, since).await
    }

    async fn list_registered_devices(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<RegisteredDevice>> {
        GraphClient::list_registered_devices(self, subject_id).await
    }

    async fn get_service_principal(&self, id: &str) -> GraphResult<Option<ServicePrincipal>> {
        GraphClient::get_service_principal(self, id).await
    }

    async fn get_service_principal_by_app_id(
        &self,
        app_id: &str,
    ) -> GraphResult<Option<ServicePrincipal>> {
        GraphClient::get_service_principal_by_app_id(self, app_id).await
    }

    async fn delete_oauth_grant(&self, grant_id: &str) -> GraphResult<()> {
        GraphClient::delete_oauth_grant(self, grant_id).await
    }

    async fn delete_app_role_assignment(
        &self,
        subject_id: &str,
        assignment_id: &str,
    ) -> GraphResult<()> {
        GraphClient::delete_app_role_assignment(self, subject_id, assignment_id).await
    }

    async fn update_oauth_grant_scopes(&self, grant_id: &str, scope: &str) -> GraphResult<()> {
        GraphClient::update_oauth_grant_scopes(self, grant_id, scope).await
    }

    async fn revoke_sign_in_sessions(&self, subject_id: &str) -> GraphResult<bool> {
        GraphClient::revoke_sign_in_sessions(self, subject_id).await
    }
}
