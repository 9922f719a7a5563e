//! In-memory directory for tests and local runs.
//!
//! Honours the same contract as [`GraphClient`](crate::GraphClient):
//! idempotent deletes, `NotFound` on scope updates of missing grants,
//! `Ok(None)` for absent users and apps. Every call is recorded so tests
//! can assert ordering and absence of side effects, and failures can be
//! injected per operation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::directory::DirectoryApi;
use crate::error::required_permission;
use crate::models::{
    AppRoleAssignment, GraphUser, OAuthGrant, RegisteredDevice, ServicePrincipal, SignInEvent,
};
use crate::{GraphError, GraphResult};

/// Failure to inject for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    PermissionDenied,
    RateLimited,
    Transient,
    UpstreamUnavailable,
    Unknown,
}

impl InjectedFailure {
    fn to_error(self, operation: &'static str) -> GraphError {
        match self {
            Self::PermissionDenied => GraphError::PermissionDenied {
                operation,
                permission: required_permission(operation),
                code: "Authorization_RequestDenied".to_string(),
                message: "Insufficient privileges to complete the operation.".to_string(),
            },
            Self::RateLimited => GraphError::RateLimited {
                operation,
                attempts: 1,
                retry_after_secs: Some(30),
            },
            Self::Transient => GraphError::Transient {
                operation,
                status: 503,
            },
            Self::UpstreamUnavailable => GraphError::UpstreamUnavailable {
                operation,
                code: "Authentication_RequestFromNonPremiumTenantOrB2CTenant".to_string(),
                message: "Tenant does not have a premium license".to_string(),
            },
            Self::Unknown => GraphError::Api {
                operation,
                status: 500,
                code: "InternalServerError".to_string(),
                message: "injected failure".to_string(),
            },
        }
    }
}

/// A recorded call against the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryCall {
    pub operation: &'static str,
    pub target: String,
}

/// In-memory [`DirectoryApi`] implementation.
#[derive(Debug)]
pub struct InMemoryDirectory {
    users: RwLock<Vec<GraphUser>>,
    grants: RwLock<Vec<OAuthGrant>>,
    assignments: RwLock<Vec<AppRoleAssignment>>,
    sign_ins: RwLock<Vec<SignInEvent>>,
    devices: RwLock<HashMap<String, Vec<RegisteredDevice>>>,
    service_principals: RwLock<HashMap<String, ServicePrincipal>>,
    failures: RwLock<HashMap<&'static str, InjectedFailure>>,
    sessions_confirmed: RwLock<bool>,
    calls: RwLock<Vec<DirectoryCall>>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self {
            users: RwLock::default(),
            grants: RwLock::default(),
            assignments: RwLock::default(),
            sign_ins: RwLock::default(),
            devices: RwLock::default(),
            service_principals: RwLock::default(),
            failures: RwLock::default(),
            sessions_confirmed: RwLock::new(true),
            calls: RwLock::default(),
        }
    }
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: GraphUser) {
        self.users.write().await.push(user);
    }

    pub async fn add_grant(&self, grant: OAuthGrant) {
        self.grants.write().await.push(grant);
    }

    pub async fn add_app_role_assignment(&self, assignment: AppRoleAssignment) {
        self.assignments.write().await.push(assignment);
    }

    pub async fn add_sign_in(&self, event: SignInEvent) {
        self.sign_ins.write().await.push(event);
    }

    pub async fn add_device(&self, subject_id: &str, device: RegisteredDevice) {
        self.devices
            .write()
            .await
            .entry(subject_id.to_string())
            .or_default()
            .push(device);
    }

    pub async fn add_service_principal(&self, sp: ServicePrincipal) {
        self.service_principals
            .write()
            .await
            .insert(sp.id.clone(), sp);
    }

    /// Makes every subsequent call to `operation` fail.
    pub async fn fail(&self, operation: &'static str, failure: InjectedFailure) {
        self.failures.write().await.insert(operation, failure);
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Controls the `value` returned by session revocation.
    pub async fn set_sessions_confirmed(&self, confirmed: bool) {
        *self.sessions_confirmed.write().await = confirmed;
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls made to `operation`.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Grants still present.
    pub async fn grants(&self) -> Vec<OAuthGrant> {
        self.grants.read().await.clone()
    }

    /// Role assignments still present.
    pub async fn app_role_assignments(&self) -> Vec<AppRoleAssignment> {
        self.assignments.read().await.clone()
    }

    async fn enter(&self, operation: &'static str, target: &str) -> GraphResult<()> {
        self.calls.write().await.push(DirectoryCall {
            operation,
            target: target.to_string(),
        });
        match self.failures.read().await.get(operation) {
            Some(failure) => Err(failure.to_error(operation)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryApi for InMemoryDirectory {
    async fn get_user_by_principal(&self, principal: &str) -> GraphResult<Option<GraphUser>> {
        self.enter("get_user_by_principal", principal).await?;
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.id == principal || u.user_principal_name.eq_ignore_ascii_case(principal))
            .cloned())
    }

    async fn list_user_oauth_grants(&self, subject_id: &str) -> GraphResult<Vec<OAuthGrant>> {
        self.enter("list_user_oauth_grants", subject_id).await?;
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .filter(|g| g.principal_id.as_deref() == Some(subject_id))
            .cloned()
            .collect())
    }

    async fn list_user_app_role_assignments(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<AppRoleAssignment>> {
        self.enter("list_user_app_role_assignments", subject_id)
            .await?;
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| a.principal_id == subject_id)
            .cloned()
            .collect())
    }

    async fn list_sign_ins(
        &self,
        principal: &str,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Vec<SignInEvent>> {
        self.enter("list_sign_ins", principal).await?;
        let mut events: Vec<SignInEvent> = self
            .sign_ins
            .read()
            .await
            .iter()
            .filter(|e| {
                e.user_principal_name
                    .as_deref()
                    .is_some_and(|upn| upn.eq_ignore_ascii_case(principal))
            })
            .filter(|e| since.map_or(true, |s| e.created_date_time >= s))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_date_time.cmp(&a.created_date_time));
        Ok(events)
    }

    async fn list_registered_devices(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<RegisteredDevice>> {
        self.enter("list_registered_devices", subject_id).await?;
        Ok(self
            .devices
            .read()
            .await
            .get(subject_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_service_principal(&self, id: &str) -> GraphResult<Option<ServicePrincipal>> {
        self.enter("get_service_principal", id).await?;
        Ok(self.service_principals.read().await.get(id).cloned())
    }

    async fn get_service_principal_by_app_id(
        &self,
        app_id: &str,
    ) -> GraphResult<Option<ServicePrincipal>> {
        self.enter("get_service_principal_by_app_id", app_id).await?;
        Ok(self
            .service_principals
            .read()
            .await
            .values()
            .find(|sp| sp.app_id.as_deref() == Some(app_id))
            .cloned())
    }

    async fn delete_oauth_grant(&self, grant_id: &str) -> GraphResult<()> {
        self.enter("delete_oauth_grant", grant_id).await?;
        self.grants.write().await.retain(|g| g.id != grant_id);
        Ok(())
    }

    async fn delete_app_role_assignment(
        &self,
        subject_id: &str,
        assignment_id: &str,
    ) -> GraphResult<()> {
        self.enter("delete_app_role_assignment", assignment_id)
            .await?;
        self.assignments
            .write()
            .await
            .retain(|a| !(a.id == assignment_id && a.principal_id == subject_id));
        Ok(())
    }

    async fn update_oauth_grant_scopes(&self, grant_id: &str, scope: &str) -> GraphResult<()> {
        self.enter("update_oauth_grant_scopes", grant_id).await?;
        let mut grants = self.grants.write().await;
        match grants.iter_mut().find(|g| g.id == grant_id) {
            Some(grant) => {
                grant.scope = Some(scope.to_string());
                Ok(())
            }
            None => Err(GraphError::NotFound {
                operation: "update_oauth_grant_scopes",
                code: "Request_ResourceNotFound".to_string(),
            }),
        }
    }

    async fn revoke_sign_in_sessions(&self, subject_id: &str) -> GraphResult<bool> {
        self.enter("revoke_sign_in_sessions", subject_id).await?;
        Ok(*self.sessions_confirmed.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(id: &str, principal: &str) -> OAuthGrant {
        OAuthGrant {
            id: id.to_string(),
            client_id: "sp-client".to_string(),
            consent_type: "Principal".to_string(),
            principal_id: Some(principal.to_string()),
            resource_id: "sp-graph".to_string(),
            scope: Some("User.Read".to_string()),
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = InMemoryDirectory::new();
        dir.add_grant(grant("g1", "u1")).await;

        assert!(dir.delete_oauth_grant("g1").await.is_ok());
        assert!(dir.delete_oauth_grant("g1").await.is_ok());
        assert!(dir.grants().await.is_empty());
        assert_eq!(dir.call_count("delete_oauth_grant").await, 2);
    }

    #[tokio::test]
    async fn test_update_missing_grant_is_not_found() {
        let dir = InMemoryDirectory::new();
        let err = dir
            .update_oauth_grant_scopes("missing", "User.Read")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let dir = InMemoryDirectory::new();
        dir.fail("list_user_oauth_grants", InjectedFailure::PermissionDenied)
            .await;
        let err = dir.list_user_oauth_grants("u1").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::PermissionDenied);

        dir.clear_failures().await;
        assert!(dir.list_user_oauth_grants("u1").await.is_ok());
    }
}
