//! User resolution, registered devices and session revocation.

use tracing::{info, instrument};

use crate::models::{GraphUser, RegisteredDevice, RevokeSessionsResponse};
use crate::{GraphClient, GraphResult};

/// User fields to select from Graph API.
const USER_SELECT_FIELDS: &str = "id,displayName,userPrincipalName,mail,accountEnabled";

const DEVICE_SELECT_FIELDS: &str = "id,deviceId,displayName,operatingSystem,accountEnabled,\
    registrationDateTime,approximateLastSignInDateTime";

impl GraphClient {
    /// Resolves a user by UPN (or object id). A missing user is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn get_user_by_principal(&self, principal: &str) -> GraphResult<Option<GraphUser>> {
        let mut url = self.url(&["users", principal])?;
        url.query_pairs_mut()
            .append_pair("$select", USER_SELECT_FIELDS);

        self.get_optional("get_user_by_principal", url.as_str())
            .await
    }

    /// Lists devices registered by the user.
    #[instrument(skip(self))]
    pub async fn list_registered_devices(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<RegisteredDevice>> {
        let mut url = self.url(&["users", subject_id, "registeredDevices"])?;
        url.query_pairs_mut()
            .append_pair("$select", DEVICE_SELECT_FIELDS);

        self.get_all_pages("list_registered_devices", url.as_str())
            .await
    }

    /// Invalidates every refresh token and session cookie for the user.
    ///
    /// Returns whether Graph confirmed the revocation. There is no partial
    /// state: any failure is an error.
    #[instrument(skip(self))]
    pub async fn revoke_sign_in_sessions(&self, subject_id: &str) -> GraphResult<bool> {
        let url = self.url(&["users", subject_id, "revokeSignInSessions"])?;

        let response: RevokeSessionsResponse = self
            .post_json(
                "revoke_sign_in_sessions",
                url.as_str(),
                &serde_json::json!({}),
            )
            .await?;

        info!(subject_id, confirmed = response.value, "Sign-in sessions revoked");
        Ok(response.value)
    }
}
