//! Delegated permission grants (`oauth2PermissionGrants`).

use tracing::{info, instrument};

use crate::models::OAuthGrant;
use crate::{GraphClient, GraphResult};

impl GraphClient {
    /// Lists every delegated grant the user has consented to.
    #[instrument(skip(self))]
    pub async fn list_user_oauth_grants(&self, subject_id: &str) -> GraphResult<Vec<OAuthGrant>> {
        let url = self.url(&["users", subject_id, "oauth2PermissionGrants"])?;
        self.get_all_pages("list_user_oauth_grants", url.as_str())
            .await
    }

    /// True when the user holds at least one grant. Reads a single
    /// one-item page.
    #[instrument(skip(self))]
    pub async fn has_oauth_grants(&self, subject_id: &str) -> GraphResult<bool> {
        let mut url = self.url(&["users", subject_id, "oauth2PermissionGrants"])?;
        url.query_pairs_mut().append_pair("$top", "1");
        let page: Vec<OAuthGrant> = self
            .get_first_page("list_user_oauth_grants", url.as_str())
            .await?;
        Ok(!page.is_empty())
    }

    /// Deletes a grant. A grant that is already gone counts as deleted.
    #[instrument(skip(self))]
    pub async fn delete_oauth_grant(&self, grant_id: &str) -> GraphResult<()> {
        let url = self.url(&["oauth2PermissionGrants", grant_id])?;
        self.delete_idempotent("delete_oauth_grant", url.as_str())
            .await?;
        info!(grant_id, "OAuth grant deleted");
        Ok(())
    }

    /// Replaces the grant's scope set. Unlike delete, a missing grant is an
    /// error: there is nothing to scope down.
    #[instrument(skip(self))]
    pub async fn update_oauth_grant_scopes(&self, grant_id: &str, scope: &str) -> GraphResult<()> {
        let url = self.url(&["oauth2PermissionGrants", grant_id])?;
        self.patch(
            "update_oauth_grant_scopes",
            url.as_str(),
            &serde_json::json!({ "scope": scope }),
        )
        .await?;
        info!(grant_id, scope, "OAuth grant scopes updated");
        Ok(())
    }
}
