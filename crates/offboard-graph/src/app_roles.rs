//! App-role assignments held by a user.

use tracing::{info, instrument};

use crate::models::AppRoleAssignment;
use crate::{GraphClient, GraphResult};

impl GraphClient {
    /// Lists the user's app-role assignments.
    #[instrument(skip(self))]
    pub async fn list_user_app_role_assignments(
        &self,
        subject_id: &str,
    ) -> GraphResult<Vec<AppRoleAssignment>> {
        let url = self.url(&["users", subject_id, "appRoleAssignments"])?;
        self.get_all_pages("list_user_app_role_assignments", url.as_str())
            .await
    }

    /// True when the user holds at least one app-role assignment. Reads a
    /// single one-item page.
    #[instrument(skip(self))]
    pub async fn has_app_role_assignments(&self, subject_id: &str) -> GraphResult<bool> {
        let mut url = self.url(&["users", subject_id, "appRoleAssignments"])?;
        url.query_pairs_mut().append_pair("$top", "1");
        let page: Vec<AppRoleAssignment> = self
            .get_first_page("list_user_app_role_assignments", url.as_str())
            .await?;
        Ok(!page.is_empty())
    }

    /// Removes an assignment. An assignment that is already gone counts as
    /// removed.
    #[instrument(skip(self))]
    pub async fn delete_app_role_assignment(
        &self,
        subject_id: &str,
        assignment_id: &str,
    ) -> GraphResult<()> {
        let url = self.url(&["users", subject_id, "appRoleAssignments", assignment_id])?;
        self.delete_idempotent("delete_app_role_assignment", url.as_str())
            .await?;
        info!(subject_id, assignment_id, "App role assignment removed");
        Ok(())
    }
}
