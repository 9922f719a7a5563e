//! Sign-in audit log queries.
//!
//! `auditLogs/signIns` needs an Entra ID P1/P2 licence. Tenants without one
//! get a 403 that maps to [`crate::GraphError::UpstreamUnavailable`], which
//! callers report and move past.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::instrument;

use crate::models::SignInEvent;
use crate::{GraphClient, GraphResult};

/// Escapes a literal for use inside single quotes in an `OData` filter.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Builds the `$filter` expression for a principal's sign-ins.
pub(crate) fn sign_in_filter(principal: &str, since: Option<DateTime<Utc>>) -> String {
    let mut filter = format!("userPrincipalName eq '{}'", odata_literal(principal));
    if let Some(since) = since {
        filter.push_str(&format!(
            " and createdDateTime ge {}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    filter
}

impl GraphClient {
    /// Lists sign-ins for a principal, newest first, optionally bounded by
    /// a start time.
    #[instrument(skip(self))]
    pub async fn list_sign_ins(
        &self,
        principal: &str,
        since: Option<DateTime<Utc>>,
    ) -> GraphResult<Vec<SignInEvent>> {
        let mut url = self.url(&["auditLogs", "signIns"])?;
        url.query_pairs_mut()
            .append_pair("$filter", &sign_in_filter(principal, since))
            .append_pair("$orderby", "createdDateTime desc");

        self.get_all_pages("list_sign_ins", url.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filter_escapes_quotes() {
        assert_eq!(
            sign_in_filter("o'brien@contoso.com", None),
            "userPrincipalName eq 'o''brien@contoso.com'"
        );
    }

    #[test]
    fn test_filter_with_lower_bound() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(
            sign_in_filter("a@contoso.com", Some(since)),
            "userPrincipalName eq 'a@contoso.com' and createdDateTime ge 2024-03-01T08:30:00Z"
        );
    }
}
