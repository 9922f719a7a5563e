//! Remediate command - revoke access in the identity provider

use clap::{Args, Subcommand};
use offboard_engine::{BundleResult, RemediationAction};

use crate::commands::engine_from_env;
use crate::error::{CliError, CliResult};

/// Arguments for the remediate command
#[derive(Args)]
pub struct RemediateArgs {
    #[command(subcommand)]
    pub action: RemediateAction,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum RemediateAction {
    /// Delete one delegated permission grant
    Grant { grant_id: String },

    /// Delete every delegated grant the user holds
    AllGrants { principal: String },

    /// Delete the user's grants to one app (object id or application id)
    AppGrants { principal: String, app_id: String },

    /// Replace a grant's scopes
    Scopes {
        grant_id: String,
        #[arg(required = true)]
        scopes: Vec<String>,
    },

    /// Revoke every sign-in session of the user
    Sessions { principal: String },

    /// Remove the user's enterprise app role assignments
    AppRoles {
        principal: String,
        /// Only assignments on this resource service principal
        #[arg(long)]
        app_id: Option<String>,
    },

    /// Grants, then app role assignments, then sessions
    Full { principal: String },
}

impl From<RemediateAction> for RemediationAction {
    fn from(action: RemediateAction) -> Self {
        match action {
            RemediateAction::Grant { grant_id } => Self::RevokeOauthGrant { grant_id },
            RemediateAction::AllGrants { principal } => Self::RevokeAllOauthGrants { principal },
            RemediateAction::AppGrants { principal, app_id } => {
                Self::RevokeOauthGrantsForApp { principal, app_id }
            }
            RemediateAction::Scopes { grant_id, scopes } => {
                Self::UpdateGrantScopes { grant_id, scopes }
            }
            RemediateAction::Sessions { principal } => Self::RevokeSignInSessions { principal },
            RemediateAction::AppRoles { principal, app_id } => {
                Self::RevokeAppRoleAssignments { principal, app_id }
            }
            RemediateAction::Full { principal } => Self::FullRemediation { principal },
        }
    }
}

/// Execute the remediate command
pub async fn execute(args: RemediateArgs) -> CliResult<()> {
    let engine = engine_from_env()?;
    let action = RemediationAction::from(args.action);

    let bundle = engine.remediation().execute(&action).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
    } else {
        print_bundle(&bundle);
    }

    if bundle.success {
        Ok(())
    } else {
        Err(CliError::RemediationIncomplete {
            failed: bundle.failed_count(),
            total: bundle.outcomes.len(),
        })
    }
}

fn print_bundle(bundle: &BundleResult) {
    println!();
    println!(
        "{}: {} succeeded, {} failed",
        bundle.action,
        bundle.succeeded_count(),
        bundle.failed_count()
    );
    for o in &bundle.outcomes {
        let mark = if o.success { "ok  " } else { "FAIL" };
        let detail: Vec<String> = o
            .detail
            .iter()
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{k}={s}"),
                None => format!("{k}={v}"),
            })
            .collect();
        println!("  {mark} {:<32} {}", o.action, detail.join(" "));
    }
}
