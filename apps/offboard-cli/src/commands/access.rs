//! Has-access command - quick check for any remaining grant or assignment

use clap::Args;
use serde::Serialize;

use crate::commands::engine_from_env;
use crate::error::{CliError, CliResult};

/// Arguments for the has-access command
#[derive(Args)]
pub struct HasAccessArgs {
    /// User principal name (or object id) to check
    pub principal: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct HasAccessOutput<'a> {
    principal: &'a str,
    has_active_access: bool,
}

/// Execute the has-access command
pub async fn execute(args: HasAccessArgs) -> CliResult<()> {
    let engine = engine_from_env()?;
    if !engine.is_configured() {
        return Err(CliError::NotConfigured);
    }

    let has_active_access = engine
        .discovery()
        .has_active_access(&args.principal)
        .await?;

    if args.json {
        let output = HasAccessOutput {
            principal: &args.principal,
            has_active_access,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if has_active_access {
        println!("{} still holds active grants or app assignments", args.principal);
    } else {
        println!("{} has no remaining grants or app assignments", args.principal);
    }
    Ok(())
}
