//! Scan command - discover lingering access for a departed user

use chrono::{DateTime, Utc};
use clap::Args;
use offboard_engine::{DiscoveryContext, DiscoveryResult};

use crate::commands::engine_from_env;
use crate::error::{CliError, CliResult};

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// User principal name (or object id) to scan
    pub principal: String,

    /// Case reference stamped on artifacts and findings
    #[arg(long)]
    pub case_ref: Option<String>,

    /// Effective offboarding date (RFC 3339)
    #[arg(long)]
    pub offboarded_at: Option<DateTime<Utc>>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the scan command
pub async fn execute(args: ScanArgs) -> CliResult<()> {
    let engine = engine_from_env()?;
    if !engine.is_configured() {
        return Err(CliError::NotConfigured);
    }

    let context = DiscoveryContext {
        case_ref: args.case_ref,
        offboarded_at: args.offboarded_at,
    };
    let result = engine
        .discovery()
        .discover_user_access(&args.principal, &context)
        .await;

    if let Some(reason) = &result.error {
        return Err(CliError::Discovery {
            principal: args.principal,
            reason: reason.clone(),
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &DiscoveryResult) {
    if let Some(identity) = &result.identity {
        println!();
        println!(
            "{} ({}) - account {}",
            identity.principal_name,
            identity.provider_id,
            if identity.enabled { "enabled" } else { "disabled" }
        );
    }

    println!();
    println!("{:<10} {:<20} {:<32} {}", "RISK", "KIND", "APP", "SCOPES");
    for a in &result.artifacts {
        println!(
            "{:<10} {:<20} {:<32} {}",
            a.risk_level.to_string(),
            format!("{:?}", a.kind),
            truncate(&a.app_display_name, 32),
            a.scopes.join(" ")
        );
    }
    if result.artifacts.is_empty() {
        println!("(no access artifacts found)");
    }

    if !result.findings.is_empty() {
        println!();
        println!("Findings:");
        for f in &result.findings {
            println!("  [{}] {}: {}", f.severity, f.finding_type, f.summary);
        }
    }

    for e in &result.source_errors {
        eprintln!("warning: {} unavailable ({:?}): {}", e.source, e.kind, e.message);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
