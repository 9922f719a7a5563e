//! offboard - operator CLI for offboarding access remediation
//!
//! - Scan a departed user for lingering OAuth grants, app assignments,
//!   sessions and devices, with risk levels and findings
//! - Check whether any grant or assignment remains
//! - Revoke access, one action at a time or in full
//!
//! Connection settings come from `OFFBOARD_*` environment variables, read
//! from `.env` when present.

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;

use error::CliResult;

/// offboard - Access discovery and remediation for departed employees
#[derive(Parser)]
#[command(name = "offboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "OFFBOARD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover a user's remaining access and derive findings
    Scan(commands::scan::ScanArgs),

    /// Check whether a user still holds any grant or app assignment
    HasAccess(commands::access::HasAccessArgs),

    /// Revoke access in the identity provider
    Remediate(commands::remediate::RemediateArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_json);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args).await,
        Commands::HasAccess(args) => commands::access::execute(args).await,
        Commands::Remediate(args) => commands::remediate::execute(args).await,
    }
}
