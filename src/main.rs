mod cli;

use clap::Parser;
use cli::{Cli, Commands, ReconcileArgs};
use gradebox::config::Config;
use gradebox::ledger::Ledger;
use gradebox::observability::init_tracing;
use gradebox::storage::FjallStore;
use std::sync::Arc;
use tracing::info;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(cli.log_format, &config.telemetry.log_filter);

    match cli.command {
        Commands::Server(args) => gradebox::api::run(config, args.address).await?,
        Commands::Reconcile(args) => reconcile(config, args).await?,
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

/// Offline audit. Exits non-zero when any user does not reconcile.
async fn reconcile(config: Config, args: ReconcileArgs) -> Result<(), AnyError> {
    let path = args.fjall_path.unwrap_or(config.server.fjall_path);
    info!(path = %path.display(), "Reconciling ledger");

    let store = Arc::new(FjallStore::open(&path)?);
    let reports = Ledger::new(store).reconcile_all().await?;

    let mut mismatches = 0usize;
    for report in &reports {
        if !report.consistent {
            mismatches += 1;
        }
        if args.verbose || !report.consistent {
            println!("{}", serde_json::to_string(report)?);
        }
    }
    info!(users = reports.len(), mismatches, "Reconciliation finished");

    if mismatches > 0 {
        return Err(format!("{mismatches} of {} users do not reconcile", reports.len()).into());
    }
    Ok(())
}
