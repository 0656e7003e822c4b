use clap::{Parser, Subcommand};
use gradebox::observability::LogFormat;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gradebox")]
#[command(about = "GradeBox points ledger and grading gateway", long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Replay every user's transaction log against their balance
    Reconcile(ReconcileArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct ReconcileArgs {
    /// Store directory (defaults to server.fjall_path)
    #[arg(long)]
    pub fjall_path: Option<PathBuf>,

    /// Print every user, not only mismatches
    #[arg(long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reconcile_with_json_logs() {
        let cli = Cli::parse_from([
            "gradebox",
            "reconcile",
            "--fjall-path",
            "/tmp/ledger",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Reconcile(args) => {
                assert_eq!(args.fjall_path, Some(PathBuf::from("/tmp/ledger")));
                assert!(!args.verbose);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_server_address_is_optional() {
        let cli = Cli::parse_from(["gradebox", "server"]);
        match cli.command {
            Commands::Server(args) => assert!(args.address.is_none()),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
