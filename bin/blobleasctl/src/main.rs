//! ---
//! bl_section: "05-control-cli"
//! bl_subsection: "binary"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Control CLI driving the lease reconciler."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};

mod context;
mod lease;

use context::CliContext;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Manage lease-protected blobs",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    /// Configuration file (defaults to BLOBLEAS_CONFIG, then ./blobleas.toml).
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Per-operation timeout in seconds.
    #[arg(long = "timeout", value_name = "SECS", default_value_t = 120, global = true)]
    timeout: u64,

    /// Use a process-local in-memory store instead of the blob service.
    #[arg(long = "in-memory", action = ArgAction::SetTrue, global = true)]
    in_memory: bool,

    /// Dump Prometheus metrics to stderr after the command finishes.
    #[arg(long = "print-metrics", action = ArgAction::SetTrue, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write the payload and acquire a fresh lease.
    Create(lease::CreateCommand),
    /// Report the current lease state without changing anything.
    Observe(lease::ObserveCommand),
    /// Restore a held lease, renewing or re-acquiring as needed.
    Reconcile(lease::ReconcileCommand),
    /// Release the lease and delete the blob.
    Delete(lease::DeleteCommand),
    /// Bind to an existing blob given as account/container/name.
    Adopt(lease::AdoptCommand),
    /// Show what a reconcile pass would do.
    Plan(lease::PlanCommand),
    /// Keep renewing a held lease until interrupted.
    Renew(lease::RenewCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("blobleasctl {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let command = cli
        .command
        .ok_or_else(|| anyhow!("no command given; run with --help for usage"))?;

    let ctx = CliContext::build(cli.config.as_deref(), cli.in_memory, cli.timeout)?;
    let result = match command {
        Commands::Create(cmd) => cmd.execute(&ctx).await,
        Commands::Observe(cmd) => cmd.execute(&ctx).await,
        Commands::Reconcile(cmd) => cmd.execute(&ctx).await,
        Commands::Delete(cmd) => cmd.execute(&ctx).await,
        Commands::Adopt(cmd) => cmd.execute(&ctx).await,
        Commands::Plan(cmd) => cmd.execute(&ctx).await,
        Commands::Renew(cmd) => cmd.execute(&ctx).await,
    };
    if cli.print_metrics {
        ctx.print_metrics()?;
    }
    result
}
