//! CLI application for NFS-e withholding validation.

mod commands;
mod context;
mod lookup;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, check, config};
use context::RunContext;

/// NFS-e withholding checker - Recompute IRPJ/CSLL/PIS/COFINS withholdings on service invoices
#[derive(Parser)]
#[command(name = "nfse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a single invoice document
    Check(check::CheckArgs),

    /// Check every invoice document in a directory
    Batch(batch::BatchArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Check(args) => check::run(args, &RunContext::load(cli.config.as_deref())?),
        Commands::Batch(args) => batch::run(args, &RunContext::load(cli.config.as_deref())?),
        Commands::Config(args) => config::run(args, cli.config.as_deref()),
    }
}
