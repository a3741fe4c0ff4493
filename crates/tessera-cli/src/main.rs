//! Tessera CLI - capacity planning and simulated device bring-up

use clap::{Parser, Subcommand};
use colored::*;
use std::process;
use tessera_cli::{
    commands::*,
    config::CliConfig,
    output::{print_error, OutputFormat},
    utils::setup_logging,
};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera KV cache planning and device bring-up")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "tessera.toml", global = true)]
    config: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit JSON log lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Output format
    #[arg(long, default_value = "pretty", global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute per-token cache costs and the token budget
    Plan(PlanCommand),

    /// Run a full bring-up on the simulated platform
    Bringup(BringupCommand),

    /// Show, validate or generate configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration
    let config = match CliConfig::load(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Failed to load config: {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    setup_logging(
        cli.verbose,
        cli.quiet,
        cli.json_logs || config.logging.json,
        &config.logging.level,
    )
    .unwrap_or_else(|e| {
        eprintln!("{} Failed to setup logging: {}", "Error:".red().bold(), e);
        process::exit(1);
    });

    // Execute command
    let result = match cli.command {
        Commands::Plan(cmd) => plan::execute(cmd, config, cli.format).await,
        Commands::Bringup(cmd) => bringup::execute(cmd, config, cli.format).await,
        Commands::Config(cmd) => config_cmd::execute(cmd, config, cli.format).await,
    };

    if let Err(e) = result {
        print_error(&e);
        process::exit(1);
    }
}
