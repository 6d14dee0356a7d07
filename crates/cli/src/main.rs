//! ragloom CLI: the main entry point.
//!
//! Commands:
//! - `run`: Execute a plan file through the orchestrator with simulated tools
//! - `validate`: Build the execution graph of a plan file and print its levels
//! - `config`: Show the effective or default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ragloom",
    about = "ragloom: parallel tool orchestration and token-bounded context assembly",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ~/.ragloom/config.toml)
    #[arg(short, long, global = true, env = "RAGLOOM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan file with simulated tools and print context + report
    Run {
        /// Path to the plan file (JSON)
        plan: PathBuf,

        /// Force sequential execution regardless of config
        #[arg(long)]
        sequential: bool,

        /// Abort the run after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Validate a plan file's dependency graph
    Validate {
        /// Path to the plan file (JSON)
        plan: PathBuf,
    },

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the effective config
        #[arg(long)]
        default: bool,

        /// Print the config file path
        #[arg(long, conflicts_with = "default")]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            plan,
            sequential,
            deadline_ms,
        } => commands::run::run(config_path, &plan, sequential, deadline_ms).await?,
        Commands::Validate { plan } => commands::validate::run(config_path, &plan).await?,
        Commands::Config { default, path } => {
            if path {
                commands::config_cmd::path(config_path).await?
            } else if default {
                commands::config_cmd::defaults().await?
            } else {
                commands::config_cmd::show(config_path).await?
            }
        }
    }

    Ok(())
}
