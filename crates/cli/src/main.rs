//! codehints CLI - drive a code-intelligence worker from the command line

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{ProbeArgs, cmd_config_show, cmd_exclusions_clear, cmd_exclusions_list, cmd_probe};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "codehints")]
#[command(about = "Code hints, definitions and references from an analysis worker")]
#[command(after_help = "\
QUICK START:
  codehints probe --worker ./worker.js src/app.js --line 10 --ch 4
  codehints probe --worker node --worker-arg worker.js src/app.js -r definition
  codehints config show
  codehints exclusions list")]
struct Cli {
  /// Log level: error, warn, info, debug, trace
  #[arg(long, global = true, default_value = "warn")]
  log_level: String,
  /// Log to a rolling file in the data directory instead of stderr
  #[arg(long, global = true)]
  log_file: bool,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Activate a file and run one request against the worker
  Probe(ProbeArgs),
  /// Manage configuration
  #[command(after_help = "\
CONFIG LOCATIONS:
  Project: .codehints/config.toml
  User:    ~/.config/codehints/config.toml")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
  /// Files excluded after inference timeouts
  Exclusions {
    #[command(subcommand)]
    command: ExclusionsCommand,
  },
}

#[derive(Subcommand)]
enum ConfigCommand {
  /// Show the effective configuration
  Show {
    #[arg(short, long)]
    project: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum ExclusionsCommand {
  /// List excluded files
  List {
    #[arg(short, long)]
    project: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Forget all excluded files
  Clear {
    #[arg(short, long)]
    project: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let _guard = init_logging(&cli.log_level, cli.log_file);

  match cli.command {
    Commands::Probe(args) => cmd_probe(args).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show { project } => cmd_config_show(project.as_deref()).await,
    },
    Commands::Exclusions { command } => match command {
      ExclusionsCommand::List { project, json } => cmd_exclusions_list(project.as_deref(), json).await,
      ExclusionsCommand::Clear { project } => cmd_exclusions_clear(project.as_deref()).await,
    },
  }
}
