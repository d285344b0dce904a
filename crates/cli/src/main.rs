mod cmd;
mod output;

use std::path::PathBuf;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::BuildArgs;
use output::{OutputFormat, print_error};

/// goplug - build Go plugin modules locally or on a remote builder
#[derive(Parser)]
#[command(name = "goplug")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  /// Config file (default: $GOPLUG_CONFIG or <config dir>/goplug/config.toml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a module from a source directory
  Build(BuildArgs),

  /// Show host runtime, directories and delegations
  Info,

  /// Manage cached Go toolchains
  Toolchain {
    #[command(subcommand)]
    command: ToolchainCommands,
  },
}

#[derive(Subcommand)]
enum ToolchainCommands {
  /// Download a Go release into the toolchain cache
  Install {
    /// Go version, e.g. 1.22.5
    version: String,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let config = cli.config.as_deref();
  match cli.command {
    Commands::Build(args) => cmd::cmd_build(args, config, cli.output),
    Commands::Info => cmd::cmd_info(config, cli.output),
    Commands::Toolchain {
      command: ToolchainCommands::Install { version },
    } => cmd::cmd_toolchain_install(&version, config, cli.output),
  }
}
