pub mod check;
pub mod config_cmd;
pub mod run;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "nodenet")]
#[command(version, about = "Replay connectivity scenarios against the nodenet engine")]
pub struct Cli {
    /// Path to nodenet.toml
    #[arg(
        long,
        global = true,
        env = "NODENET_CONFIG",
        default_value = "nodenet.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario tick by tick and print the resulting graphs
    Run(RunArgs),
    /// Parse and validate a scenario without running it
    Check(CheckArgs),
    /// Config management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,
    /// Output format: table (default) | json
    #[arg(long, default_value = "table")]
    pub format: String,
    /// Record a full snapshot after every tick
    #[arg(long)]
    pub snapshots: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Check nodenet.toml for errors
    Validate,
    /// Print the effective configuration
    Show,
}

/// Print every problem found in `source`. Returns whether there were any.
pub(crate) fn report_problems(source: &Path, problems: &[String]) -> bool {
    if problems.is_empty() {
        return false;
    }
    println!("❌ {} problem(s) in {}:", problems.len(), source.display());
    for p in problems {
        println!("  - {}", p);
    }
    true
}
