mod cli;
mod config;
mod runner;
mod scenario;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Also picks up the engine's `log` records.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cli::run::run(args, &cli.config),
        Commands::Check(args) => cli::check::run(args),
        Commands::Config(cmd) => cli::config_cmd::run(cmd, &cli.config),
    }
}
