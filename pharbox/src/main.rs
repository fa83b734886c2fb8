mod cli;
mod commands;
mod diagnostic;
mod util;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> miette::Result<()> {
    let cli = Cli::parse_from(wild::args_os());

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build(args) => commands::build(args)?,
        Commands::Extract(args) => commands::extract(args)?,
        Commands::Verify(args) => commands::verify(args)?,
        Commands::Validate(args) => commands::validate(args)?,
        Commands::Info(args) => commands::info(args)?,
    };

    Ok(())
}
