use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pharbox",
    about = "Build, extract and verify signed PHAR application archives.",
    version
)]
pub struct Cli {
    /// Log pipeline stages (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(visible_alias = "b", about = "Build an archive from a configuration file")]
    Build(BuildArgs),

    #[command(visible_alias = "x", about = "Extract the files of an archive")]
    Extract(ExtractArgs),

    #[command(about = "Check the signature of an archive")]
    Verify(VerifyArgs),

    #[command(about = "Check a configuration file without building")]
    Validate(ValidateArgs),

    #[command(visible_alias = "i", about = "Show archive metadata and statistics")]
    Info(InfoArgs),
}

#[derive(Debug, clap::Args)]
pub struct BuildArgs {
    /// Configuration file [default: pharbox.json, then pharbox.json.dist]
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Load and compact files sequentially
    #[arg(long)]
    pub serial: bool,

    /// Suppress output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, clap::Args)]
pub struct ExtractArgs {
    /// Archive to extract
    pub archive: PathBuf,

    /// Output directory [default: a new temporary directory]
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Marker ending the stub
    #[arg(long, value_name = "MARKER")]
    pub halt_marker: Option<String>,

    /// Suppress output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, clap::Args)]
pub struct VerifyArgs {
    /// Archive to verify
    pub archive: PathBuf,

    /// PEM public key for OPENSSL signatures [default: <ARCHIVE>.pubkey]
    #[arg(long, value_name = "FILE")]
    pub public_key: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct ValidateArgs {
    /// Configuration file [default: pharbox.json, then pharbox.json.dist]
    pub config: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct InfoArgs {
    /// Archive to inspect
    pub archive: PathBuf,

    /// List every entry
    #[arg(short = 'l', long)]
    pub list: bool,
}
