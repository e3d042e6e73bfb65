//! CLI command definitions and dispatch.

mod anchors;
mod parse;
mod resolve;
mod version;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use verity_core::VerityConfig;

/// Verity: host trust resolution for remote attestation.
#[derive(Parser)]
#[command(name = "verity", version, about)]
pub struct Cli {
    /// Configuration file (YAML). Defaults apply when omitted.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Parse a vendor connection string
    Parse(parse::ParseArgs),
    /// Resolve the TLS policy of a host record
    Resolve(resolve::ResolveArgs),
    /// List the legacy global trust anchors
    Anchors(anchors::AnchorsArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Load the configuration file, or defaults when none is given.
pub(crate) fn load_config(path: Option<&Path>) -> Result<VerityConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => VerityConfig::load(path)?,
        None => VerityConfig::default(),
    };
    tracing::debug!(
        config_dir = %config.config_dir.display(),
        trust_anchors = %config.legacy_trust_anchor_path().display(),
        default_policy_id = ?config.default_policy_id(),
        "Using configuration"
    );
    Ok(config)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Parse(args) => parse::execute(args).await,
        Command::Resolve(args) => resolve::execute(args, &config).await,
        Command::Anchors(args) => anchors::execute(args, &config).await,
        Command::Version(args) => version::execute(args).await,
    }
}
