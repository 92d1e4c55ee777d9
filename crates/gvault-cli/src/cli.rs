use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gvault_types::KindFamily;

#[derive(Parser)]
#[command(
    name = "gvault",
    about = "GeoVault: content-addressed archive for B-Rep geometry",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty archive
    Init(InitArgs),
    /// Show per-kind object counts and sizes
    Stats(ArchiveArgs),
    /// List stored objects
    List(ListArgs),
    /// Print one stored object
    Show(ShowArgs),
    /// Re-check stored objects against their digests
    Verify(VerifyArgs),
    /// Reclaim space held by unreferenced objects
    Compact(ArchiveArgs),
    /// Rebuild the manifest from the payload segments
    Rebuild(ArchiveArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: PathBuf,
    /// Skip fsync when flushing
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args)]
pub struct ArchiveArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ListArgs {
    pub path: PathBuf,
    #[arg(long, value_parser = parse_family)]
    pub family: Option<KindFamily>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub path: PathBuf,
    /// Identity in hex, as printed by `list`
    pub identity: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub path: PathBuf,
    /// Check a random sample of this many objects
    #[arg(long)]
    pub sample: Option<usize>,
}

fn parse_family(s: &str) -> Result<KindFamily, String> {
    KindFamily::from_name(s).ok_or_else(|| {
        let names: Vec<_> = KindFamily::ALL.iter().map(|f| f.name()).collect();
        format!("unknown family {s:?}; expected one of {}", names.join(", "))
    })
}
