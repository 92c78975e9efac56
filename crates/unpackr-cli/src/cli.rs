use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(name = "unpackr", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// TOML file layered over the built-in defaults.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "c", name = "classify", about = "Show the archive kind of each name")]
    Classify(ClassifyArg),
    #[command(alias = "m", name = "manifest", about = "Read the declared unpacked size")]
    Manifest(ManifestArg),
    #[command(alias = "x", name = "extract", about = "Extract an archive with progress")]
    Extract(ExtractArg),
    #[command(alias = "f", name = "fetch", about = "Download a URL, optionally extracting it")]
    Fetch(FetchArg),
}

#[derive(Args, Clone, Debug)]
pub struct ClassifyArg {
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct ManifestArg {
    pub archive: PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct ExtractArg {
    pub archive: PathBuf,

    /// Defaults to a fresh directory under the configured download dir.
    #[arg(long, short)]
    pub dest: Option<PathBuf>,

    /// Archiver binary for rar/7z/bare streams; overrides the config.
    #[arg(long)]
    pub archiver: Option<String>,

    /// Refuse archives declaring more unpacked bytes than this.
    #[arg(long)]
    pub max_bytes: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct FetchArg {
    pub url: String,

    /// Directory to download into; defaults to the configured download dir.
    #[arg(long, short)]
    pub dir: Option<PathBuf>,

    /// Extract the download afterwards when it is an archive.
    #[arg(long, short)]
    pub extract: bool,
}
