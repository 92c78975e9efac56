//! `unpackr`: drive the extraction core from a terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unpackr::units::{readable_duration, readable_size};
use unpackr::{Config, DirectoryGrowth, ProgressMonitor, Renderer, TransferCounter};
use unpackr_fetch::{FetchOptions, Fetcher, ReqwestClient};

use crate::cli::{App, ClassifyArg, Commands, ExtractArg, FetchArg, ManifestArg};
use crate::status::TerminalStatus;

mod cli;
mod status;

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();
    let config = Config::load(app.config.as_deref()).context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match app.cmd {
        Commands::Classify(arg) => classify(arg),
        Commands::Manifest(arg) => manifest(&config, arg).await,
        Commands::Extract(arg) => extract(&config, arg).await,
        Commands::Fetch(arg) => fetch(&config, arg).await,
    }
}

fn classify(arg: ClassifyArg) -> Result<()> {
    for name in arg.names {
        println!("{name}\t{}", unpackr::classify(&name));
    }
    Ok(())
}

async fn manifest(config: &Config, arg: ManifestArg) -> Result<()> {
    let options = config.extract_options();
    let archive = arg.archive.clone();
    let manifest = tokio::task::spawn_blocking(move || unpackr_archive::manifest_with(archive, &options)).await?;
    match manifest {
        Some(m) => println!("{}\t{} ({} bytes)", arg.archive.display(), readable_size(m.total_bytes), m.total_bytes),
        None => println!("{}\tunknown", arg.archive.display()),
    }
    Ok(())
}

async fn extract(config: &Config, arg: ExtractArg) -> Result<()> {
    let mut options = config.extract_options();
    if let Some(archiver) = &arg.archiver {
        options = options.archiver(archiver);
    }
    if let Some(limit) = arg.max_bytes {
        options = options.max_unpacked_bytes(limit);
    }
    let dest = arg
        .dest
        .unwrap_or_else(|| fresh_destination(config, &arg.archive));

    let files = run_extraction(config, &arg.archive, &dest, options).await?;
    for path in files.files() {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        println!("{}\t{}", readable_size(size), path.display());
    }
    Ok(())
}

async fn run_extraction(
    config: &Config,
    archive: &Path,
    dest: &Path,
    options: unpackr_archive::ExtractOptions,
) -> Result<unpackr::ExtractedFileSet> {
    let total = {
        let (archive, options) = (archive.to_path_buf(), options.clone());
        tokio::task::spawn_blocking(move || unpackr_archive::manifest_with(archive, &options))
            .await?
            .map(|m| m.total_bytes)
    };

    let status = Arc::new(TerminalStatus::new("Extracting"));
    let monitor = ProgressMonitor::spawn(
        Arc::new(DirectoryGrowth::new(dest, total)),
        Arc::clone(&status),
        Renderer::new(format!("Extracting {}", archive.display())),
        config.progress_interval(),
    );

    tracing::info!(archive = %archive.display(), dest = %dest.display(), total = ?total, "extraction started");
    let result = {
        let (archive, dest) = (archive.to_path_buf(), dest.to_path_buf());
        tokio::task::spawn_blocking(move || unpackr_archive::extract_with(archive, dest, &options)).await?
    };
    let text = match &result {
        Ok(files) => format!(
            "Extracted {} files in {}",
            files.len(),
            readable_duration(monitor.elapsed())
        ),
        Err(e) => format!("Extraction failed: {e}"),
    };
    monitor.finish(&text).await;
    status.finish();
    log_outcome(archive, &result);

    result.with_context(|| format!("failed to extract {}", archive.display()))
}

fn log_outcome(archive: &Path, result: &unpackr_archive::Result<unpackr::ExtractedFileSet>) {
    match result {
        Ok(files) => tracing::info!(files = files.len(), root = %files.root().display(), "extraction finished"),
        Err(e) => tracing::warn!(archive = %archive.display(), error = %e, "extraction failed"),
    }
}

async fn fetch(config: &Config, arg: FetchArg) -> Result<()> {
    let dir = arg.dir.unwrap_or_else(|| config.download_dir.join("fetched"));
    let fetcher = Fetcher::new(ReqwestClient::new(config.connect_timeout())?);
    tracing::info!(url = %arg.url, dir = %dir.display(), "fetch started");

    let counter = Arc::new(TransferCounter::default());
    let feed = Arc::clone(&counter);
    let options =
        FetchOptions::default().on_progress(move |p| feed.record(p.bytes_downloaded, p.total_bytes.unwrap_or(0)));

    let status = Arc::new(TerminalStatus::new("Connecting"));
    let monitor = ProgressMonitor::spawn(
        counter,
        Arc::clone(&status),
        Renderer::new("Downloading"),
        config.progress_interval(),
    );
    let fetched = fetcher.fetch_into(&arg.url, &dir, &options).await;
    let text = match &fetched {
        Ok(path) => format!("Downloaded {}", path.display()),
        Err(e) => format!("Download failed: {e}"),
    };
    monitor.finish(&text).await;
    status.finish();
    if let Err(e) = &fetched {
        tracing::warn!(url = %arg.url, error = %e, "fetch failed");
    }
    let path = fetched.with_context(|| format!("failed to fetch {}", arg.url))?;

    if arg.extract {
        if !unpackr::is_archive(&path) {
            anyhow::bail!("{} is not an archive", path.display());
        }
        let dest = fresh_destination(config, &path);
        let files = run_extraction(config, &path, &dest, config.extract_options()).await?;
        if config.remove_source
            && let Err(e) = tokio::fs::remove_file(&path).await
        {
            tracing::debug!(path = %path.display(), error = %e, "source already gone");
        }
        println!("{} files in {}", files.len(), files.root().display());
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

/// `<download_dir>/<archive stem>-<n>`, the first that does not exist yet.
fn fresh_destination(config: &Config, archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| unpackr_archive::split_suffix(n).0.to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "extracted".to_string());
    let mut n = 0;
    loop {
        let candidate = config.download_dir.join(if n == 0 { name.clone() } else { format!("{name}-{n}") });
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
