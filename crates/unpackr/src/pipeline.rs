//! The extraction job: admission, extraction with progress, session start,
//! and the upload that closes a session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;
use unpackr_archive::{ArchiveKind, ExtractedFileSet, ExtractionManifest};
use unpackr_fetch::{FetchOptions, Fetcher, HttpClient};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{InputError, Result, archive_message};
use crate::progress::{DirectoryGrowth, ProgressMonitor, Renderer, TransferCounter};
use crate::session::{OwnerId, SessionRegistry, Started, purge};
use crate::transport::{ChatId, ChatTransport, MessageRef, StatusSink, UserStore};
use crate::units::readable_duration;
use crate::upload::{Thumbnail, UploadDispatcher, UploadOptions, UploadSummary};

/// Drives extraction jobs for many owners against one session registry.
pub struct Unpacker<T: ChatTransport, U: UserStore> {
    config: Arc<Config>,
    sessions: Arc<SessionRegistry>,
    users: Arc<U>,
    dispatcher: UploadDispatcher<T>,
}

impl<T: ChatTransport, U: UserStore> Unpacker<T, U> {
    pub fn new(config: Config, transport: Arc<T>, users: Arc<U>) -> Self {
        let dispatcher = UploadDispatcher::new(
            transport,
            config.primary_upload_ceiling,
            config.download_dir.join(".thumbnails"),
        )
        .progress_interval(config.progress_interval());
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
            users,
            dispatcher,
        }
    }

    /// Register the transport that carries files above the primary ceiling.
    pub fn elevated_transport(mut self, transport: Arc<T>) -> Self {
        self.dispatcher = self
            .dispatcher
            .elevated(transport, self.config.elevated_upload_ceiling);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &UploadDispatcher<T> {
        &self.dispatcher
    }

    /// Reclaim abandoned sessions on the configured cadence.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.sessions
            .spawn_sweeper(self.config.sweep_interval(), self.config.session_ttl())
    }

    /// Reject banned owners, inputs that are not archives, and inputs over the owner's limit.
    ///
    /// Runs before anything is written, so a rejection leaves no trace on disk.
    pub async fn admit(&self, owner: OwnerId, name: &str, size: u64) -> Result<ArchiveKind> {
        let settings = self.users.settings(owner).await;
        if settings.banned {
            tracing::info!(owner, "banned owner refused");
            return Err(InputError::Banned.into());
        }
        let kind = unpackr_archive::classify(name);
        if !kind.is_archive() {
            return Err(InputError::NotAnArchive { name: name.to_string() }.into());
        }
        let limit = self.config.size_ceiling(settings.premium);
        if size > limit {
            return Err(InputError::OversizedInput { size, limit }.into());
        }
        Ok(kind)
    }

    /// Fresh per-owner destination, never shared between jobs.
    pub fn destination_for(&self, owner: OwnerId) -> PathBuf {
        self.config
            .download_dir
            .join(owner.to_string())
            .join(Uuid::new_v4().to_string())
    }

    fn incoming_root(&self, owner: OwnerId) -> PathBuf {
        self.config.download_dir.join(owner.to_string()).join("incoming")
    }

    /// Apply the owner's rename-on-receive preference to a received file.
    ///
    /// With the preference off, or no stem offered, the file keeps its name.
    pub async fn receive_as(&self, owner: OwnerId, path: &Path, requested_stem: Option<&str>) -> Result<PathBuf> {
        let settings = self.users.settings(owner).await;
        match requested_stem {
            Some(stem) if settings.rename_on_receive => rename_with_stem(path, stem).await,
            _ => Ok(path.to_path_buf()),
        }
    }

    /// Extract `source` for `owner` and open a selection session over the result.
    ///
    /// Fails with `Busy` while the owner already has a job or session. Progress
    /// is rendered into `status` until the extraction returns.
    pub async fn process<S: StatusSink>(
        &self,
        owner: OwnerId,
        source: &Path,
        status: Arc<S>,
    ) -> Result<Started> {
        let span = tracing::info_span!("extract", owner);
        async move {
            self.sessions.reserve(owner).await?;
            let destination = self.destination_for(owner);
            let outcome = self.run_extraction(source, &destination, status).await;

            if self.config.remove_source {
                if let Err(e) = tokio::fs::remove_file(source).await {
                    tracing::debug!(source = %source.display(), error = %e, "source already gone");
                }
                // Fetched sources sit alone in a per-job directory.
                if let Some(job_dir) = source.parent()
                    && job_dir.parent() == Some(self.incoming_root(owner).as_path())
                {
                    tokio::fs::remove_dir(job_dir).await.ok();
                }
            }

            match outcome {
                Ok(files) if files.is_empty() => {
                    purge(files.root()).await;
                    self.sessions.release(owner).await;
                    Err(InputError::EmptyArchive.into())
                }
                Ok(files) => Ok(self.sessions.start(owner, files).await),
                Err(e) => {
                    self.sessions.release(owner).await;
                    tracing::warn!(error = %e, "extraction failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_extraction<S: StatusSink>(
        &self,
        source: &Path,
        destination: &Path,
        status: Arc<S>,
    ) -> Result<ExtractedFileSet> {
        let options = self.config.extract_options();

        let manifest = {
            let (source, options) = (source.to_path_buf(), options.clone());
            tokio::task::spawn_blocking(move || unpackr_archive::manifest_with(source, &options)).await?
        };
        let total = manifest.map(|ExtractionManifest { total_bytes }| total_bytes);
        tracing::info!(total = ?total, "manifest read");

        let monitor = ProgressMonitor::spawn(
            Arc::new(DirectoryGrowth::new(destination, total)),
            status,
            Renderer::new("Extracting"),
            self.config.progress_interval(),
        );

        let result = {
            let (source, destination) = (source.to_path_buf(), destination.to_path_buf());
            tokio::task::spawn_blocking(move || unpackr_archive::extract_with(source, destination, &options)).await
        };

        let elapsed = readable_duration(monitor.elapsed());
        let text = match &result {
            Ok(Ok(files)) => format!("Extracted {} files in {elapsed}", files.len()),
            Ok(Err(e)) => archive_message(e),
            Err(_) => "Extraction failed.".to_string(),
        };
        monitor.finish(&text).await;

        Ok(result??)
    }

    /// Download `url` into a fresh per-job directory, rendering progress into `status`.
    ///
    /// The owner's size ceiling bounds the download. Concurrent or repeated
    /// fetches of the same URL never share a path.
    pub async fn fetch_url<C: HttpClient, S: StatusSink>(
        &self,
        fetcher: &Fetcher<C>,
        owner: OwnerId,
        url: &str,
        status: Arc<S>,
    ) -> Result<PathBuf> {
        let settings = self.users.settings(owner).await;
        let directory = self.incoming_root(owner).join(Uuid::new_v4().to_string());

        let counter = Arc::new(TransferCounter::default());
        let feed = Arc::clone(&counter);
        let options = FetchOptions::default()
            .max_bytes(self.config.size_ceiling(settings.premium))
            .on_progress(move |p| feed.record(p.bytes_downloaded, p.total_bytes.unwrap_or(0)));

        let monitor = ProgressMonitor::spawn(
            counter,
            status,
            Renderer::new("Downloading"),
            self.config.progress_interval(),
        );
        let fetched = fetcher.fetch_into(url, &directory, &options).await;
        let text = match &fetched {
            Ok(path) => format!("Downloaded {}", display_name(path)),
            Err(e) => format!("Download failed: {e}"),
        };
        monitor.finish(&text).await;
        if fetched.is_err() {
            tokio::fs::remove_dir(&directory).await.ok();
        }

        Ok(fetched?)
    }

    /// Commit the owner's selection and send each chosen file.
    ///
    /// A failed file is recorded and skipped. The destination directory is
    /// deleted afterwards whatever happened.
    pub async fn upload_selection(
        &self,
        owner: OwnerId,
        chat: ChatId,
        status: Option<&MessageRef>,
    ) -> Result<UploadSummary> {
        let span = tracing::info_span!("upload", owner);
        async move {
            let commit = self.sessions.commit(owner).await?;
            let settings = self.users.settings(owner).await;

            let mut summary = UploadSummary::default();
            for path in commit.files {
                let mut options = UploadOptions::default()
                    .caption(display_name(&path))
                    .force_document(settings.upload_as_document)
                    .spoiler(settings.spoiler);
                if let Some(remote) = &settings.thumbnail {
                    options = options.thumbnail(Thumbnail::Remote(remote.clone()));
                }

                match self.dispatcher.upload(&path, chat, &options, status).await {
                    Ok(_) => summary.sent.push(path),
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "upload failed, continuing");
                        summary.failed.push((path, e));
                    }
                }
            }

            purge(&commit.destination).await;
            tracing::info!(sent = summary.sent.len(), failed = summary.failed.len(), "selection uploaded");
            Ok(summary)
        }
        .instrument(span)
        .await
    }
}

/// Rename `path` in place to `new_stem` plus its original suffix.
///
/// Compound archive suffixes survive: `old.tar.gz` renamed to `new` becomes
/// `new.tar.gz`.
pub async fn rename_with_stem(path: &Path, new_stem: &str) -> Result<PathBuf> {
    let invalid = || InputError::InvalidName {
        name: new_stem.to_string(),
    };
    let stem = new_stem.trim();
    if stem.is_empty() || stem == "." || stem == ".." || stem.contains(['/', '\\', '\0']) {
        return Err(invalid().into());
    }

    let current = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let (_, suffix) = unpackr_archive::split_suffix(current);
    let renamed = path.with_file_name(format!("{stem}{suffix}"));
    if renamed != path {
        tokio::fs::rename(path, &renamed).await?;
        tracing::info!(from = %path.display(), to = %renamed.display(), "renamed");
    }
    Ok(renamed)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
