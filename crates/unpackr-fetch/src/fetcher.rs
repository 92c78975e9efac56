use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::{FetchError, Result};
use crate::http::HttpClient;
use crate::progress::{FetchOptions, FetchPhase, Progress};

/// Used when the URL path ends in `/` or names nothing usable.
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

/// File name for a download: the last path segment with query and fragment dropped.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| {
        // Drop the authority so a bare host does not become the name.
        rest.split_once('/').map_or("", |(_, p)| p)
    });
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." && !name.contains('\\') => {
            name.to_string()
        }
        _ => FALLBACK_FILE_NAME.to_string(),
    }
}

/// Removes the file on drop unless the download committed.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed
            && let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial download");
        }
    }
}

/// Streams HTTP bodies to disk.
pub struct Fetcher<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Download `url` into `directory`, naming the file after the URL.
    pub async fn fetch_into(&self, url: &str, directory: &Path, options: &FetchOptions) -> Result<PathBuf> {
        tokio::fs::create_dir_all(directory).await?;
        let destination = directory.join(file_name_from_url(url));
        self.fetch(url, &destination, options).await
    }

    /// Download `url` to `destination`, which must not exist yet.
    ///
    /// On any failure the partial file is removed; an existing file is never
    /// opened, so it is never truncated or removed either.
    pub async fn fetch(&self, url: &str, destination: &Path, options: &FetchOptions) -> Result<PathBuf> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        if destination.is_dir() {
            return Err(FetchError::DestinationIsDirectory(destination.to_path_buf()));
        }
        if destination.exists() {
            return Err(FetchError::DestinationExists(destination.to_path_buf()));
        }

        options.report(Progress {
            phase: FetchPhase::Connecting,
            bytes_downloaded: 0,
            total_bytes: None,
        });

        let body = self.client.get(url).await?;
        let total_bytes = body.content_length;
        if let (Some(limit), Some(total)) = (options.max_bytes, total_bytes)
            && total > limit
        {
            return Err(FetchError::TooLarge { limit });
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => FetchError::DestinationExists(destination.to_path_buf()),
                _ => FetchError::Io(e),
            })?;
        let mut partial = PartialFile {
            path: destination.to_path_buf(),
            committed: false,
        };

        let mut stream = body.stream;
        let mut bytes_downloaded = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes_downloaded += chunk.len() as u64;
            if let Some(limit) = options.max_bytes
                && bytes_downloaded > limit
            {
                return Err(FetchError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;

            options.report(Progress {
                phase: FetchPhase::Downloading,
                bytes_downloaded,
                total_bytes,
            });
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        partial.committed = true;

        tracing::info!(url, path = %destination.display(), bytes = bytes_downloaded, "download complete");
        options.report(Progress {
            phase: FetchPhase::Completed,
            bytes_downloaded,
            total_bytes,
        });

        Ok(destination.to_path_buf())
    }
}
