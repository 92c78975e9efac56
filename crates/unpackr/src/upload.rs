//! Sending extracted files back to the chat.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::error::TransportError;
use crate::progress::{ProgressMonitor, Renderer, TransferCounter};
use crate::transport::{ChatId, ChatTransport, MediaKind, MessageRef, MessageStatus, OutgoingFile, RemoteRef};
use crate::units::readable_size;

type Result<T> = std::result::Result<T, TransportError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Thumbnail {
    Local(PathBuf),
    /// Fetched into a scratch file for the duration of one send.
    Remote(RemoteRef),
}

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    pub caption: String,
    pub thumbnail: Option<Thumbnail>,
    pub force_document: bool,
    pub spoiler: bool,
}

impl UploadOptions {
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn thumbnail(mut self, thumbnail: Thumbnail) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn force_document(mut self, force: bool) -> Self {
        self.force_document = force;
        self
    }

    pub fn spoiler(mut self, spoiler: bool) -> Self {
        self.spoiler = spoiler;
        self
    }
}

/// Video and audio by MIME type, everything else as a document.
pub fn media_kind(path: &Path, force_document: bool) -> MediaKind {
    if force_document {
        return MediaKind::Document;
    }
    match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::VIDEO => MediaKind::Video,
        Some(mime) if mime.type_() == mime_guess::mime::AUDIO => MediaKind::Audio,
        _ => MediaKind::Document,
    }
}

/// Outcome of a multi-file upload. One file failing never stops the rest.
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub sent: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, TransportError)>,
}

impl UploadSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A downloaded thumbnail, deleted when dropped.
struct ScratchThumbnail {
    file: NamedTempFile,
    /// Where the transport actually put it, when that differs from the scratch file.
    moved: Option<PathBuf>,
}

impl ScratchThumbnail {
    fn path(&self) -> &Path {
        self.moved.as_deref().unwrap_or_else(|| self.file.path())
    }
}

impl Drop for ScratchThumbnail {
    fn drop(&mut self) {
        if let Some(moved) = &self.moved
            && let Err(e) = std::fs::remove_file(moved)
        {
            tracing::debug!(path = %moved.display(), error = %e, "thumbnail cleanup failed");
        }
    }
}

/// Picks a transport by file size and sends through it.
///
/// Files up to `primary_ceiling` go through the primary transport. Larger
/// ones need the elevated transport, which accepts up to `elevated_ceiling`.
pub struct UploadDispatcher<T: ChatTransport> {
    primary: Arc<T>,
    elevated: Option<Arc<T>>,
    primary_ceiling: u64,
    elevated_ceiling: u64,
    progress_interval: Duration,
    scratch_dir: PathBuf,
}

impl<T: ChatTransport> UploadDispatcher<T> {
    pub fn new(primary: Arc<T>, primary_ceiling: u64, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            primary,
            elevated: None,
            primary_ceiling,
            elevated_ceiling: primary_ceiling,
            progress_interval: Duration::from_secs(2),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn elevated(mut self, transport: Arc<T>, ceiling: u64) -> Self {
        self.elevated = Some(transport);
        self.elevated_ceiling = ceiling;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn primary(&self) -> &Arc<T> {
        &self.primary
    }

    /// The transport able to carry `size` bytes.
    pub fn select(&self, size: u64) -> Result<&Arc<T>> {
        if size <= self.primary_ceiling {
            return Ok(&self.primary);
        }
        match &self.elevated {
            Some(elevated) if size <= self.elevated_ceiling => Ok(elevated),
            Some(_) => Err(TransportError::NoCapableTransport {
                size,
                ceiling: self.elevated_ceiling,
            }),
            None => Err(TransportError::NoCapableTransport {
                size,
                ceiling: self.primary_ceiling,
            }),
        }
    }

    /// Send one file. With a `status` message, upload progress is rendered into it.
    pub async fn upload(
        &self,
        path: &Path,
        chat: ChatId,
        options: &UploadOptions,
        status: Option<&MessageRef>,
    ) -> Result<MessageRef> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| TransportError::UploadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();
        let transport = self.select(size)?;
        let kind = media_kind(path, options.force_document);
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        let scratch = match &options.thumbnail {
            Some(Thumbnail::Remote(remote)) => match self.materialize(transport, remote).await {
                Ok(scratch) => Some(scratch),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "sending without thumbnail");
                    None
                }
            },
            _ => None,
        };
        let thumbnail = match (&options.thumbnail, &scratch) {
            (Some(Thumbnail::Local(local)), _) => Some(local.as_path()),
            (_, Some(scratch)) => Some(scratch.path()),
            _ => None,
        };

        let counter = Arc::new(TransferCounter::default());
        let monitor = status.map(|message| {
            ProgressMonitor::spawn(
                Arc::clone(&counter),
                Arc::new(MessageStatus::new(Arc::clone(transport), message.clone())),
                Renderer::new(format!("Uploading {name}")),
                self.progress_interval,
            )
        });

        tracing::info!(file = %name, size, ?kind, "uploading");
        let file = OutgoingFile {
            path,
            kind,
            caption: &options.caption,
            thumbnail,
            spoiler: options.spoiler,
        };
        let sent = transport
            .send_file(chat, file, Some(counter.callback()))
            .await
            .map_err(|e| match e {
                TransportError::UploadFailed { .. } => e,
                other => TransportError::UploadFailed {
                    path: path.to_path_buf(),
                    reason: other.to_string(),
                },
            });

        if let Some(monitor) = monitor {
            let text = match &sent {
                Ok(_) => format!("Uploaded {name} ({})", readable_size(size)),
                Err(_) => format!("Failed to upload {name}"),
            };
            monitor.finish(&text).await;
        }
        drop(scratch);
        sent
    }

    async fn materialize(&self, transport: &Arc<T>, remote: &RemoteRef) -> Result<ScratchThumbnail> {
        let failed = |reason: String| TransportError::ThumbnailResolutionFailed { reason };

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let file = tempfile::Builder::new()
            .prefix("thumb-")
            .suffix(".jpg")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| failed(e.to_string()))?;

        let mut scratch = ScratchThumbnail { file, moved: None };
        let landed = transport
            .download(remote, scratch.file.path(), None)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if landed != scratch.file.path() {
            scratch.moved = Some(landed);
        }
        Ok(scratch)
    }
}
