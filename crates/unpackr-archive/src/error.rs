use std::io;
use std::path::PathBuf;

use crate::format::ArchiveKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("archive not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error("archive source is not a regular file: '{path}'")]
    NotAFile { path: PathBuf },

    #[error("unsupported archive format: '{name}'")]
    UnsupportedFormat { name: String },

    #[error("{kind} extraction unavailable: {missing} is not installed")]
    BackendUnavailable { kind: ArchiveKind, missing: String },

    #[error("archive is corrupted: {detail}")]
    Corrupted { detail: String },

    #[error("path traversal blocked: entry '{entry}' resolves to '{resolved}'")]
    TraversalBlocked { entry: PathBuf, resolved: PathBuf },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("archive expands beyond the {limit} byte ceiling")]
    TooLarge { limit: u64 },

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("destination already holds files: '{path}'")]
    DestinationNotEmpty { path: PathBuf },

    #[error("failed to create directory: {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn corrupted(detail: impl ToString) -> Self {
        Self::Corrupted {
            detail: detail.to_string(),
        }
    }

    /// Whether the failure means the archive tried to write outside its destination.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::TraversalBlocked { .. })
    }

    /// Whether the archive content itself is unreadable, as opposed to a host problem.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::ToolFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
