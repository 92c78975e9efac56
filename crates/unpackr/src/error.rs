//! Error taxonomy for extraction jobs.
//!
//! Input errors are raised before anything touches the disk, archive errors
//! abort an extraction and purge its directory, session errors are stale-UI
//! notices, and transport errors are isolated per file during bulk uploads.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::units::readable_size;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("'{name}' is not a supported archive")]
    NotAnArchive { name: String },

    #[error("input of {size} bytes exceeds the {limit} byte limit")]
    OversizedInput { size: u64, limit: u64 },

    #[error("archive contains no files")]
    EmptyArchive,

    #[error("invalid file name: '{name}'")]
    InvalidName { name: String },

    #[error("owner is banned")]
    Banned,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no active selection session")]
    SessionExpired,

    #[error("file index {index} is out of range ({len} files)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no files selected")]
    EmptySelection,

    #[error("an extraction is already in progress")]
    Busy,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upload of '{path}' failed: {reason}")]
    UploadFailed { path: PathBuf, reason: String },

    #[error("file of {size} bytes exceeds every available transport (ceiling {ceiling})")]
    NoCapableTransport { size: u64, ceiling: u64 },

    #[error("thumbnail could not be resolved: {reason}")]
    ThumbnailResolutionFailed { reason: String },

    #[error("message edit failed: {0}")]
    EditFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Archive(#[from] unpackr_archive::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Fetch(#[from] unpackr_fetch::FetchError),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Stale-UI notices rather than failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Text safe to show the owner. Tool diagnostics are kept; host paths are not.
    pub fn user_message(&self) -> String {
        match self {
            Self::Input(InputError::OversizedInput { size, limit }) => format!(
                "File is too large ({}). Your limit is {}.",
                readable_size(*size),
                readable_size(*limit)
            ),
            Self::Input(InputError::NotAnArchive { name }) => {
                format!("'{name}' is not a supported archive.")
            }
            Self::Input(InputError::EmptyArchive) => "The archive contains no files.".to_string(),
            Self::Input(InputError::Banned) => "You are not allowed to use this bot.".to_string(),
            Self::Input(e) => e.to_string(),
            Self::Archive(e) => archive_message(e),
            Self::Session(SessionError::SessionExpired) => {
                "This selection has expired. Send the archive again.".to_string()
            }
            Self::Session(SessionError::Busy) => {
                "Please wait for the current extraction to finish.".to_string()
            }
            Self::Session(e) => e.to_string(),
            Self::Transport(e) => e.to_string(),
            Self::Fetch(e) => format!("Download failed: {e}"),
            Self::Config(_) | Self::Io(_) | Self::Join(_) => "Internal error, please retry.".to_string(),
        }
    }
}

/// User-facing text for an extraction failure.
pub(crate) fn archive_message(e: &unpackr_archive::Error) -> String {
    use unpackr_archive::Error as Archive;

    match e {
        Archive::TraversalBlocked { .. } => {
            "Extraction aborted: the archive tried to write outside its folder.".to_string()
        }
        Archive::BackendUnavailable { kind, missing } => {
            format!("Cannot open {kind} archives here: {missing} is not installed.")
        }
        Archive::ToolFailed { stderr, .. } => format!("Extraction failed:\n{stderr}"),
        Archive::Corrupted { detail } => format!("The archive is corrupted: {detail}"),
        Archive::UnsupportedFormat { .. } => "This archive format is not supported.".to_string(),
        Archive::TooLarge { limit } => {
            format!("The archive unpacks to more than {}.", readable_size(*limit))
        }
        Archive::DestinationNotEmpty { .. } => {
            "Extraction refused: the target folder already holds files.".to_string()
        }
        _ => "Extraction failed.".to_string(),
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
