//! Error types for unpackr-fetch.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("server answered {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("download exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("destination path is a directory: {0}")]
    DestinationIsDirectory(std::path::PathBuf),

    #[error("destination already exists: {0}")]
    DestinationExists(std::path::PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FetchError {
    pub(crate) fn network(e: impl std::error::Error) -> Self {
        Self::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
