//! Extraction jobs for a chat bot: receive an archive, unpack it safely, let the
//! owner pick files, send them back.
//!
//! # Architecture
//!
//! - `pipeline.rs` - Admission, extraction with progress, session start, upload of a selection
//! - `session.rs` - Per-owner selection sessions behind per-owner locks
//! - `progress.rs` - Throttled status rendering over a pluggable progress source
//! - `upload.rs` - Transport selection, media kind and thumbnail handling
//! - `transport.rs` - What the core needs from the chat layer and the user store
//! - `config.rs` - Layered runtime settings
//!
//! Archive handling itself lives in `unpackr-archive`; URL downloads in `unpackr-fetch`.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod transport;
pub mod units;
pub mod upload;

pub use config::Config;
pub use error::{Error, InputError, Result, SessionError, TransportError};
pub use pipeline::{Unpacker, rename_with_stem};
pub use progress::{DirectoryGrowth, ProgressMonitor, ProgressSource, Renderer, Snapshot, TransferCounter};
pub use session::{Commit, FileRow, OwnerId, SelectionSession, SessionRegistry, Started};
pub use transport::{
    ChatId, ChatTransport, MediaKind, MessageRef, MessageStatus, OutgoingFile, RemoteRef, StatusSink,
    TransferProgress, UserSettings, UserStore,
};
pub use upload::{Thumbnail, UploadDispatcher, UploadOptions, UploadSummary, media_kind};

pub use unpackr_archive::{ArchiveKind, ExtractedFileSet, ExtractionManifest, classify, is_archive};
