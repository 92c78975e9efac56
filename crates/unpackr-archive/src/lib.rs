//! Archive classification and extraction with traversal guards and staged cleanup.
//!
//! # Architecture
//!
//! - `format.rs` - Suffix classification and magic-byte sniffing
//! - `backend.rs` - One extraction strategy per archive kind
//! - `extract/` - In-process readers feeding a shared, guarded write pipeline
//! - `tool.rs` - External archiver invocation
//! - `sanitize.rs` - Path sanitization (zip-slip prevention)
//! - `staging.rs` - Destination cleaned back to its prior state unless extraction succeeds
//! - `manifest.rs` - Best-effort uncompressed size from the archive index

pub use error::{Error, Result};
pub use extraction::{ExtractedFileSet, extract, extract_with};
pub use format::{ArchiveKind, classify, is_archive, split_suffix};
pub use manifest::{ExtractionManifest, manifest, manifest_with};
pub use options::{DEFAULT_ARCHIVER, ExtractOptions};
pub use sanitize::SanitizedPath;
pub use tree::{list_files, tree_size};

mod backend;
mod error;
pub mod extract;
mod extraction;
pub mod format;
mod manifest;
pub mod options;
mod sanitize;
mod staging;
mod tool;
mod tree;
