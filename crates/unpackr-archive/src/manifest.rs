use std::path::Path;

use crate::backend::backend_for;
use crate::format::ArchiveKind;
use crate::options::ExtractOptions;

/// Declared uncompressed size of an archive, read from its index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionManifest {
    pub total_bytes: u64,
}

/// Best-effort size manifest with default options.
pub fn manifest(source: impl AsRef<Path>) -> Option<ExtractionManifest> {
    manifest_with(source, &ExtractOptions::default())
}

/// Best-effort size manifest. Any failure, an unreadable index included, yields `None`.
pub fn manifest_with(source: impl AsRef<Path>, options: &ExtractOptions) -> Option<ExtractionManifest> {
    let source = source.as_ref();
    let kind = ArchiveKind::classify(source);
    match backend_for(kind).declared_size(source, options) {
        Ok(total) => total.map(|total_bytes| ExtractionManifest { total_bytes }),
        Err(e) => {
            tracing::debug!(source = %source.display(), %kind, error = %e, "no manifest");
            None
        }
    }
}
