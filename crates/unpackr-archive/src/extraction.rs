use std::path::{Path, PathBuf};

use crate::backend::backend_for;
use crate::error::{Error, Result};
use crate::format::ArchiveKind;
use crate::manifest::manifest_with;
use crate::options::ExtractOptions;
use crate::sanitize::audit_tree;
use crate::staging::Staging;
use crate::tree::list_files;

/// Every regular file an extraction produced, sorted, with the root they live under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedFileSet {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl ExtractedFileSet {
    /// Snapshot the regular files currently under `root`.
    pub fn scan(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let files = list_files(&root)?;
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.files.get(index).map(PathBuf::as_path)
    }

    /// Path of the `index`-th file relative to the root, for display.
    pub fn relative(&self, index: usize) -> Option<&Path> {
        let path = self.get(index)?;
        Some(path.strip_prefix(&self.root).unwrap_or(path))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.files.iter()
    }
}

impl<'a> IntoIterator for &'a ExtractedFileSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Extract `source` into `destination` with default options.
pub fn extract(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<ExtractedFileSet> {
    extract_with(source, destination, &ExtractOptions::default())
}

/// Extract `source` into `destination`, which is created if absent.
///
/// `destination` must be absent or empty; one that already holds files is
/// refused with [`Error::DestinationNotEmpty`]. On any failure everything
/// written is deleted, and a destination this call created goes with it.
pub fn extract_with(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<ExtractedFileSet> {
    let source = source.as_ref();
    let metadata = std::fs::metadata(source).map_err(|_| Error::NotFound {
        path: source.to_path_buf(),
    })?;
    if !metadata.is_file() {
        return Err(Error::NotAFile {
            path: source.to_path_buf(),
        });
    }

    let kind = ArchiveKind::classify(source);
    let staging = Staging::prepare(destination)?;

    if let Some(limit) = options.max_unpacked_bytes
        && let Some(manifest) = manifest_with(source, options)
        && manifest.total_bytes > limit
    {
        return Err(Error::TooLarge { limit });
    }

    tracing::info!(source = %source.display(), %kind, dest = %staging.path().display(), "extracting");
    let outcome = backend_for(kind)
        .extract(source, staging.path(), options)
        .and_then(|()| audit_tree(staging.path()));
    if let Err(e) = outcome {
        if e.is_security() {
            tracing::error!(source = %source.display(), error = %e, "traversal attempt, extraction discarded");
        }
        return Err(e);
    }

    let files = list_files(staging.path())?;
    let root = staging.commit();
    Ok(ExtractedFileSet { root, files })
}
