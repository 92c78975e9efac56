use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An extraction destination that is cleaned up again unless the extraction commits.
///
/// Only what the guard itself created is removed: a destination that did not
/// exist goes away entirely, an existing empty directory is emptied again.
/// Destinations that already hold files are refused up front.
pub struct Staging {
    root: PathBuf,
    created: bool,
    committed: bool,
}

impl Staging {
    /// Create `destination` if needed and resolve it to its canonical form.
    pub fn prepare(destination: impl AsRef<Path>) -> Result<Self> {
        let destination = destination.as_ref();
        let created = match std::fs::read_dir(destination) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    return Err(Error::DestinationNotEmpty {
                        path: destination.to_path_buf(),
                    });
                }
                false
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir_all(destination).map_err(|e| Error::DirectoryCreationFailed {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
                true
            }
            Err(e) => {
                return Err(Error::DirectoryCreationFailed {
                    path: destination.to_path_buf(),
                    source: e,
                });
            }
        };
        let root = destination.canonicalize()?;
        Ok(Self {
            root,
            created,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Keep the extracted tree and hand back its canonical root.
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.root)
    }

    fn purge(&self) -> std::io::Result<()> {
        if self.created {
            return std::fs::remove_dir_all(&self.root);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            // symlink_metadata: a link to a directory is removed, not followed
            if std::fs::symlink_metadata(&path)?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.purge() {
                tracing::warn!(path = %self.root.display(), error = %e, "failed to purge staging directory");
            }
        }
    }
}
