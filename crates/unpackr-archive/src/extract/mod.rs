//! Entry-by-entry extraction for the formats this crate reads natively.
//!
//! A format only has to enumerate its entries through [`EntrySource`]; path
//! resolution, link policy, size ceilings and writing live in [`unpack`] so
//! every native format gets the same traversal guard.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::format::ArchiveKind;
use crate::sanitize::{ensure_within, sanitize_link_target, sanitize_path};

#[cfg(feature = "rar")]
pub(crate) mod rar;
#[cfg(feature = "sevenz")]
mod sevenz;
#[cfg(feature = "tar")]
mod tar;
#[cfg(feature = "zip")]
mod zip;

#[cfg(feature = "sevenz")]
pub use sevenz::SevenZipSource;
#[cfg(feature = "tar")]
pub use tar::TarSource;
#[cfg(feature = "zip")]
pub use zip::ZipSource;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink { target: PathBuf },
    /// Points at an earlier member of the same archive.
    HardLink { target: PathBuf },
    /// Device nodes, fifos and other metadata the data-only policy drops.
    Special,
}

/// An entry as announced by the archive, before anything touches the disk.
pub struct PendingEntry<'a> {
    pub name: PathBuf,
    pub size: u64,
    pub kind: EntryKind,
    pub reader: &'a mut dyn Read,
}

/// Archive-specific entry enumeration.
pub trait EntrySource {
    fn kind(&self) -> ArchiveKind;

    /// Feed every entry to `visit`, in archive order, stopping at the first error.
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(PendingEntry<'_>) -> Result<()>,
    ) -> Result<()>;

    /// Sum of declared member sizes, read from the index only.
    fn declared_size(&mut self) -> Result<u64>;
}

/// Counters for one native extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Unpacked {
    pub files: usize,
    pub bytes: u64,
}

/// Write every entry of `source` under `root`.
///
/// `root` must already exist and be canonical. The first entry that would land
/// outside it aborts the whole run with [`Error::TraversalBlocked`].
pub fn unpack<S: EntrySource + ?Sized>(
    source: &mut S,
    root: &Path,
    limit: Option<u64>,
) -> Result<Unpacked> {
    let mut unpacked = Unpacked::default();

    source.for_each_entry(&mut |entry| {
        let sanitized = sanitize_path(&entry.name, root)?;
        if sanitized.is_root(root) {
            return Ok(());
        }
        let target = sanitized.resolved;

        match entry.kind {
            EntryKind::Directory => create_dir(root, &target),
            EntryKind::File => {
                let remaining = limit.map(|l| l.saturating_sub(unpacked.bytes));
                let written = write_file(root, &target, entry.reader, remaining, limit)?;
                unpacked.files += 1;
                unpacked.bytes += written;
                Ok(())
            }
            EntryKind::Symlink { target: link_target } => {
                sanitize_link_target(&link_target, &target, root)?;
                write_symlink(root, &link_target, &target)
            }
            EntryKind::HardLink { target: member } => {
                let original = sanitize_path(&member, root)?.resolved;
                let written = copy_member(root, &original, &target)?;
                unpacked.files += 1;
                unpacked.bytes += written;
                Ok(())
            }
            EntryKind::Special => {
                tracing::debug!(entry = %entry.name.display(), "skipping special archive member");
                Ok(())
            }
        }
    })?;

    Ok(unpacked)
}

fn create_dir(root: &Path, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let canonical = path.canonicalize()?;
    if !canonical.starts_with(root) {
        return Err(Error::TraversalBlocked {
            entry: path.to_path_buf(),
            resolved: canonical,
        });
    }
    Ok(())
}

fn prepare_parent(root: &Path, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    ensure_within(root, path)?;
    // A previous member may have planted a link here; never write through it.
    if let Ok(meta) = std::fs::symlink_metadata(path)
        && meta.file_type().is_symlink()
    {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn write_file(
    root: &Path,
    path: &Path,
    reader: &mut dyn Read,
    remaining: Option<u64>,
    limit: Option<u64>,
) -> Result<u64> {
    prepare_parent(root, path)?;
    let mut file = std::fs::File::create(path).map_err(|e| Error::ExtractionFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let written = match remaining {
        Some(remaining) => io::copy(&mut reader.take(remaining.saturating_add(1)), &mut file),
        None => io::copy(reader, &mut file),
    }
    .map_err(|e| copy_error(path, e))?;

    if let (Some(remaining), Some(limit)) = (remaining, limit)
        && written > remaining
    {
        return Err(Error::TooLarge { limit });
    }
    Ok(written)
}

fn copy_member(root: &Path, original: &Path, path: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(original).map_err(|_| Error::corrupted(format!(
        "hard link to missing member '{}'",
        original.display()
    )))?;
    if !meta.is_file() {
        return Err(Error::corrupted(format!(
            "hard link to non-file member '{}'",
            original.display()
        )));
    }
    prepare_parent(root, path)?;
    std::fs::copy(original, path).map_err(|e| Error::ExtractionFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn write_symlink(root: &Path, link_target: &Path, link: &Path) -> Result<()> {
    prepare_parent(root, link)?;
    if std::fs::symlink_metadata(link).is_ok() {
        std::fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(link_target, link).map_err(|e| Error::ExtractionFailed {
        path: link.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn write_symlink(_root: &Path, _link_target: &Path, link: &Path) -> Result<()> {
    tracing::debug!(link = %link.display(), "symlinks are not materialized on this platform");
    Ok(())
}

/// Decoder and container failures surface as I/O errors mid-copy.
fn copy_error(path: &Path, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            Error::corrupted(format!("{}: {e}", path.display()))
        }
        _ => Error::ExtractionFailed {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory source used to drive `unpack` without a real container.
    struct Scripted(Vec<(&'static str, EntryKind, &'static [u8])>);

    impl EntrySource for Scripted {
        fn kind(&self) -> ArchiveKind {
            ArchiveKind::Unknown
        }

        fn for_each_entry(
            &mut self,
            visit: &mut dyn FnMut(PendingEntry<'_>) -> Result<()>,
        ) -> Result<()> {
            for (name, kind, data) in &self.0 {
                let mut reader = Cursor::new(*data);
                visit(PendingEntry {
                    name: PathBuf::from(name),
                    size: data.len() as u64,
                    kind: kind.clone(),
                    reader: &mut reader,
                })?;
            }
            Ok(())
        }

        fn declared_size(&mut self) -> Result<u64> {
            Ok(self.0.iter().map(|(_, _, d)| d.len() as u64).sum())
        }
    }

    fn root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn unpack_writes_files_and_dirs() {
        let (_dir, root) = root();
        let mut source = Scripted(vec![
            ("docs/", EntryKind::Directory, b""),
            ("docs/a.txt", EntryKind::File, b"alpha"),
            ("b.txt", EntryKind::File, b"beta"),
        ]);
        let unpacked = unpack(&mut source, &root, None).unwrap();
        assert_eq!(unpacked, Unpacked { files: 2, bytes: 9 });
        assert_eq!(std::fs::read(root.join("docs/a.txt")).unwrap(), b"alpha");
    }

    #[test]
    fn unpack_blocks_traversal() {
        let (dir, root) = root();
        let mut source = Scripted(vec![("../escape.txt", EntryKind::File, b"x")]);
        let result = unpack(&mut source, &root, None);
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn unpack_skips_special_members() {
        let (_dir, root) = root();
        let mut source = Scripted(vec![("dev/null", EntryKind::Special, b"")]);
        let unpacked = unpack(&mut source, &root, None).unwrap();
        assert_eq!(unpacked.files, 0);
        assert!(!root.join("dev/null").exists());
    }

    #[test]
    fn unpack_copies_hard_links() {
        let (_dir, root) = root();
        let mut source = Scripted(vec![
            ("a.txt", EntryKind::File, b"shared"),
            (
                "b.txt",
                EntryKind::HardLink {
                    target: PathBuf::from("a.txt"),
                },
                b"",
            ),
        ]);
        unpack(&mut source, &root, None).unwrap();
        assert_eq!(std::fs::read(root.join("b.txt")).unwrap(), b"shared");
    }

    #[test]
    fn unpack_rejects_escaping_link() {
        let (_dir, root) = root();
        let mut source = Scripted(vec![(
            "link",
            EntryKind::Symlink {
                target: PathBuf::from("../../etc/passwd"),
            },
            b"",
        )]);
        let result = unpack(&mut source, &root, None);
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
    }

    #[test]
    fn unpack_enforces_size_ceiling() {
        let (_dir, root) = root();
        let mut source = Scripted(vec![
            ("a.bin", EntryKind::File, b"12345"),
            ("b.bin", EntryKind::File, b"67890"),
        ]);
        let result = unpack(&mut source, &root, Some(8));
        assert!(matches!(result, Err(Error::TooLarge { limit: 8 })));
    }
}
