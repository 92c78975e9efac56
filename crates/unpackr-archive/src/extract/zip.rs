use std::io::{Read, Seek};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::extract::{EntryKind, EntrySource, PendingEntry};
use crate::format::ArchiveKind;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub struct ZipSource<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = zip::ZipArchive::new(reader).map_err(Error::corrupted)?;
        Ok(Self { archive })
    }
}

/// Raw member name with DOS separators folded, so `..\..\x` is judged like `../../x`.
fn member_path(name: &str) -> PathBuf {
    PathBuf::from(name.replace('\\', "/"))
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Zip
    }

    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(PendingEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index).map_err(Error::corrupted)?;
            let name = member_path(file.name());
            let size = file.size();

            let is_symlink = file.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK);
            let kind = if file.is_dir() {
                EntryKind::Directory
            } else if is_symlink {
                let mut target = String::new();
                file.read_to_string(&mut target).map_err(Error::corrupted)?;
                EntryKind::Symlink {
                    target: PathBuf::from(target),
                }
            } else {
                EntryKind::File
            };

            visit(PendingEntry {
                name,
                size,
                kind,
                reader: &mut file,
            })?;
        }
        Ok(())
    }

    fn declared_size(&mut self) -> Result<u64> {
        let mut total = 0u64;
        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index).map_err(Error::corrupted)?;
            if !file.is_dir() {
                total = total.saturating_add(file.size());
            }
        }
        Ok(total)
    }
}
