use std::fs::File;
use std::path::{Path, PathBuf};

use sevenz_rust::{Password, SevenZReader};

use crate::error::{Error, Result};
use crate::extract::{EntryKind, EntrySource, PendingEntry};
use crate::format::ArchiveKind;

/// 7z archives read in-process, so entries pass through the same guard as zip.
pub struct SevenZipSource {
    reader: SevenZReader<File>,
}

impl SevenZipSource {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = SevenZReader::open(path, Password::empty()).map_err(Error::corrupted)?;
        Ok(Self { reader })
    }
}

impl EntrySource for SevenZipSource {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::SevenZip
    }

    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(PendingEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        // The reader callback speaks sevenz_rust errors; park ours and stop the walk.
        let mut failure = None;
        self.reader
            .for_each_entries(|entry, reader| {
                let kind = if entry.is_directory() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                match visit(PendingEntry {
                    name: PathBuf::from(entry.name().replace('\\', "/")),
                    size: entry.size(),
                    kind,
                    reader,
                }) {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        failure = Some(e);
                        Ok(false)
                    }
                }
            })
            .map_err(Error::corrupted)?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn declared_size(&mut self) -> Result<u64> {
        Ok(self
            .reader
            .archive()
            .files
            .iter()
            .filter(|entry| !entry.is_directory())
            .map(|entry| entry.size())
            .sum())
    }
}
