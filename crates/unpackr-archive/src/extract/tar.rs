use std::io::Read;

use tar::EntryType;

use crate::error::{Error, Result};
use crate::extract::{EntryKind, EntrySource, PendingEntry};
use crate::format::{ArchiveKind, Codec, Decoder};

/// A tar stream, plain or wrapped in one compression layer.
///
/// The stream is single-pass: enumerate or measure it once, then drop it.
pub struct TarSource<R: Read> {
    archive: tar::Archive<Decoder<R>>,
    codec: Codec,
}

impl<R: Read> TarSource<R> {
    pub fn new(reader: R, codec: Codec) -> Result<Self> {
        let archive = tar::Archive::new(codec.decoder(reader)?);
        Ok(Self { archive, codec })
    }
}

/// Data-only filter: regular files, directories and links survive; device
/// nodes, fifos and metadata records are dropped.
fn classify_entry<R: Read>(entry: &tar::Entry<'_, R>) -> Result<EntryKind> {
    let entry_type = entry.header().entry_type();
    let kind = match entry_type {
        EntryType::Regular | EntryType::Continuous => EntryKind::File,
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink | EntryType::Link => {
            let target = entry
                .link_name()
                .map_err(Error::corrupted)?
                .ok_or_else(|| Error::corrupted("link entry without a target"))?
                .into_owned();
            if entry_type == EntryType::Symlink {
                EntryKind::Symlink { target }
            } else {
                EntryKind::HardLink { target }
            }
        }
        _ => EntryKind::Special,
    };
    Ok(kind)
}

impl<R: Read> EntrySource for TarSource<R> {
    fn kind(&self) -> ArchiveKind {
        match self.codec {
            Codec::None => ArchiveKind::Tar,
            Codec::Gzip => ArchiveKind::TarGz,
            Codec::Bzip2 => ArchiveKind::TarBz2,
            Codec::Xz => ArchiveKind::TarXz,
        }
    }

    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(PendingEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for entry in self.archive.entries().map_err(Error::corrupted)? {
            let mut entry = entry.map_err(Error::corrupted)?;
            let name = entry.path().map_err(Error::corrupted)?.into_owned();
            let size = entry.header().size().unwrap_or(0);
            let kind = classify_entry(&entry)?;

            visit(PendingEntry {
                name,
                size,
                kind,
                reader: &mut entry,
            })?;
        }
        Ok(())
    }

    fn declared_size(&mut self) -> Result<u64> {
        let mut total = 0u64;
        for entry in self.archive.entries().map_err(Error::corrupted)? {
            let entry = entry.map_err(Error::corrupted)?;
            if matches!(
                entry.header().entry_type(),
                EntryType::Regular | EntryType::Continuous
            ) {
                total = total.saturating_add(entry.header().size().map_err(Error::corrupted)?);
            }
        }
        Ok(total)
    }
}
