//! Per-kind extraction strategies.
//!
//! Each [`ArchiveKind`] maps to exactly one [`Backend`] through [`STRATEGIES`];
//! supporting a new container means adding a row, not another branch.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};
use crate::extract::{self, EntrySource};
use crate::format::{ArchiveKind, Codec, sniff_file};
use crate::options::ExtractOptions;
use crate::tool::Archiver;

pub(crate) trait Backend: Sync {
    /// Populate `root`, which exists and is canonical.
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()>;

    /// Declared uncompressed size, from the archive index only.
    fn declared_size(&self, source: &Path, options: &ExtractOptions) -> Result<Option<u64>>;
}

struct Zip;
struct Tar(Codec);
struct Rar;
struct SevenZip;
struct Bare;
struct Fallback;

const STRATEGIES: &[(ArchiveKind, &dyn Backend)] = &[
    (ArchiveKind::Zip, &Zip),
    (ArchiveKind::Tar, &Tar(Codec::None)),
    (ArchiveKind::TarGz, &Tar(Codec::Gzip)),
    (ArchiveKind::TarBz2, &Tar(Codec::Bzip2)),
    (ArchiveKind::TarXz, &Tar(Codec::Xz)),
    (ArchiveKind::Rar, &Rar),
    (ArchiveKind::SevenZip, &SevenZip),
    (ArchiveKind::BareCompressed, &Bare),
    (ArchiveKind::Unknown, &Fallback),
];

pub(crate) fn backend_for(kind: ArchiveKind) -> &'static dyn Backend {
    STRATEGIES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, backend)| *backend)
        .unwrap_or(&Fallback)
}

fn open(source: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(source)?))
}

fn native_unpack<S: EntrySource>(mut source: S, root: &Path, options: &ExtractOptions) -> Result<()> {
    let unpacked = extract::unpack(&mut source, root, options.max_unpacked_bytes)?;
    tracing::debug!(
        kind = %source.kind(),
        files = unpacked.files,
        bytes = unpacked.bytes,
        "native extraction finished"
    );
    Ok(())
}

fn missing(kind: ArchiveKind, options: &ExtractOptions) -> Error {
    Error::BackendUnavailable {
        kind,
        missing: options.archiver.to_string_lossy().into_owned(),
    }
}

fn archiver(options: &ExtractOptions) -> Option<Archiver> {
    Archiver::locate(&options.archiver)
}

fn listed_size(source: &Path, options: &ExtractOptions) -> Option<u64> {
    archiver(options)?.list_sizes(source).map(|(total, _)| total)
}

fn via_archiver(kind: ArchiveKind, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
    match archiver(options) {
        Some(tool) => tool.extract(source, root),
        None => Err(missing(kind, options)),
    }
}

impl Backend for Zip {
    #[cfg(feature = "zip")]
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        native_unpack(extract::ZipSource::new(open(source)?)?, root, options)
    }

    #[cfg(not(feature = "zip"))]
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        via_archiver(ArchiveKind::Zip, source, root, options)
    }

    #[cfg(feature = "zip")]
    fn declared_size(&self, source: &Path, _options: &ExtractOptions) -> Result<Option<u64>> {
        extract::ZipSource::new(open(source)?)?.declared_size().map(Some)
    }

    #[cfg(not(feature = "zip"))]
    fn declared_size(&self, source: &Path, options: &ExtractOptions) -> Result<Option<u64>> {
        Ok(listed_size(source, options))
    }
}

impl Backend for Tar {
    #[cfg(feature = "tar")]
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        native_unpack(extract::TarSource::new(open(source)?, self.0)?, root, options)
    }

    #[cfg(not(feature = "tar"))]
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        via_archiver(ArchiveKind::Tar, source, root, options)
    }

    #[cfg(feature = "tar")]
    fn declared_size(&self, source: &Path, _options: &ExtractOptions) -> Result<Option<u64>> {
        extract::TarSource::new(open(source)?, self.0)?
            .declared_size()
            .map(Some)
    }

    #[cfg(not(feature = "tar"))]
    fn declared_size(&self, source: &Path, options: &ExtractOptions) -> Result<Option<u64>> {
        Ok(listed_size(source, options))
    }
}

/// Library first, then the archiver binary.
impl Backend for Rar {
    #[cfg(feature = "rar")]
    fn extract(&self, source: &Path, root: &Path, _options: &ExtractOptions) -> Result<()> {
        extract::rar::extract(source, root)
    }

    #[cfg(not(feature = "rar"))]
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        via_archiver(ArchiveKind::Rar, source, root, options)
    }

    #[cfg(feature = "rar")]
    fn declared_size(&self, source: &Path, _options: &ExtractOptions) -> Result<Option<u64>> {
        extract::rar::declared_size(source).map(Some)
    }

    #[cfg(not(feature = "rar"))]
    fn declared_size(&self, source: &Path, options: &ExtractOptions) -> Result<Option<u64>> {
        Ok(listed_size(source, options))
    }
}

impl SevenZip {
    #[cfg(feature = "sevenz")]
    fn in_process(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        native_unpack(extract::SevenZipSource::open(source)?, root, options)
    }

    #[cfg(not(feature = "sevenz"))]
    fn in_process(&self, _source: &Path, _root: &Path, options: &ExtractOptions) -> Result<()> {
        Err(missing(ArchiveKind::SevenZip, options))
    }
}

/// Archiver binary first, then the in-process reader.
impl Backend for SevenZip {
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        match archiver(options) {
            Some(tool) => tool.extract(source, root),
            None => self.in_process(source, root, options),
        }
    }

    #[cfg(feature = "sevenz")]
    fn declared_size(&self, source: &Path, _options: &ExtractOptions) -> Result<Option<u64>> {
        extract::SevenZipSource::open(source)?.declared_size().map(Some)
    }

    #[cfg(not(feature = "sevenz"))]
    fn declared_size(&self, source: &Path, options: &ExtractOptions) -> Result<Option<u64>> {
        Ok(listed_size(source, options))
    }
}

impl Backend for Bare {
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        via_archiver(ArchiveKind::BareCompressed, source, root, options)
    }

    fn declared_size(&self, _source: &Path, _options: &ExtractOptions) -> Result<Option<u64>> {
        // A bare stream has no index to read.
        Ok(None)
    }
}

impl Fallback {
    fn sniffed(&self, source: &Path, options: &ExtractOptions) -> Option<ArchiveKind> {
        if !options.sniff_unknown {
            return None;
        }
        match sniff_file(source) {
            Ok(kind) => kind.filter(|kind| kind.is_archive()),
            Err(e) => {
                tracing::debug!(source = %source.display(), error = %e, "could not sniff input");
                None
            }
        }
    }
}

/// Unknown names: trust the magic bytes when they are conclusive, otherwise
/// hand the file to the archiver and let it decide.
impl Backend for Fallback {
    fn extract(&self, source: &Path, root: &Path, options: &ExtractOptions) -> Result<()> {
        if let Some(kind) = self.sniffed(source, options) {
            tracing::info!(source = %source.display(), %kind, "format recognized from content");
            return backend_for(kind).extract(source, root, options);
        }
        match archiver(options) {
            Some(tool) => {
                tracing::warn!(
                    source = %source.display(),
                    archiver = %tool.program().display(),
                    "unrecognized archive format, trying the archiver"
                );
                tool.extract(source, root)
            }
            None => Err(Error::UnsupportedFormat {
                name: source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
        }
    }

    fn declared_size(&self, source: &Path, options: &ExtractOptions) -> Result<Option<u64>> {
        match self.sniffed(source, options) {
            Some(kind) => backend_for(kind).declared_size(source, options),
            None => Ok(None),
        }
    }
}
