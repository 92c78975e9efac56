use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Closed classification of the archive containers this crate knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Rar,
    SevenZip,
    /// A single gz/bz2/xz stream with no tar container inside.
    BareCompressed,
    Unknown,
}

/// Suffix table, longest first so compound suffixes win over their tails.
const SUFFIXES: &[(&str, ArchiveKind)] = &[
    (".tar.bz2", ArchiveKind::TarBz2),
    (".tar.gz", ArchiveKind::TarGz),
    (".tar.xz", ArchiveKind::TarXz),
    (".tbz2", ArchiveKind::TarBz2),
    (".zip", ArchiveKind::Zip),
    (".tar", ArchiveKind::Tar),
    (".rar", ArchiveKind::Rar),
    (".tgz", ArchiveKind::TarGz),
    (".txz", ArchiveKind::TarXz),
    (".bz2", ArchiveKind::BareCompressed),
    (".7z", ArchiveKind::SevenZip),
    (".gz", ArchiveKind::BareCompressed),
    (".xz", ArchiveKind::BareCompressed),
];

impl ArchiveKind {
    /// Classify by the lower-cased suffix of the final path component.
    pub fn classify(name: impl AsRef<Path>) -> Self {
        match matching_suffix(name.as_ref()) {
            Some((_, kind)) => kind,
            None => Self::Unknown,
        }
    }

    pub fn is_archive(self) -> bool {
        self != Self::Unknown
    }

    /// Decompression layer wrapped around a tar stream, if this is a tar kind.
    pub fn tar_codec(self) -> Option<Codec> {
        match self {
            Self::Tar => Some(Codec::None),
            Self::TarGz => Some(Codec::Gzip),
            Self::TarBz2 => Some(Codec::Bzip2),
            Self::TarXz => Some(Codec::Xz),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::TarXz => "tar.xz",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::BareCompressed => "compressed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(name: impl AsRef<Path>) -> ArchiveKind {
    ArchiveKind::classify(name)
}

pub fn is_archive(name: impl AsRef<Path>) -> bool {
    ArchiveKind::classify(name).is_archive()
}

/// Split a file name into its stem and archive suffix (`"a.tar.gz"` -> `("a", ".tar.gz")`).
///
/// Names without a known archive suffix fall back to the last extension.
pub fn split_suffix(name: &str) -> (&str, &str) {
    if let Some((suffix_len, _)) = matching_suffix(Path::new(name)) {
        let cut = name.len() - suffix_len;
        if name.is_char_boundary(cut) {
            return (&name[..cut], &name[cut..]);
        }
    }
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => (&name[..dot], &name[dot..]),
    }
}

fn matching_suffix(path: &Path) -> Option<(usize, ArchiveKind)> {
    let file_name = path.file_name()?.to_str()?.to_lowercase();
    SUFFIXES
        .iter()
        .find(|(suffix, _)| file_name.len() > suffix.len() && file_name.ends_with(suffix))
        .map(|(suffix, kind)| (suffix.len(), *kind))
}

/// Identify a container from its leading bytes. Used when the name says nothing.
pub fn sniff(data: &[u8]) -> Option<ArchiveKind> {
    match data {
        [0x50, 0x4B, 0x03, 0x04, ..] | [0x50, 0x4B, 0x05, 0x06, ..] => Some(ArchiveKind::Zip),
        [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, ..] => Some(ArchiveKind::SevenZip),
        [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, ..] => Some(ArchiveKind::Rar),
        [0x1F, 0x8B, ..] | [0x42, 0x5A, 0x68, ..] | [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => {
            Some(ArchiveKind::BareCompressed)
        }
        _ if is_tar_header(data) => Some(ArchiveKind::Tar),
        _ => None,
    }
}

fn is_tar_header(data: &[u8]) -> bool {
    data.len() >= 263 && &data[257..262] == b"ustar"
}

pub fn sniff_file(path: &Path) -> io::Result<Option<ArchiveKind>> {
    let mut header = Vec::with_capacity(512);
    std::fs::File::open(path)?.take(512).read_to_end(&mut header)?;
    Ok(sniff(&header))
}

/// Compression codec wrapped around a tar stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Codec {
    pub fn decoder<R: Read>(self, reader: R) -> Result<Decoder<R>> {
        match self {
            Self::None => Ok(Decoder::Passthrough(reader)),
            #[cfg(feature = "tar")]
            Self::Gzip => Ok(Decoder::Gzip(Box::new(flate2::read::GzDecoder::new(reader)))),
            #[cfg(not(feature = "tar"))]
            Self::Gzip => Err(unsupported("gzip")),
            #[cfg(feature = "bzip2")]
            Self::Bzip2 => Ok(Decoder::Bzip2(Box::new(bzip2::read::BzDecoder::new(reader)))),
            #[cfg(not(feature = "bzip2"))]
            Self::Bzip2 => Err(unsupported("bzip2")),
            #[cfg(feature = "xz")]
            Self::Xz => Ok(Decoder::Xz(Box::new(xz2::read::XzDecoder::new(reader)))),
            #[cfg(not(feature = "xz"))]
            Self::Xz => Err(unsupported("xz")),
        }
    }
}

#[allow(dead_code)]
fn unsupported(codec: &str) -> Error {
    Error::UnsupportedFormat {
        name: format!("{codec} (feature disabled)"),
    }
}

/// Decoder wrapper for tar decompression.
pub enum Decoder<R: Read> {
    Passthrough(R),
    #[cfg(feature = "tar")]
    Gzip(Box<flate2::read::GzDecoder<R>>),
    #[cfg(feature = "bzip2")]
    Bzip2(Box<bzip2::read::BzDecoder<R>>),
    #[cfg(feature = "xz")]
    Xz(Box<xz2::read::XzDecoder<R>>),
}

impl<R: Read> fmt::Debug for Decoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codec = match self {
            Self::Passthrough(_) => Codec::None,
            #[cfg(feature = "tar")]
            Self::Gzip(_) => Codec::Gzip,
            #[cfg(feature = "bzip2")]
            Self::Bzip2(_) => Codec::Bzip2,
            #[cfg(feature = "xz")]
            Self::Xz(_) => Codec::Xz,
        };
        f.debug_tuple("Decoder").field(&codec).finish()
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Passthrough(r) => r.read(buf),
            #[cfg(feature = "tar")]
            Self::Gzip(d) => d.read(buf),
            #[cfg(feature = "bzip2")]
            Self::Bzip2(d) => d.read(buf),
            #[cfg(feature = "xz")]
            Self::Xz(d) => d.read(buf),
        }
    }
}
