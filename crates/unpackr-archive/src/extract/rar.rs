use std::path::Path;

use crate::error::{Error, Result};
use crate::sanitize::sanitize_path;

/// Extract through the bundled unrar library. Member names are vetted before
/// each write; the library has no notion of a destination boundary.
pub fn extract(archive: &Path, root: &Path) -> Result<()> {
    let mut cursor = unrar::Archive::new(archive)
        .open_for_processing()
        .map_err(Error::corrupted)?;

    while let Some(header) = cursor.read_header().map_err(Error::corrupted)? {
        let entry = header.entry();
        sanitize_path(&entry.filename, root)?;
        cursor = if entry.is_file() {
            header.extract_with_base(root).map_err(Error::corrupted)?
        } else {
            header.skip().map_err(Error::corrupted)?
        };
    }
    Ok(())
}

pub fn declared_size(archive: &Path) -> Result<u64> {
    let listing = unrar::Archive::new(archive)
        .open_for_listing()
        .map_err(Error::corrupted)?;
    let mut total = 0u64;
    for header in listing {
        let header = header.map_err(Error::corrupted)?;
        if header.is_file() {
            total = total.saturating_add(header.unpacked_size);
        }
    }
    Ok(total)
}
