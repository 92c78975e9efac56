use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Result of sanitizing an archive entry path.
#[derive(Clone, Debug)]
pub struct SanitizedPath {
    pub original: PathBuf,
    pub resolved: PathBuf,
}

impl SanitizedPath {
    /// True when the entry names the destination root itself (`./`, `a/..`).
    pub fn is_root(&self, base: &Path) -> bool {
        self.resolved == base
    }
}

/// Resolve an entry name against `base` without touching the filesystem.
///
/// `base` is expected to be canonical. Absolute names and names whose `..`
/// segments climb out of `base` are rejected with [`Error::TraversalBlocked`].
pub fn sanitize_path(entry_path: impl AsRef<Path>, base: impl AsRef<Path>) -> Result<SanitizedPath> {
    let entry_path = entry_path.as_ref();
    let base = base.as_ref();

    if entry_path.as_os_str().as_encoded_bytes().contains(&0) {
        return Err(blocked(entry_path, entry_path));
    }

    let normalized = normalize_path(entry_path);
    if entry_path.has_root() || normalized.has_root() || has_prefix(entry_path) {
        return Err(blocked(entry_path, &normalized));
    }

    let resolved = normalize_path(&base.join(entry_path));
    if !resolved.starts_with(base) {
        return Err(blocked(entry_path, &resolved));
    }

    Ok(SanitizedPath {
        original: entry_path.to_path_buf(),
        resolved,
    })
}

/// Resolve a link target relative to the link's own location.
///
/// Absolute targets are refused outright, the way a data-only tar filter does.
pub fn sanitize_link_target(
    target: impl AsRef<Path>,
    link_location: impl AsRef<Path>,
    base: impl AsRef<Path>,
) -> Result<PathBuf> {
    let target = target.as_ref();
    let link_location = link_location.as_ref();
    let base = base.as_ref();

    if target.has_root() || has_prefix(target) {
        return Err(blocked(target, target));
    }

    let anchor = link_location.parent().unwrap_or(base);
    let resolved = normalize_path(&anchor.join(target));
    if !resolved.starts_with(base) {
        return Err(blocked(target, &resolved));
    }

    Ok(resolved)
}

/// Check on disk that the parent of `path` canonicalizes to somewhere inside `base`.
///
/// Catches parents that were redirected through symlinks created by earlier entries.
pub fn ensure_within(base: &Path, path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Err(blocked(path, path));
    };
    let canonical = parent.canonicalize()?;
    if !canonical.starts_with(base) {
        return Err(blocked(path, &canonical));
    }
    Ok(())
}

/// Walk an already-extracted tree and verify nothing in it points outside `base`.
///
/// External tools give no per-entry hook, so their output is audited after the fact.
pub fn audit_tree(base: &Path) -> Result<()> {
    for entry in WalkDir::new(base).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let path = entry.path();

        if entry.path_is_symlink() {
            let target = std::fs::read_link(path)?;
            let relative = path.strip_prefix(base).unwrap_or(path);
            sanitize_link_target(&target, path, base).map_err(|_| Error::TraversalBlocked {
                entry: relative.to_path_buf(),
                resolved: target.clone(),
            })?;
            // Dangling links are harmless; live ones must land inside.
            if let Ok(real) = path.canonicalize()
                && !real.starts_with(base)
            {
                return Err(blocked(relative, &real));
            }
            continue;
        }

        let real = path.canonicalize()?;
        if !real.starts_with(base) || real == base {
            return Err(blocked(path, &real));
        }
    }
    Ok(())
}

/// Collapse `.` and `..` lexically. A `..` that climbs above the start is kept
/// verbatim, so escaping is detected by the caller's prefix check.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::ParentDir => {
                if depth == 0 {
                    result.push("..");
                } else {
                    result.pop();
                    depth -= 1;
                }
            }
            Component::Normal(part) => {
                result.push(part);
                depth += 1;
            }
            Component::RootDir => {
                result.push(Component::RootDir.as_os_str());
                depth = 0;
            }
            Component::Prefix(prefix) => {
                result.push(prefix.as_os_str());
                depth = 0;
            }
            Component::CurDir => {}
        }
    }

    result
}

fn has_prefix(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::Prefix(_)))
}

fn blocked(entry: &Path, resolved: &Path) -> Error {
    Error::TraversalBlocked {
        entry: entry.to_path_buf(),
        resolved: resolved.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> &'static Path {
        if cfg!(windows) {
            Path::new("C:/srv/unpack")
        } else {
            Path::new("/srv/unpack")
        }
    }

    #[test]
    fn basic_path_sanitization() {
        let result = sanitize_path("docs/readme.md", base()).unwrap();
        assert_eq!(result.original, Path::new("docs/readme.md"));
        assert_eq!(result.resolved, base().join("docs/readme.md"));
    }

    #[test]
    fn inner_parent_segments_are_allowed() {
        let result = sanitize_path("a/b/../c.txt", base()).unwrap();
        assert_eq!(result.resolved, base().join("a/c.txt"));
    }

    #[test]
    fn parent_escape_is_blocked() {
        let result = sanitize_path("../../evil.txt", base());
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));

        let result = sanitize_path("a/../../evil.txt", base());
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
    }

    #[test]
    fn absolute_entry_is_blocked() {
        let malicious = if cfg!(windows) { "C:\\etc\\passwd" } else { "/etc/passwd" };
        let result = sanitize_path(malicious, base());
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
    }

    #[test]
    fn root_entry_is_detected() {
        let result = sanitize_path("./", base()).unwrap();
        assert!(result.is_root(base()));
    }

    #[test]
    fn link_target_inside_base() {
        let link = base().join("bin/tool");
        let resolved = sanitize_link_target("../lib/tool.so", &link, base()).unwrap();
        assert_eq!(resolved, base().join("lib/tool.so"));
    }

    #[test]
    fn link_target_escaping_base() {
        let link = base().join("bin/tool");
        let result = sanitize_link_target("../../../etc/shadow", &link, base());
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
    }

    #[test]
    fn absolute_link_target_rejected() {
        let link = base().join("bin/tool");
        let target = if cfg!(windows) { "C:\\etc\\passwd" } else { "/etc/passwd" };
        let result = sanitize_link_target(target, &link, base());
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
    }

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path(Path::new("foo//bar/./baz/../qux")), Path::new("foo/bar/qux"));
        assert_eq!(normalize_path(Path::new("../x")), Path::new("../x"));
    }

    #[test]
    fn ensure_within_accepts_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(base.join("a/b")).unwrap();
        ensure_within(&base, &base.join("a/b/file.txt")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn ensure_within_rejects_symlinked_parent() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), base.join("escape")).unwrap();

        let result = ensure_within(&base, &base.join("escape/file.txt"));
        assert!(matches!(result, Err(Error::TraversalBlocked { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn audit_flags_escaping_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::write(base.join("ok.txt"), "fine").unwrap();
        audit_tree(&base).unwrap();

        std::os::unix::fs::symlink("/etc/hostname", base.join("leak")).unwrap();
        assert!(matches!(audit_tree(&base), Err(Error::TraversalBlocked { .. })));
    }
}
