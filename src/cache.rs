//! File cache lookup boundary.
//!
//! The engine treats the package cache as an opaque service: given a
//! basename, either hand back the path of an already-cached artifact or
//! report a miss. [`DirCache`] is the straightforward implementation over a
//! list of cache directories; callers with their own cache layout implement
//! [`FileCache`] themselves.

use std::path::{Path, PathBuf};

/// Resolves basenames against a local file cache.
pub trait FileCache {
    /// The directory new downloads are written into.
    fn cachedir(&self) -> &Path;

    /// Looks up `basename`, returning the path of a cached copy if any.
    fn find(&self, basename: &str) -> Option<PathBuf>;
}

/// A file cache backed by an ordered list of directories.
///
/// Lookups scan the directories front to back; downloads land in the first
/// one.
#[derive(Debug, Clone)]
pub struct DirCache {
    dirs: Vec<PathBuf>,
}

impl DirCache {
    /// Creates a cache over `dirs`. The first directory is the write target
    /// and must exist.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        assert!(!dirs.is_empty(), "DirCache requires at least one directory");
        Self { dirs }
    }
}

impl FileCache for DirCache {
    fn cachedir(&self) -> &Path {
        &self.dirs[0]
    }

    fn find(&self, basename: &str) -> Option<PathBuf> {
        if basename.is_empty() {
            return None;
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(basename))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_scans_directories_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("pkg.tar.zst"), b"x").unwrap();

        let cache = DirCache::new(vec![first.path().into(), second.path().into()]);
        assert_eq!(
            cache.find("pkg.tar.zst"),
            Some(second.path().join("pkg.tar.zst"))
        );
        assert_eq!(cache.find("missing.tar.zst"), None);
        assert_eq!(cache.find(""), None);
        assert_eq!(cache.cachedir(), first.path());
    }
}
