//! Storage backend trait and implementations (POSIX mounts, in-memory trees).
//!
//! The sweep only needs three primitives from a site's storage: list a
//! directory, read a modification time, read a size. Hadoop and dCache sites
//! expose their namespace through FUSE/NFS mounts, so they share the POSIX
//! implementation and differ only in the label reported to operators.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, UmcError};

/// Storage technology a site runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Posix,
    Hadoop,
    #[serde(rename = "dcache")]
    DCache,
}

impl StorageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Hadoop => "hadoop",
            Self::DCache => "dcache",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posix" => Ok(Self::Posix),
            "hadoop" => Ok(Self::Hadoop),
            "dcache" => Ok(Self::DCache),
            other => Err(format!(
                "unknown storage type {other:?} (expected posix, hadoop or dcache)"
            )),
        }
    }
}

/// Direct children of one directory, split by kind and sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Capability interface over a site's storage namespace.
///
/// Implementations must be shareable across the sweep's worker threads.
/// Errors are reported as [`UmcError::StorageIo`]; retry policy, if any,
/// belongs to the implementation.
pub trait StorageBackend: Send + Sync {
    /// Short label for reports.
    fn name(&self) -> &'static str;
    fn list(&self, path: &Path) -> Result<Listing>;
    /// Modification time in Unix seconds.
    fn mod_time(&self, path: &Path) -> Result<i64>;
    fn size(&self, path: &Path) -> Result<u64>;
}

/// Backend for anything reachable through the local VFS.
///
/// Symlinks are never followed: a link is reported as a file and stat'ed
/// with `lstat`, so a link to a directory outside the tree cannot pull that
/// directory into a candidate's size or age.
#[derive(Debug, Clone, Copy)]
pub struct PosixBackend {
    storage_type: StorageType,
}

impl Default for PosixBackend {
    fn default() -> Self {
        Self::new(StorageType::Posix)
    }
}

impl PosixBackend {
    #[must_use]
    pub const fn new(storage_type: StorageType) -> Self {
        Self { storage_type }
    }
}

impl StorageBackend for PosixBackend {
    fn name(&self) -> &'static str {
        self.storage_type.as_str()
    }

    fn list(&self, path: &Path) -> Result<Listing> {
        let entries = fs::read_dir(path).map_err(|source| UmcError::storage("list", path, source))?;
        let mut listing = Listing::default();

        for entry_result in entries {
            let entry = entry_result.map_err(|source| UmcError::storage("list", path, source))?;
            let file_type = entry
                .file_type()
                .map_err(|source| UmcError::storage("stat", entry.path(), source))?;
            let name = entry.file_name().into_string().map_err(|raw| {
                UmcError::storage(
                    "list",
                    path.join(&raw),
                    io::Error::new(ErrorKind::InvalidData, "entry name is not valid UTF-8"),
                )
            })?;
            if file_type.is_dir() {
                listing.dirs.push(name);
            } else {
                listing.files.push(name);
            }
        }

        listing.dirs.sort_unstable();
        listing.files.sort_unstable();
        Ok(listing)
    }

    fn mod_time(&self, path: &Path) -> Result<i64> {
        let meta =
            fs::symlink_metadata(path).map_err(|source| UmcError::storage("mtime", path, source))?;
        let modified = meta
            .modified()
            .map_err(|source| UmcError::storage("mtime", path, source))?;
        Ok(unix_seconds(modified))
    }

    fn size(&self, path: &Path) -> Result<u64> {
        fs::symlink_metadata(path)
            .map(|meta| meta.len())
            .map_err(|source| UmcError::storage("size", path, source))
    }
}

/// Whole seconds since the Unix epoch; negative for pre-epoch timestamps.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

/// Select the backend implementation for a configured storage type.
pub fn backend_for(storage_type: StorageType) -> Arc<dyn StorageBackend> {
    Arc::new(PosixBackend::new(storage_type))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemEntry {
    Dir { mtime: i64 },
    File { mtime: i64, size: u64 },
}

/// In-memory namespace for tests and rehearsals.
///
/// Paths are absolute; parents are created implicitly with the child's mtime.
/// Any path registered through [`MemoryBackend::fail_on`] makes every
/// operation on it return a storage error.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<PathBuf, MemEntry>,
    failing: Vec<PathBuf>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or re-stamp) a directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>, mtime: i64) -> &mut Self {
        let path = path.as_ref();
        self.ensure_parents(path, mtime);
        self.entries
            .insert(path.to_path_buf(), MemEntry::Dir { mtime });
        self
    }

    /// Add a file, creating missing parent directories.
    pub fn add_file(&mut self, path: impl AsRef<Path>, size: u64, mtime: i64) -> &mut Self {
        let path = path.as_ref();
        self.ensure_parents(path, mtime);
        self.entries
            .insert(path.to_path_buf(), MemEntry::File { mtime, size });
        self
    }

    /// Make every operation on `path` fail.
    pub fn fail_on(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.failing.push(path.as_ref().to_path_buf());
        self
    }

    fn ensure_parents(&mut self, path: &Path, mtime: i64) {
        let mut current = path.parent();
        while let Some(parent) = current {
            if parent.as_os_str().is_empty() {
                break;
            }
            self.entries
                .entry(parent.to_path_buf())
                .or_insert(MemEntry::Dir { mtime });
            current = parent.parent();
        }
    }

    fn lookup(&self, operation: &'static str, path: &Path) -> Result<MemEntry> {
        if self.failing.iter().any(|p| p == path) {
            return Err(UmcError::storage(
                operation,
                path,
                io::Error::other("injected storage failure"),
            ));
        }
        self.entries.get(path).copied().ok_or_else(|| {
            UmcError::storage(operation, path, io::Error::from(ErrorKind::NotFound))
        })
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list(&self, path: &Path) -> Result<Listing> {
        match self.lookup("list", path)? {
            MemEntry::Dir { .. } => {}
            MemEntry::File { .. } => {
                return Err(UmcError::storage(
                    "list",
                    path,
                    io::Error::new(ErrorKind::InvalidInput, "not a directory"),
                ));
            }
        }

        let mut listing = Listing::default();
        for (child, entry) in &self.entries {
            if child.parent() != Some(path) {
                continue;
            }
            let Some(name) = child.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match entry {
                MemEntry::Dir { .. } => listing.dirs.push(name.to_string()),
                MemEntry::File { .. } => listing.files.push(name.to_string()),
            }
        }
        Ok(listing)
    }

    fn mod_time(&self, path: &Path) -> Result<i64> {
        Ok(match self.lookup("mtime", path)? {
            MemEntry::Dir { mtime } | MemEntry::File { mtime, .. } => mtime,
        })
    }

    fn size(&self, path: &Path) -> Result<u64> {
        Ok(match self.lookup("size", path)? {
            MemEntry::Dir { .. } => 0,
            MemEntry::File { size, .. } => size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn storage_type_parses_case_insensitively() {
        assert_eq!("Hadoop".parse::<StorageType>().unwrap(), StorageType::Hadoop);
        assert_eq!("DCACHE".parse::<StorageType>().unwrap(), StorageType::DCache);
        assert!("tape".parse::<StorageType>().is_err());
        assert_eq!(StorageType::DCache.to_string(), "dcache");
    }

    #[test]
    fn posix_lists_dirs_and_files_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("b_dir")).unwrap();
        fs::create_dir_all(tmp.path().join("a_dir")).unwrap();
        fs::write(tmp.path().join("z.root"), b"12345").unwrap();
        fs::write(tmp.path().join("m.root"), b"1").unwrap();

        let backend = PosixBackend::default();
        let listing = backend.list(tmp.path()).unwrap();
        assert_eq!(listing.dirs, vec!["a_dir", "b_dir"]);
        assert_eq!(listing.files, vec!["m.root", "z.root"]);
        assert_eq!(backend.size(&tmp.path().join("z.root")).unwrap(), 5);
    }

    #[test]
    fn posix_mod_time_reflects_filetime() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("old.root");
        fs::write(&file, b"x").unwrap();
        filetime::set_file_mtime(&file, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();

        let backend = PosixBackend::new(StorageType::Hadoop);
        assert_eq!(backend.mod_time(&file).unwrap(), 1_000_000);
        assert_eq!(backend.name(), "hadoop");
    }

    #[test]
    fn posix_missing_directory_is_storage_error() {
        let backend = PosixBackend::default();
        let err = backend.list(Path::new("/definitely/not/here/umc")).unwrap_err();
        assert_eq!(err.code(), "UMC-3001");
    }

    #[cfg(unix)]
    #[test]
    fn posix_reports_symlinked_dirs_as_files() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir_all(&real).unwrap();
        std::os::unix::fs::symlink(&real, tmp.path().join("link")).unwrap();

        let listing = PosixBackend::default().list(tmp.path()).unwrap();
        assert_eq!(listing.dirs, vec!["real"]);
        assert_eq!(listing.files, vec!["link"]);
    }

    #[test]
    fn memory_backend_creates_parents_and_lists_children() {
        let mut backend = MemoryBackend::new();
        backend
            .add_file("/u/a/f1", 10, 100)
            .add_file("/u/a/sub/f2", 20, 200)
            .add_dir("/u/empty", 50);

        let root = backend.list(Path::new("/u")).unwrap();
        assert_eq!(root.dirs, vec!["a", "empty"]);
        assert!(root.files.is_empty());

        let a = backend.list(Path::new("/u/a")).unwrap();
        assert_eq!(a.dirs, vec!["sub"]);
        assert_eq!(a.files, vec!["f1"]);
        assert_eq!(backend.size(Path::new("/u/a/sub/f2")).unwrap(), 20);
        assert_eq!(backend.mod_time(Path::new("/u/empty")).unwrap(), 50);
    }

    #[test]
    fn memory_backend_injected_failure() {
        let mut backend = MemoryBackend::new();
        backend.add_dir("/u/bad", 1).fail_on("/u/bad");
        assert!(backend.list(Path::new("/u/bad")).is_err());
        assert!(backend.list(Path::new("/u")).is_ok());
    }

    #[test]
    fn unix_seconds_handles_pre_epoch() {
        let before = UNIX_EPOCH - std::time::Duration::from_secs(10);
        assert_eq!(unix_seconds(before), -10);
        assert_eq!(unix_seconds(UNIX_EPOCH), 0);
    }
}
