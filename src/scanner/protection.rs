//! Protected path index: exact-match membership over a sorted snapshot.
//!
//! The index answers one question during the walk: "is this directory's own
//! logical path on the protected list?". Protection is exact-path only. An
//! entry for `/store/unmerged/a` says nothing about `/store/unmerged/a/b`
//! by itself; the walk never reaches `b` because it stops at `a`.

#![allow(missing_docs)]

use crate::core::paths::normalize_logical;

/// Immutable, sorted, deduplicated set of protected logical paths.
///
/// Built once per sweep and shared read-only across workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedIndex {
    entries: Vec<String>,
}

impl ProtectedIndex {
    /// Build the index from any collection of logical paths.
    ///
    /// Entries are normalized (duplicate and trailing slashes removed), blank
    /// entries dropped, then sorted and deduplicated.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<String> = paths
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| normalize_logical(&p))
            .collect();
        entries.sort_unstable();
        entries.dedup();
        Self { entries }
    }

    /// True iff `path` equals an entry exactly after normalization.
    pub fn contains(&self, path: &str) -> bool {
        let needle = normalize_logical(path);
        self.entries
            .binary_search_by(|entry| entry.as_str().cmp(needle.as_str()))
            .is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of entries under `lfn_root` (inclusive), for the run summary.
    pub fn count_under(&self, lfn_root: &str) -> usize {
        let root = normalize_logical(lfn_root);
        let prefix = if root == "/" {
            root.clone()
        } else {
            format!("{root}/")
        };
        self.entries
            .iter()
            .filter(|e| **e == root || e.starts_with(&prefix))
            .count()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ProtectedIndex {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
