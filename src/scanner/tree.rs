//! Bottom-up directory aggregate and maximal deletable subtree extraction.
//!
//! A [`DirNode`] is built by [`DirNode::fill`], which recurses into every
//! subdirectory before combining the children's statistics, so a parent's
//! verdict is never computed from an unfinished child. Once filled, a node is
//! read-only.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::Serialize;

use crate::core::errors::Result;
use crate::core::paths::{child_relative, join_logical};
use crate::platform::storage::StorageBackend;
use crate::scanner::protection::ProtectedIndex;

/// Run-wide inputs shared by every worker.
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Logical prefix of the scan root, e.g. `/store/unmerged`.
    pub lfn_root: String,
    /// Physical location of the scan root.
    pub pfn_root: PathBuf,
    /// Reference time in Unix seconds, captured once per sweep.
    pub now: i64,
    /// Minimum idle age in seconds.
    pub min_age: i64,
    pub protected: ProtectedIndex,
}

impl ScanContext {
    /// Logical path of a node given its path relative to the scan root.
    pub fn lfn(&self, relative: &str) -> String {
        join_logical(&self.lfn_root, relative)
    }

    /// Physical path of a node given its path relative to the scan root.
    pub fn pfn(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.pfn_root.clone()
        } else {
            self.pfn_root.join(relative)
        }
    }

    fn old_enough(&self, latest: i64) -> bool {
        self.now.saturating_sub(latest) >= self.min_age
    }
}

/// Deletability of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Not filled yet.
    Unresolved,
    /// The node and its whole subtree may be removed.
    Deletable,
    /// Protected, too young, or holding something that is.
    Keep,
}

/// One directory and the rolled-up statistics of its subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    /// Path relative to the scan root, `/`-separated.
    pub relative: String,
    pub size: u64,
    pub file_count: u64,
    pub subnode_count: u64,
    /// Newest modification time found in the subtree (Unix seconds).
    pub latest: i64,
    pub verdict: Verdict,
    /// True when the node's logical path is on the protected list.
    pub protected: bool,
    pub children: Vec<DirNode>,
    /// Names of files directly inside this directory.
    pub files: Vec<String>,
}

impl DirNode {
    /// An unfilled node for `relative`.
    pub fn new(relative: impl Into<String>) -> Self {
        Self {
            relative: relative.into(),
            size: 0,
            file_count: 0,
            subnode_count: 0,
            latest: 0,
            verdict: Verdict::Unresolved,
            protected: false,
            children: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.relative
            .rsplit_once('/')
            .map_or(self.relative.as_str(), |(_, name)| name)
    }

    pub fn is_deletable(&self) -> bool {
        self.verdict == Verdict::Deletable
    }

    /// Aggregate this node's subtree.
    ///
    /// A protected node is finished immediately as [`Verdict::Keep`] with no
    /// children and no storage calls. Any storage failure aborts the fill.
    pub fn fill(mut self, ctx: &ScanContext, backend: &dyn StorageBackend) -> Result<Self> {
        if ctx.protected.contains(&ctx.lfn(&self.relative)) {
            self.protected = true;
            self.verdict = Verdict::Keep;
            return Ok(self);
        }

        let pfn = ctx.pfn(&self.relative);
        let listing = backend.list(&pfn)?;

        let mut children = Vec::with_capacity(listing.dirs.len());
        for dir in &listing.dirs {
            let child = Self::new(child_relative(&self.relative, dir)).fill(ctx, backend)?;
            children.push(child);
        }

        let mut latest = 0_i64;
        let mut size = 0_u64;
        for file in &listing.files {
            let file_pfn = pfn.join(file);
            latest = latest.max(backend.mod_time(&file_pfn)?);
            size = size.saturating_add(backend.size(&file_pfn)?);
        }

        let mut subnode_count = 0_u64;
        let mut file_count = listing.files.len() as u64;
        let mut all_children_deletable = true;
        for child in &children {
            subnode_count += child.subnode_count + 1;
            file_count += child.file_count;
            size = size.saturating_add(child.size);
            latest = latest.max(child.latest);
            all_children_deletable &= child.is_deletable();
        }

        if children.is_empty() && listing.files.is_empty() {
            latest = backend.mod_time(&pfn)?;
        }

        self.verdict = if all_children_deletable && ctx.old_enough(latest) {
            Verdict::Deletable
        } else {
            Verdict::Keep
        };
        self.size = size;
        self.file_count = file_count;
        self.subnode_count = subnode_count;
        self.latest = latest;
        self.children = children;
        self.files = listing.files;
        Ok(self)
    }

    /// Every file in the subtree as a path relative to the scan root,
    /// depth-first: a directory's own files, then each child in order.
    ///
    /// A directory with neither files nor subdirectories is listed itself,
    /// so a file-level list still covers every empty leaf.
    pub fn file_entries(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(usize::try_from(self.file_count).unwrap_or(0));
        self.collect_entries(&mut out);
        out
    }

    fn collect_entries(&self, out: &mut Vec<String>) {
        if self.files.is_empty() && self.children.is_empty() {
            out.push(self.relative.clone());
            return;
        }
        out.extend(self.files.iter().map(|f| child_relative(&self.relative, f)));
        for child in &self.children {
            child.collect_entries(out);
        }
    }
}

/// A deletable subtree exported for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionCandidate {
    /// Path relative to the scan root.
    pub relative: String,
    /// Logical path (`<lfn_root>/<relative>`).
    pub lfn: String,
    pub size: u64,
    pub file_count: u64,
    pub subnode_count: u64,
    pub latest: i64,
    /// Relative paths of every file and empty leaf directory in the
    /// subtree; filled only when the report lists files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// Maximal deletable subtrees of `root`, depth-first in listing order.
///
/// A deletable node is emitted and not descended into, so no candidate is an
/// ancestor of another. `with_files` also records every file below each
/// candidate.
pub fn extract_candidates(
    root: &DirNode,
    ctx: &ScanContext,
    with_files: bool,
) -> Vec<DeletionCandidate> {
    let mut out = Vec::new();
    extract_into(root, ctx, with_files, &mut out);
    out
}

fn extract_into(
    node: &DirNode,
    ctx: &ScanContext,
    with_files: bool,
    out: &mut Vec<DeletionCandidate>,
) {
    if node.is_deletable() {
        out.push(DeletionCandidate {
            relative: node.relative.clone(),
            lfn: ctx.lfn(&node.relative),
            size: node.size,
            file_count: node.file_count,
            subnode_count: node.subnode_count,
            latest: node.latest,
            files: if with_files { node.file_entries() } else { Vec::new() },
        });
        return;
    }
    for child in &node.children {
        extract_into(child, ctx, with_files, out);
    }
}
