//! Sweep report: per-top-level summary table and the candidate file.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, UmcError};
use crate::core::paths::join_logical;
use crate::scanner::tree::DeletionCandidate;

const GIB: u64 = 1024 * 1024 * 1024;

/// First header line of the summary table.
pub const HEADER_LINE_1: &str = "# Folders  Total    Total  DiskSize  FolderName";
/// Second header line of the summary table.
pub const HEADER_LINE_2: &str = "#          Folders  Files  [GB]                ";

/// Granularity of the candidate file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhichList {
    /// One line per candidate directory.
    #[default]
    Directories,
    /// One line per file inside each candidate directory.
    Files,
}

impl WhichList {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directories => "directories",
            Self::Files => "files",
        }
    }
}

impl fmt::Display for WhichList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WhichList {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "directories" | "dirs" => Ok(Self::Directories),
            "files" => Ok(Self::Files),
            other => Err(format!(
                "unknown list granularity {other:?} (expected directories or files)"
            )),
        }
    }
}

/// Result of sweeping one top-level directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopLevelReport {
    pub name: String,
    pub candidates: Vec<DeletionCandidate>,
    pub elapsed_ms: u64,
}

impl TopLevelReport {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Directories below the candidates, not counting the candidates.
    pub fn total_dirs(&self) -> u64 {
        self.candidates.iter().map(|c| c.subnode_count).sum()
    }

    pub fn total_files(&self) -> u64 {
        self.candidates.iter().map(|c| c.file_count).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.size).sum()
    }

    /// Whole GiB, truncated.
    pub fn total_gib(&self) -> u64 {
        self.total_bytes() / GIB
    }

    /// One row of the summary table.
    pub fn summary_line(&self) -> String {
        format!(
            "  {:<8} {:<8} {:<6} {:<9} {}",
            self.candidate_count(),
            self.total_dirs(),
            self.total_files(),
            self.total_gib(),
            self.name
        )
    }
}

/// Everything one sweep found.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub site: String,
    pub storage: String,
    pub lfn_root: String,
    pub pfn_root: PathBuf,
    /// Reference time of the sweep, Unix seconds.
    pub now: i64,
    pub min_age_seconds: i64,
    pub protected_entries: usize,
    pub which_list: WhichList,
    /// Top-level directories left out by the skip list.
    pub skipped: Vec<String>,
    /// Every swept top-level directory, sorted by name, including those
    /// without candidates.
    pub top_levels: Vec<TopLevelReport>,
    pub elapsed_ms: u64,
}

impl SweepReport {
    pub fn candidate_count(&self) -> usize {
        self.top_levels.iter().map(TopLevelReport::candidate_count).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.top_levels.iter().map(TopLevelReport::total_bytes).sum()
    }

    /// Summary rows for top-level directories with at least one candidate.
    pub fn summary_lines(&self) -> Vec<String> {
        self.top_levels
            .iter()
            .filter(|t| !t.candidates.is_empty())
            .map(TopLevelReport::summary_line)
            .collect()
    }

    /// Lines of the candidate file in the logical namespace.
    pub fn candidate_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for candidate in self.top_levels.iter().flat_map(|t| &t.candidates) {
            match self.which_list {
                WhichList::Directories => lines.push(candidate.lfn.clone()),
                WhichList::Files => lines.extend(
                    candidate
                        .files
                        .iter()
                        .map(|f| join_logical(&self.lfn_root, f)),
                ),
            }
        }
        lines
    }
}

/// Replace `path` with `lines`, one per line.
///
/// The content goes to a sibling temp file first and is renamed into place,
/// so readers never see a partial list.
pub fn write_candidate_file(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| UmcError::io(parent, e))?;
    }
    let tmp_path = temp_sibling(path);

    let result = (|| {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| UmcError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writeln!(writer, "{line}").map_err(|e| UmcError::io(&tmp_path, e))?;
        }
        writer.flush().map_err(|e| UmcError::io(&tmp_path, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| UmcError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| UmcError::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp.{}", std::process::id()));
    path.with_file_name(name)
}
