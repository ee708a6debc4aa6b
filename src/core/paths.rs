//! Logical (LFN) and physical (PFN) path helpers.
//!
//! Logical paths are plain `/`-separated strings compared byte-for-byte against
//! the protected list, so every LFN that reaches the index goes through
//! [`normalize_logical`] first.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Canonical form of a logical path: no empty or `.` components, no trailing
/// slash. The root stays `/`; a relative input stays relative.
pub fn normalize_logical(path: &str) -> String {
    let absolute = path.starts_with('/');
    let parts: Vec<&str> = path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Join a path relative to the scan root onto the logical root.
pub fn join_logical(lfn_root: &str, relative: &str) -> String {
    if relative.is_empty() {
        return normalize_logical(lfn_root);
    }
    normalize_logical(&format!("{lfn_root}/{relative}"))
}

/// Append one child name to a path relative to the scan root.
pub fn child_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Translate an LFN under `lfn_root` into the site's physical path.
///
/// Single prefix rule: `<lfn_root>/<rest>` maps to `<pfn_root>/<rest>`.
/// Returns `None` when the LFN is not under `lfn_root`.
pub fn lfn_to_pfn(lfn: &str, lfn_root: &str, pfn_root: &Path) -> Option<PathBuf> {
    let lfn = normalize_logical(lfn);
    let root = normalize_logical(lfn_root);
    if lfn == root {
        return Some(pfn_root.to_path_buf());
    }
    let rest = lfn.strip_prefix(&root)?.strip_prefix('/')?;
    Some(pfn_root.join(rest))
}

/// Translate a physical path under `pfn_root` back into its LFN.
pub fn pfn_to_lfn(pfn: &Path, pfn_root: &Path, lfn_root: &str) -> Option<String> {
    let rest = pfn.strip_prefix(pfn_root).ok()?;
    let mut relative = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => relative.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(join_logical(lfn_root, &relative.join("/")))
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components. Otherwise the path is made absolute relative to
/// CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
