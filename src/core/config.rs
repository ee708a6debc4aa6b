//! Configuration system: TOML file + env var overrides + site defaults.

#![allow(missing_docs)]

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, UmcError};
use crate::core::paths::{normalize_logical, resolve_absolute_path};
use crate::platform::storage::StorageType;
use crate::scanner::report::WhichList;

/// Default protected-list endpoint published by the central operations team.
pub const DEFAULT_PROTECTED_URL: &str =
    "https://cmst2.web.cern.ch/cmst2/unified/listProtectedLFN.txt";

/// One week, in seconds.
pub const DEFAULT_MIN_AGE_SECONDS: u64 = 60 * 60 * 24 * 7;

static SITE_NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^T[0-3]_[A-Z]{2}_[A-Za-z0-9_-]+$").ok());

/// Full configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub scan: ScanConfig,
    pub output: OutputConfig,
    pub protected: ProtectedConfig,
    pub paths: PathsConfig,
}

/// Which site the sweep runs at and what storage it talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub storage_type: StorageType,
}

/// What to sweep and how conservative to be.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Logical root of the swept area; prefixes every candidate and protected lookup.
    pub lfn_to_clean: String,
    /// Physical location of `lfn_to_clean` on this site's storage.
    pub unmerged_dir_location: PathBuf,
    /// Names directly under the unmerged directory that are never swept.
    pub dirs_to_avoid: Vec<String>,
    pub min_age_seconds: u64,
    pub parallelism: usize,
}

/// Where and how the candidate list is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub deletion_file: PathBuf,
    pub which_list: WhichList,
}

/// Protected-list retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtectedConfig {
    /// `https://` / `http://` URL, or a local file path.
    pub source: String,
    pub timeout_seconds: u64,
}

/// Filesystem paths used by umc itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "T2_US_MIT".to_string(),
            storage_type: StorageType::Hadoop,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lfn_to_clean: "/store/unmerged".to_string(),
            unmerged_dir_location: PathBuf::from("/mnt/hadoop/cms/store/unmerged"),
            dirs_to_avoid: vec!["SAM".to_string(), "logs".to_string()],
            min_age_seconds: DEFAULT_MIN_AGE_SECONDS,
            parallelism: std::thread::available_parallelism()
                .map_or(2, |n| n.get().saturating_div(2).max(1)),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            deletion_file: PathBuf::from("/tmp/files_to_delete.txt"),
            which_list: WhichList::Directories,
        }
    }
}

impl Default for ProtectedConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_PROTECTED_URL.to_string(),
            timeout_seconds: 5 * 60,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[UMC-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("umc").join("config.toml"),
            activity_log: home_dir
                .join(".local")
                .join("share")
                .join("umc")
                .join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| UmcError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if is_explicit_path {
            return Err(UmcError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment or validating.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize the effective configuration.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Minimum age as a signed number of seconds, saturating on absurd values.
    #[must_use]
    pub fn min_age_secs_i64(&self) -> i64 {
        i64::try_from(self.scan.min_age_seconds).unwrap_or(i64::MAX)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("UMC_SITE_NAME") {
            self.site.name = raw;
        }
        if let Some(raw) = lookup("UMC_SITE_STORAGE_TYPE") {
            self.site.storage_type = parse_env_enum("UMC_SITE_STORAGE_TYPE", &raw)?;
        }

        if let Some(raw) = lookup("UMC_SCAN_LFN_TO_CLEAN") {
            self.scan.lfn_to_clean = raw;
        }
        if let Some(raw) = lookup("UMC_SCAN_UNMERGED_DIR") {
            self.scan.unmerged_dir_location = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("UMC_SCAN_DIRS_TO_AVOID") {
            self.scan.dirs_to_avoid = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup("UMC_SCAN_MIN_AGE_SECONDS") {
            self.scan.min_age_seconds = parse_env_u64("UMC_SCAN_MIN_AGE_SECONDS", &raw)?;
        }
        if let Some(raw) = lookup("UMC_SCAN_PARALLELISM") {
            self.scan.parallelism = parse_env_usize("UMC_SCAN_PARALLELISM", &raw)?;
        }

        if let Some(raw) = lookup("UMC_OUTPUT_DELETION_FILE") {
            self.output.deletion_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("UMC_OUTPUT_WHICH_LIST") {
            self.output.which_list = parse_env_enum("UMC_OUTPUT_WHICH_LIST", &raw)?;
        }

        if let Some(raw) = lookup("UMC_PROTECTED_SOURCE") {
            self.protected.source = raw;
        }
        if let Some(raw) = lookup("UMC_PROTECTED_TIMEOUT_SECONDS") {
            self.protected.timeout_seconds =
                parse_env_u64("UMC_PROTECTED_TIMEOUT_SECONDS", &raw)?;
        }

        if let Some(raw) = lookup("UMC_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Normalize paths for consistent comparison.
    pub fn normalize_paths(&mut self) {
        self.scan.lfn_to_clean = normalize_logical(&self.scan.lfn_to_clean);

        let s = self.scan.unmerged_dir_location.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.scan.unmerged_dir_location = PathBuf::from(stripped);
        }

        for name in &mut self.scan.dirs_to_avoid {
            *name = name.trim().to_string();
        }

        if !self.output.deletion_file.as_os_str().is_empty() {
            self.output.deletion_file = resolve_absolute_path(&self.output.deletion_file);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.site.name.is_empty()
            && !SITE_NAME_RE
                .as_ref()
                .is_some_and(|re| re.is_match(&self.site.name))
        {
            return Err(UmcError::InvalidConfig {
                details: format!(
                    "site.name {:?} must look like T<tier>_<CC>_<Name>, e.g. T2_US_MIT",
                    self.site.name
                ),
            });
        }

        if !self.scan.lfn_to_clean.starts_with('/') {
            return Err(UmcError::InvalidConfig {
                details: format!(
                    "scan.lfn_to_clean must be an absolute logical path, got {:?}",
                    self.scan.lfn_to_clean
                ),
            });
        }

        if self.scan.unmerged_dir_location.as_os_str().is_empty() {
            return Err(UmcError::InvalidConfig {
                details: "scan.unmerged_dir_location must be set".to_string(),
            });
        }

        for name in &self.scan.dirs_to_avoid {
            if name.is_empty() || name.contains('/') || name == "." || name == ".." {
                return Err(UmcError::InvalidConfig {
                    details: format!(
                        "scan.dirs_to_avoid entries must be plain directory names, got {name:?}"
                    ),
                });
            }
        }

        if self.scan.parallelism == 0 {
            return Err(UmcError::InvalidConfig {
                details: "scan.parallelism must be >= 1".to_string(),
            });
        }

        if self.output.deletion_file.as_os_str().is_empty() {
            return Err(UmcError::InvalidConfig {
                details: "output.deletion_file must be set".to_string(),
            });
        }

        if self.protected.source.trim().is_empty() {
            return Err(UmcError::InvalidConfig {
                details: "protected.source must name a URL or file".to_string(),
            });
        }

        if self.protected.timeout_seconds == 0 {
            return Err(UmcError::InvalidConfig {
                details: "protected.timeout_seconds must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Render a commented default configuration for `site`.
///
/// Keys appear in a fixed order with a short description above each one.
pub fn render_default_config(site: &str, generated_on: &str) -> String {
    let mut cfg = Config::default();
    cfg.site.name = site.to_string();

    let mut out = String::new();
    let _ = writeln!(out, "# Generated by `umc config init` {generated_on}");
    let _ = writeln!(
        out,
        "# Check every value against your site before running `umc sweep`.\n"
    );

    let _ = writeln!(out, "[site]");
    let _ = writeln!(
        out,
        "# Site the sweep runs at. Only used for bookkeeping; the physical\n\
         # location below is what actually gets scanned."
    );
    let _ = writeln!(out, "name = {}", toml_str(&cfg.site.name));
    let _ = writeln!(
        out,
        "# Storage technology: \"posix\", \"hadoop\" (FUSE mount) or \"dcache\" (NFS mount)."
    );
    let _ = writeln!(
        out,
        "storage_type = {}\n",
        toml_str(cfg.site.storage_type.as_str())
    );

    let _ = writeln!(out, "[scan]");
    let _ = writeln!(
        out,
        "# Logical root of the area being cleaned. Most sites keep the default,\n\
         # but e.g. /store/dcachetests/unmerged is possible."
    );
    let _ = writeln!(out, "lfn_to_clean = {}", toml_str(&cfg.scan.lfn_to_clean));
    let _ = writeln!(out, "# Physical location of lfn_to_clean on this site.");
    let _ = writeln!(
        out,
        "unmerged_dir_location = {}",
        toml_str(&cfg.scan.unmerged_dir_location.to_string_lossy())
    );
    let _ = writeln!(
        out,
        "# Directories directly inside the unmerged area to leave alone."
    );
    let avoid: Vec<String> = cfg.scan.dirs_to_avoid.iter().map(|n| toml_str(n)).collect();
    let _ = writeln!(out, "dirs_to_avoid = [{}]", avoid.join(", "));
    let _ = writeln!(
        out,
        "# Anything touched more recently than this many seconds is kept (default: one week)."
    );
    let _ = writeln!(out, "min_age_seconds = {}", cfg.scan.min_age_seconds);
    let _ = writeln!(out, "# Top-level directories swept concurrently.");
    let _ = writeln!(out, "parallelism = {}\n", cfg.scan.parallelism);

    let _ = writeln!(out, "[output]");
    let _ = writeln!(out, "# The candidate list is rewritten here on every successful run.");
    let _ = writeln!(
        out,
        "deletion_file = {}",
        toml_str(&cfg.output.deletion_file.to_string_lossy())
    );
    let _ = writeln!(
        out,
        "# \"directories\" lists each deletable subtree; \"files\" lists every file inside them."
    );
    let _ = writeln!(
        out,
        "which_list = {}\n",
        toml_str(cfg.output.which_list.as_str())
    );

    let _ = writeln!(out, "[protected]");
    let _ = writeln!(out, "# URL or local file holding {{\"protected\": [LFN, ...]}}.");
    let _ = writeln!(out, "source = {}", toml_str(&cfg.protected.source));
    let _ = writeln!(out, "timeout_seconds = {}", cfg.protected.timeout_seconds);

    out
}

/// Write a commented default configuration, refusing to clobber an existing file.
pub fn write_default_config(path: &Path, site: &str) -> Result<()> {
    if path.exists() {
        return Err(UmcError::InvalidConfig {
            details: format!("{} already exists; not overwriting", path.display()),
        });
    }
    let rendered = render_default_config(site, &generated_stamp());
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| UmcError::io(parent, source))?;
    }
    fs::write(path, rendered).map_err(|source| UmcError::io(path, source))
}

/// "on <date> at host <name>" for the header of generated configs.
pub fn generated_stamp() -> String {
    format!(
        "on {} at host {}",
        chrono::Local::now().format("%d %B %Y at %H:%M:%S"),
        local_hostname().unwrap_or_else(|| "unknown".to_string())
    )
}

/// Guess the site name from a host name's domain.
pub fn guess_site(hostname: &str) -> Option<&'static str> {
    const HOST_MAP: &[(&str, &str)] = &[
        ("desy.de", "T2_DE_DESY"),
        ("ultralight.org", "T2_US_Caltech"),
        ("ufl.edu", "T2_US_Florida"),
        ("mit.edu", "T2_US_MIT"),
        ("unl.edu", "T2_US_Nebraska"),
        ("ucsd.edu", "T2_US_UCSD"),
    ];
    HOST_MAP
        .iter()
        .find(|(domain, _)| hostname.contains(domain))
        .map(|(_, site)| *site)
}

/// Best-effort host name without pulling in a platform crate.
pub fn local_hostname() -> Option<String> {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/proc/sys/kernel/hostname").ok())
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|raw| raw.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn toml_str(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| UmcError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|error| UmcError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_enum<T: std::str::FromStr<Err = String>>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|error| UmcError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
