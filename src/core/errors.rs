//! UMC-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, UmcError>;

/// Top-level error type for the unmerged cleaner.
#[derive(Debug, Error)]
pub enum UmcError {
    #[error("[UMC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[UMC-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[UMC-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[UMC-2001] cannot read protected list from {source_name}: {details}")]
    ProtectedList {
        source_name: String,
        details: String,
    },

    #[error("[UMC-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[UMC-3001] storage failure during {operation} at {path}: {source}")]
    StorageIo {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[UMC-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[UMC-3003] worker pool failure: {details}")]
    Worker { details: String },
}

impl UmcError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "UMC-1001",
            Self::MissingConfig { .. } => "UMC-1002",
            Self::ConfigParse { .. } => "UMC-1003",
            Self::ProtectedList { .. } => "UMC-2001",
            Self::Serialization { .. } => "UMC-2101",
            Self::StorageIo { .. } => "UMC-3001",
            Self::Io { .. } => "UMC-3002",
            Self::Worker { .. } => "UMC-3003",
        }
    }

    /// Whether rerunning the sweep later might resolve the failure.
    ///
    /// Nothing inside the engine retries; the flag is recorded in the
    /// activity log and shown by the CLI.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProtectedList { .. } | Self::StorageIo { .. } | Self::Io { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for storage-backend failures.
    #[must_use]
    pub fn storage(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::StorageIo {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for protected-list failures.
    #[must_use]
    pub fn protected_list(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ProtectedList {
            source_name: source_name.into(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for UmcError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for UmcError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for UmcError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
