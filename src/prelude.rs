//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use unmerged_cleaner::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, UmcError};
pub use crate::core::paths::{lfn_to_pfn, normalize_logical, pfn_to_lfn};

// Platform
pub use crate::platform::storage::{
    Listing, MemoryBackend, PosixBackend, StorageBackend, StorageType, backend_for,
};

// Logging
pub use crate::logger::jsonl::{ActivityLog, EventType, LogEntry};

// Scanner
pub use crate::scanner::protection::ProtectedIndex;
pub use crate::scanner::report::{SweepReport, TopLevelReport, WhichList, write_candidate_file};
pub use crate::scanner::source::ProtectedListSource;
pub use crate::scanner::sweep::{SweepOptions, context_from_config, now_unix, run_sweep};
pub use crate::scanner::tree::{DeletionCandidate, DirNode, ScanContext, Verdict, extract_candidates};
