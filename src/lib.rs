#![forbid(unsafe_code)]

//! Unmerged Cleaner (umc): finds stale, unprotected subtrees in a grid storage
//! site's unmerged staging area.
//!
//! A sweep walks every top-level directory under the scan root, aggregates
//! size, file counts and the newest modification time bottom-up, and marks a
//! subtree deletable only when everything in it is older than the minimum age
//! and nothing on its path is protected. The maximal deletable subtrees are
//! written to a candidate file for a separate deletion step.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use unmerged_cleaner::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use unmerged_cleaner::core::config::Config;
//! use unmerged_cleaner::scanner::tree::{DirNode, ScanContext};
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod platform;
pub mod scanner;
