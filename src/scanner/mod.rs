//! Unmerged-area scanner: protected index, tree aggregation, sweep driver, report.

pub mod protection;
pub mod report;
pub mod source;
pub mod sweep;
pub mod tree;
