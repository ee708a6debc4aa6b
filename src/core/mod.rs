//! Core types: errors, configuration, logical/physical path helpers.

pub mod config;
pub mod errors;
pub mod paths;
