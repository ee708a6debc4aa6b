//! Storage access layer.

pub mod storage;
