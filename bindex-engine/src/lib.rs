//! Bindex Engine - disk-resident B-tree index of u64 keys to u64 values
//!
//! This crate provides the storage engine: a single file of 512-byte blocks
//! holding a header and one B-tree node per block, plus the operations on
//! it (insert, search, traversal, print, and dump load/extract).

pub mod error;
pub mod storage;
pub mod file_manager;
pub mod operations;

pub use error::{IndexError, IndexResult};
pub use file_manager::{IndexFile, IndexOptions, IndexStats};
pub use operations::{ImportFormat, ImportReport, InsertOutcome, PrintSummary};
