//! File manager for index files
//!
//! Owns the open file handle and the node cache.

pub mod index_file;
pub mod node_cache;

pub use index_file::{IndexFile, IndexOptions, IndexStats};
pub use node_cache::{CacheStats, NodeCache};
