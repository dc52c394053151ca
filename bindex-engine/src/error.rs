//! Error taxonomy for the index engine
//!
//! Every engine operation returns [`IndexResult`]. Format and existence
//! errors abort only the requested operation; errors for which
//! [`IndexError::is_fatal`] is true leave the handle unusable until the
//! file is re-opened.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the bindex engine
#[derive(Error, Debug)]
pub enum IndexError {
    /// Header marker mismatch or an impossible header
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// The index file does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Search key is not stored in the index
    #[error("Key {0} not found")]
    KeyNotFound(u64),

    /// Target file exists and overwrite was not confirmed
    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Node record is undersized, overflowing or inconsistent
    #[error("Corrupt node at block {block}: {reason}")]
    CorruptNode { block: u64, reason: String },

    /// Short read of a block inside the live range
    #[error("Truncated block {0}")]
    TruncatedBlock(u64),

    /// Encoded record does not fit a block
    #[error("Record of {len} bytes does not fit block {block}")]
    BlockOverflow { block: u64, len: usize },

    /// Malformed import input
    #[error("Invalid import data at line {line}: {reason}")]
    InvalidImport { line: usize, reason: String },

    /// Import stopped by the sentinel limit
    #[error("Import aborted at line {line}: {count} consecutive (0,0) sentinel lines")]
    ImportAborted { line: usize, count: usize },

    /// Handle was poisoned by an earlier failed insert
    #[error("Index handle is unusable after a failed write; re-open the file")]
    NeedsReopen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// Shorthand for a [`IndexError::CorruptNode`]
    pub fn corrupt(block: u64, reason: impl Into<String>) -> Self {
        IndexError::CorruptNode {
            block,
            reason: reason.into(),
        }
    }

    /// Whether this error leaves on-disk state in doubt when raised by a write
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexError::Io(_)
                | IndexError::CorruptNode { .. }
                | IndexError::TruncatedBlock(_)
                | IndexError::InvalidFormat(_)
                | IndexError::BlockOverflow { .. }
                | IndexError::NeedsReopen
        )
    }

    /// Whether this error concerns a single unreadable node
    pub fn is_node_damage(&self) -> bool {
        matches!(
            self,
            IndexError::CorruptNode { .. } | IndexError::TruncatedBlock(_)
        )
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
