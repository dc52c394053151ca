//! Index operations
//!
//! Each submodule adds methods to [`IndexFile`](crate::file_manager::IndexFile):
//! insert, search, in-order traversal, the diagnostic print, and bulk
//! load/extract of dump files.

pub mod export;
pub mod import;
pub mod insert;
pub mod print;
pub mod search;
pub mod traverse;

pub use import::{
    detect_format, parse_binary, parse_text, ImportFormat, ImportReport, ParsedDump,
    BINARY_RECORD_SIZE, MAX_CONSECUTIVE_SENTINELS,
};
pub use insert::InsertOutcome;
pub use print::PrintSummary;
pub use traverse::Traversal;
