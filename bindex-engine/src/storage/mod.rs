//! Storage layer for the index file format
//!
//! This module handles the low-level binary format of index files:
//! - Block I/O
//! - Header (block 0) encoding
//! - Node record encoding and in-memory node edits

pub mod block;
pub mod header;
pub mod node;

pub use block::{Backend, Block, BlockStore, BLOCK_SIZE};
pub use header::{Header, FORMAT_MARKER, HEADER_SIZE};
pub use node::{Node, MAX_KEYS, NODE_SIZE};
