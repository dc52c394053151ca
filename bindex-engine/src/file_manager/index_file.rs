//! Open index file handle
//!
//! An [`IndexFile`] owns the backing file, the in-memory copy of the header
//! and the node cache. All engine operations are methods on it; the file is
//! flushed and closed when the handle is closed or dropped.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{IndexError, IndexResult};
use crate::storage::block::{Backend, BlockStore, HEADER_BLOCK};
use crate::storage::header::Header;
use crate::storage::node::{Node, NO_PARENT};

use super::node_cache::{CacheStats, NodeCache};

/// Tunables for an open index
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Number of decoded nodes kept in memory (0 disables the cache)
    pub cache_blocks: usize,
    /// `fsync` after every committed insert instead of a plain flush
    pub sync_on_commit: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            cache_blocks: 256,
            sync_on_commit: false,
        }
    }
}

/// Snapshot of header-level statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub root_block_id: u64,
    pub next_block_id: u64,
    pub node_count: u64,
}

/// An open index file
pub struct IndexFile<F: Backend = File> {
    path: Option<PathBuf>,
    store: BlockStore<F>,
    pub(crate) header: Header,
    cache: NodeCache,
    options: IndexOptions,
    poisoned: bool,
}

impl IndexFile<File> {
    /// Create a new index file with an empty root.
    ///
    /// An existing file is replaced only when `overwrite` is set.
    pub fn create(path: &Path, overwrite: bool, options: IndexOptions) -> IndexResult<Self> {
        if path.exists() && !overwrite {
            return Err(IndexError::AlreadyExists(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut index = Self::format(file, options)?;
        index.path = Some(path.to_path_buf());
        info!("Created index {}", path.display());
        Ok(index)
    }

    /// Open an existing index file
    pub fn open(path: &Path, options: IndexOptions) -> IndexResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    IndexError::NotFound(path.to_path_buf())
                } else {
                    IndexError::Io(e)
                }
            })?;

        let mut index = Self::load(file, options)?;
        index.path = Some(path.to_path_buf());
        debug!(
            "Opened index {} (root={}, next={})",
            path.display(),
            index.header.root_block_id,
            index.header.next_block_id
        );
        Ok(index)
    }
}

impl<F: Backend> IndexFile<F> {
    /// Initialise a backend with a fresh header and empty root
    pub fn format(backend: F, options: IndexOptions) -> IndexResult<Self> {
        let header = Header::new();
        let mut index = IndexFile {
            path: None,
            store: BlockStore::new(backend),
            header,
            cache: NodeCache::new(options.cache_blocks),
            options,
            poisoned: false,
        };

        let root = Node::new_leaf(header.root_block_id, NO_PARENT);
        index.write_node(&root)?;
        index.commit_header()?;
        Ok(index)
    }

    /// Bind to a backend that already holds an index
    pub fn load(backend: F, options: IndexOptions) -> IndexResult<Self> {
        let mut store = BlockStore::new(backend);
        let block = store.read_block(HEADER_BLOCK).map_err(|e| match e {
            IndexError::TruncatedBlock(_) => {
                IndexError::InvalidFormat("file shorter than the header block".to_string())
            }
            other => other,
        })?;
        let header = Header::from_bytes(&block.data)?;

        Ok(IndexFile {
            path: None,
            store,
            header,
            cache: NodeCache::new(options.cache_blocks),
            options,
            poisoned: false,
        })
    }

    /// Path of the backing file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current header
    pub fn header(&self) -> Header {
        self.header
    }

    /// Header-level statistics
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            root_block_id: self.header.root_block_id,
            next_block_id: self.header.next_block_id,
            node_count: self.header.node_count(),
        }
    }

    /// Node cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Whether an earlier failed write made this handle unusable
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn ensure_usable(&self) -> IndexResult<()> {
        if self.poisoned {
            Err(IndexError::NeedsReopen)
        } else {
            Ok(())
        }
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
        self.cache.clear();
    }

    /// Read a live node, validating that it sits where it claims to
    pub(crate) fn read_node(&mut self, block_id: u64) -> IndexResult<Node> {
        if !self.header.is_live(block_id) {
            return Err(IndexError::corrupt(
                block_id,
                format!(
                    "pointer outside live range {}..{}",
                    self.header.root_block_id, self.header.next_block_id
                ),
            ));
        }
        if let Some(node) = self.cache.get(block_id) {
            return Ok(node);
        }

        let block = self.store.read_block(block_id)?;
        let node = Node::from_bytes(&block.data)?;
        if node.block_id != block_id {
            return Err(IndexError::corrupt(
                block_id,
                format!("record claims block {}", node.block_id),
            ));
        }

        self.cache.put(node.clone());
        Ok(node)
    }

    /// Read a block as a node, treating a short read past the allocation
    /// cursor as "no more blocks"
    pub(crate) fn read_node_if_present(&mut self, block_id: u64) -> IndexResult<Option<Node>> {
        if self.header.is_live(block_id) {
            return self.read_node(block_id).map(Some);
        }
        match self.store.read_block(block_id) {
            Ok(block) => Node::from_bytes(&block.data).map(Some),
            Err(IndexError::TruncatedBlock(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of complete blocks present in the backing file
    pub(crate) fn stored_blocks(&mut self) -> IndexResult<u64> {
        self.store.block_count()
    }

    pub(crate) fn write_node(&mut self, node: &Node) -> IndexResult<()> {
        let record = node.to_bytes()?;
        self.store.write_block(node.block_id, &record)?;
        self.cache.put(node.clone());
        Ok(())
    }

    /// Reserve a fresh block; persisted by the next header commit
    pub(crate) fn allocate(&mut self) -> IndexResult<u64> {
        let block_id = self.header.allocate()?;
        debug!("Allocated block {}", block_id);
        Ok(block_id)
    }

    /// Persist the header; the commit point of every allocating insert
    pub(crate) fn commit_header(&mut self) -> IndexResult<()> {
        let record = self.header.to_bytes();
        self.store.write_block(HEADER_BLOCK, &record)?;
        self.flush_writes()
    }

    pub(crate) fn flush_writes(&mut self) -> IndexResult<()> {
        if self.options.sync_on_commit {
            self.store.sync()
        } else {
            self.store.flush()
        }
    }

    /// Flush all writes to storage and release the handle
    pub fn close(mut self) -> IndexResult<()> {
        self.store.sync()
    }
}

impl<F: Backend> Drop for IndexFile<F> {
    fn drop(&mut self) {
        let _ = self.store.flush();
    }
}
