//! LRU cache of decoded nodes
//!
//! Write-through: every node written to disk is also put here, so a cached
//! node is never newer or older than its block.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::storage::node::Node;

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Node cache keyed by block id. A capacity of 0 disables caching.
pub struct NodeCache {
    cache: Option<LruCache<u64, Node>>,
    stats: CacheStats,
}

impl NodeCache {
    /// Create a cache holding up to `capacity` nodes
    pub fn new(capacity: usize) -> Self {
        NodeCache {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
            stats: CacheStats::default(),
        }
    }

    /// Get a node from cache
    pub fn get(&mut self, block_id: u64) -> Option<Node> {
        let cache = self.cache.as_mut()?;
        match cache.get(&block_id) {
            Some(node) => {
                self.stats.hits += 1;
                Some(node.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Put a node into cache
    pub fn put(&mut self, node: Node) {
        if let Some(cache) = self.cache.as_mut() {
            if cache.len() == cache.cap().get() && !cache.contains(&node.block_id) {
                self.stats.evictions += 1;
            }
            cache.put(node.block_id, node);
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    /// Number of cached nodes
    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }
}
