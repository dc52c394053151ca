//! Point lookup by root-to-leaf descent

use crate::error::{IndexError, IndexResult};
use crate::file_manager::IndexFile;
use crate::storage::block::Backend;

impl<F: Backend> IndexFile<F> {
    /// Value stored for `key`, or `KeyNotFound`.
    ///
    /// Reads at most one node per tree level.
    pub fn search(&mut self, key: u64) -> IndexResult<u64> {
        self.ensure_usable()?;

        let mut block_id = self.header.root_block_id;
        // A path longer than the number of allocated blocks must loop
        for _ in 0..self.header.node_count() {
            let node = self.read_node(block_id)?;
            if let Ok(index) = node.find(key) {
                return Ok(node.values[index]);
            }
            match node.child_for(key) {
                Some(child) => block_id = child,
                None => return Err(IndexError::KeyNotFound(key)),
            }
        }

        Err(IndexError::corrupt(block_id, "search path does not reach a leaf"))
    }

    /// Like [`search`](Self::search) but maps an absent key to `None`
    pub fn get(&mut self, key: u64) -> IndexResult<Option<u64>> {
        match self.search(key) {
            Ok(value) => Ok(Some(value)),
            Err(IndexError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of levels from the root to the leftmost leaf
    pub fn height(&mut self) -> IndexResult<u64> {
        self.ensure_usable()?;

        let mut block_id = self.header.root_block_id;
        for level in 1..=self.header.node_count() {
            let node = self.read_node(block_id)?;
            match node.children.first() {
                Some(&child) => block_id = child,
                None => return Ok(level),
            }
        }

        Err(IndexError::corrupt(block_id, "leftmost path does not reach a leaf"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::IndexOptions;
    use crate::operations::tests_support::memory_index;
    use crate::storage::node::Node;
    use std::io::Cursor;

    #[test]
    fn test_search_empty_index() {
        let mut index = memory_index();
        assert!(matches!(index.search(42), Err(IndexError::KeyNotFound(42))));
        assert_eq!(index.get(42).unwrap(), None);
        assert_eq!(index.height().unwrap(), 1);
    }

    #[test]
    fn test_search_absent_keys_between_and_around() {
        let mut index = memory_index();
        for k in (10..=1000u64).step_by(10) {
            index.insert(k, k / 10).unwrap();
        }
        assert!(index.height().unwrap() >= 2);

        for k in (10..=1000u64).step_by(10) {
            assert_eq!(index.search(k).unwrap(), k / 10);
        }
        for absent in [0, 5, 15, 999, 1001, u64::MAX] {
            assert_eq!(index.get(absent).unwrap(), None, "key {}", absent);
        }
    }

    #[test]
    fn test_search_extreme_keys() {
        let mut index = memory_index();
        index.insert(0, 1).unwrap();
        index.insert(u64::MAX, 2).unwrap();
        assert_eq!(index.search(0).unwrap(), 1);
        assert_eq!(index.search(u64::MAX).unwrap(), 2);
    }

    #[test]
    fn test_search_detects_cycle() {
        let mut bytes = Vec::new();
        {
            let mut index =
                IndexFile::format(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
            for k in 1..=20u64 {
                index.insert(k, k).unwrap();
            }
            // Point the left leaf back at the root
            let mut left = index.read_node(2).unwrap();
            left.children = vec![1; left.keys.len() + 1];
            index.write_node(&left).unwrap();
        }

        let mut index = IndexFile::load(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
        let result = index.search(0);
        assert!(matches!(result, Err(IndexError::CorruptNode { .. })));
        // Search is read-only; the handle stays usable
        assert!(!index.is_poisoned());
    }

    #[test]
    fn test_search_dangling_child() {
        let mut index = memory_index();
        let root = Node::new_internal(1, 0, (50, 5), 2, 9);
        index.write_node(&root).unwrap();
        index.allocate().unwrap();
        index.write_node(&Node::new_leaf(2, 1)).unwrap();

        assert!(matches!(
            index.search(60),
            Err(IndexError::CorruptNode { block: 9, .. })
        ));
        assert!(matches!(index.search(40), Err(IndexError::KeyNotFound(40))));
    }

    #[test]
    fn test_search_with_inflated_header_and_huge_child() {
        let mut bytes = Vec::new();
        {
            let mut index =
                IndexFile::format(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
            let root = Node::new_internal(1, 0, (5, 50), 2, 1 << 60);
            index.write_node(&root).unwrap();
            index.header.next_block_id = u64::MAX;
            index.commit_header().unwrap();
        }

        let mut index = IndexFile::load(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
        assert_eq!(index.header().next_block_id, u64::MAX);
        assert!(matches!(
            index.search(10),
            Err(IndexError::CorruptNode { block, .. }) if block == 1 << 60
        ));
        assert!(matches!(index.search(1), Err(IndexError::TruncatedBlock(2))));
        assert_eq!(index.search(5).unwrap(), 50);

        // Descent reaches the same pointer and the insert fails cleanly
        assert!(index.insert(20, 1).is_err());
        assert!(index.is_poisoned());
    }
}
