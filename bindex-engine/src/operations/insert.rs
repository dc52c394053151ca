//! Insert: descend to the owning leaf, insert or overwrite, split upwards
//!
//! Node blocks are written bottom-up while the recursion unwinds; the header
//! is written last, so a block allocated by a split is only reachable from
//! the header once every node referencing it is on disk.

use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};
use crate::storage::block::Backend;
use crate::storage::node::{Node, NO_PARENT};
use crate::file_manager::IndexFile;

/// What an insert did to the stored pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new key was added
    Inserted,
    /// An existing key had its value replaced
    Updated { previous: u64 },
}

/// Median pair pushed up by a split, with the new right sibling
struct Promotion {
    separator: (u64, u64),
    right_block: u64,
}

struct Step {
    outcome: InsertOutcome,
    promotion: Option<Promotion>,
}

impl<F: Backend> IndexFile<F> {
    /// Insert a pair, overwriting the value of an existing key.
    ///
    /// Any failure leaves the handle poisoned; re-open the file to continue.
    pub fn insert(&mut self, key: u64, value: u64) -> IndexResult<InsertOutcome> {
        self.ensure_usable()?;

        let before = self.header;
        let result = self
            .insert_recursive(before.root_block_id, key, value, 0)
            .and_then(|step| {
                if self.header != before {
                    self.commit_header()?;
                } else {
                    self.flush_writes()?;
                }
                Ok(step.outcome)
            });

        match result {
            Ok(outcome) => {
                debug!("Insert ({}, {}): {:?}", key, value, outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Insert of key {} failed, handle needs re-open: {}", key, e);
                self.poison();
                Err(e)
            }
        }
    }

    fn insert_recursive(
        &mut self,
        block_id: u64,
        key: u64,
        value: u64,
        depth: u64,
    ) -> IndexResult<Step> {
        if depth > self.header.node_count() {
            return Err(IndexError::corrupt(block_id, "descent deeper than allocated blocks"));
        }

        let mut node = self.read_node(block_id)?;

        let index = match node.find(key) {
            Ok(index) => {
                // Key lives here (leaf or separator): overwrite in place
                let previous = std::mem::replace(&mut node.values[index], value);
                self.write_node(&node)?;
                return Ok(Step {
                    outcome: InsertOutcome::Updated { previous },
                    promotion: None,
                });
            }
            Err(index) => index,
        };

        if node.is_leaf() {
            node.upsert(key, value);
            let promotion = self.write_or_split(node)?;
            return Ok(Step {
                outcome: InsertOutcome::Inserted,
                promotion,
            });
        }

        let child = node.children[index];
        let Step { outcome, promotion } = self.insert_recursive(child, key, value, depth + 1)?;

        let promotion = match promotion {
            Some(promotion) => {
                node.insert_separator(index, promotion.separator, promotion.right_block);
                self.write_or_split(node)?
            }
            None => None,
        };
        Ok(Step { outcome, promotion })
    }

    /// Write a modified node, splitting it first if it overflowed
    fn write_or_split(&mut self, mut node: Node) -> IndexResult<Option<Promotion>> {
        if !node.is_overfull() {
            self.write_node(&node)?;
            return Ok(None);
        }

        if node.block_id == self.header.root_block_id {
            self.split_root(node)?;
            return Ok(None);
        }

        let right_block = self.allocate()?;
        let (separator, right) = node.split(right_block);
        debug!(
            "Split block {} at key {} into {} + {}",
            node.block_id, separator.0, node.block_id, right_block
        );

        self.write_node(&node)?;
        self.write_node(&right)?;
        self.reparent(&right.children, right_block)?;

        Ok(Some(Promotion {
            separator,
            right_block,
        }))
    }

    /// Split the root while keeping it at its block: both halves move to
    /// fresh blocks and the root block becomes their parent.
    fn split_root(&mut self, mut node: Node) -> IndexResult<()> {
        let root_block = node.block_id;
        let left_block = self.allocate()?;
        let right_block = self.allocate()?;

        let (separator, mut right) = node.split(right_block);
        node.block_id = left_block;
        node.parent_id = root_block;
        right.parent_id = root_block;

        self.write_node(&node)?;
        self.write_node(&right)?;
        self.reparent(&node.children, left_block)?;
        self.reparent(&right.children, right_block)?;

        let root = Node::new_internal(root_block, NO_PARENT, separator, left_block, right_block);
        self.write_node(&root)?;

        debug!(
            "Root split at key {}: children {} + {}",
            separator.0, left_block, right_block
        );
        Ok(())
    }

    /// Point moved children at their new parent
    fn reparent(&mut self, children: &[u64], parent_id: u64) -> IndexResult<()> {
        for &child in children {
            let mut node = self.read_node(child)?;
            if node.parent_id != parent_id {
                node.parent_id = parent_id;
                self.write_node(&node)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::IndexOptions;
    use crate::operations::tests_support::{check_tree, memory_index};
    use crate::storage::node::MAX_KEYS;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_small_scenario() {
        let mut index = memory_index();
        assert_eq!(index.insert(5, 50).unwrap(), InsertOutcome::Inserted);
        assert_eq!(index.insert(2, 20).unwrap(), InsertOutcome::Inserted);
        assert_eq!(index.insert(9, 90).unwrap(), InsertOutcome::Inserted);

        assert_eq!(index.search(2).unwrap(), 20);
        let pairs = index.entries().unwrap();
        assert_eq!(pairs, vec![(2, 20), (5, 50), (9, 90)]);

        // All three fit the root leaf, nothing allocated
        assert_eq!(index.header().next_block_id, 2);
        let root = index.read_node(1).unwrap();
        assert_eq!(root.keys, vec![2, 5, 9]);
    }

    #[test]
    fn test_overwrite_keeps_key_count() {
        let mut index = memory_index();
        index.insert(7, 1).unwrap();
        index.insert(3, 1).unwrap();

        let outcome = index.insert(7, 2).unwrap();
        assert_eq!(outcome, InsertOutcome::Updated { previous: 1 });

        let root = index.read_node(1).unwrap();
        assert_eq!(root.key_count(), 2);
        assert_eq!(index.search(7).unwrap(), 2);
        assert_eq!(index.entries().unwrap(), vec![(3, 1), (7, 2)]);
    }

    #[test]
    fn test_capacity_boundary_splits_root() {
        let mut index = memory_index();
        for k in 1..=MAX_KEYS as u64 {
            index.insert(k, k * 100).unwrap();
        }
        assert!(index.read_node(1).unwrap().is_leaf());
        assert_eq!(index.header().next_block_id, 2);

        index.insert(MAX_KEYS as u64 + 1, 0).unwrap();

        // Root stays at block 1 and now has two leaf children
        let root = index.read_node(1).unwrap();
        assert!(!root.is_leaf());
        assert_eq!(root.keys, vec![11]);
        assert_eq!(root.children, vec![2, 3]);
        assert_eq!(index.header().root_block_id, 1);
        assert_eq!(index.header().next_block_id, 4);

        let left = index.read_node(2).unwrap();
        let right = index.read_node(3).unwrap();
        assert_eq!(left.parent_id, 1);
        assert_eq!(right.parent_id, 1);
        assert_eq!(left.key_count() + right.key_count() + 1, MAX_KEYS + 1);

        check_tree(&mut index);
    }

    #[test]
    fn test_overwrite_of_separator_key() {
        let mut index = memory_index();
        for k in 1..=20u64 {
            index.insert(k, k).unwrap();
        }
        // Key 11 was promoted into the root
        assert_eq!(index.read_node(1).unwrap().keys, vec![11]);
        assert_eq!(
            index.insert(11, 1100).unwrap(),
            InsertOutcome::Updated { previous: 11 }
        );
        assert_eq!(index.search(11).unwrap(), 1100);
        assert_eq!(index.entries().unwrap().len(), 20);
    }

    #[test]
    fn test_many_inserts_build_deep_tree() {
        let mut index = memory_index();
        // Interleave ascending and descending to exercise both split sides
        let mut keys: Vec<u64> = Vec::new();
        for i in 0..1500u64 {
            keys.push(if i % 2 == 0 { i * 7 } else { 1_000_000 - i * 3 });
        }
        for &k in &keys {
            index.insert(k, k ^ 0xABCD).unwrap();
        }

        let depth = check_tree(&mut index);
        assert!(depth >= 3, "expected at least three levels, got {}", depth);

        for &k in &keys {
            assert_eq!(index.search(k).unwrap(), k ^ 0xABCD);
        }

        let pairs = index.entries().unwrap();
        assert_eq!(pairs.len(), keys.len());
        assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_inserts_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.idx");

        let mut index = IndexFile::create(&path, false, IndexOptions::default()).unwrap();
        for k in (0..400u64).rev() {
            index.insert(k, k + 1).unwrap();
        }
        let header = index.header();
        index.close().unwrap();

        let mut index = IndexFile::open(&path, IndexOptions::default()).unwrap();
        assert_eq!(index.header(), header);
        for k in 0..400u64 {
            assert_eq!(index.search(k).unwrap(), k + 1);
        }
        check_tree(&mut index);
    }

    #[test]
    fn test_failed_insert_poisons_handle() {
        let mut bytes = Vec::new();
        {
            let mut index =
                IndexFile::format(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
            index.insert(1, 1).unwrap();
        }

        // Corrupt the root record's key_count
        bytes[512 + 16] = 0xFF;

        let mut index = IndexFile::load(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
        assert!(matches!(
            index.insert(2, 2),
            Err(IndexError::CorruptNode { block: 1, .. })
        ));
        assert!(index.is_poisoned());
        assert!(matches!(index.insert(3, 3), Err(IndexError::NeedsReopen)));
        assert!(matches!(index.search(1), Err(IndexError::NeedsReopen)));
    }
}
