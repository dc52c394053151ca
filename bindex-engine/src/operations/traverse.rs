//! In-order traversal
//!
//! [`Traversal`] walks the tree with an explicit stack, reading nodes only
//! as it reaches them. Calling [`IndexFile::traverse`] again restarts from
//! the smallest key.

use tracing::warn;

use crate::error::{IndexError, IndexResult};
use crate::file_manager::IndexFile;
use crate::storage::block::Backend;
use crate::storage::node::Node;

/// A node on the descent path and the next entry to emit from it
struct Frame {
    node: Node,
    next: usize,
}

/// Lazy ascending iterator over all stored pairs.
///
/// A subtree whose root cannot be read yields one `Err` item and is
/// skipped; iteration then continues with the remaining pairs.
pub struct Traversal<'a, F: Backend> {
    index: &'a mut IndexFile<F>,
    stack: Vec<Frame>,
    pending: Option<IndexError>,
    visited: u64,
}

impl<'a, F: Backend> Traversal<'a, F> {
    fn new(index: &'a mut IndexFile<F>) -> Self {
        let root = index.header.root_block_id;
        let mut traversal = Traversal {
            index,
            stack: Vec::new(),
            pending: None,
            visited: 0,
        };
        traversal.descend_left(root);
        traversal
    }

    /// Push `block_id` and its leftmost descendants onto the stack
    fn descend_left(&mut self, mut block_id: u64) {
        loop {
            // More node visits than allocated nodes means a pointer cycle
            if self.visited >= self.index.header.node_count() {
                self.pending = Some(IndexError::corrupt(block_id, "node visited twice"));
                return;
            }
            self.visited += 1;

            let node = match self.index.read_node(block_id) {
                Ok(node) => node,
                Err(e) => {
                    warn!("Skipping unreadable subtree at block {}: {}", block_id, e);
                    self.pending = Some(e);
                    return;
                }
            };

            let first_child = node.children.first().copied();
            self.stack.push(Frame { node, next: 0 });
            match first_child {
                Some(child) => block_id = child,
                None => return,
            }
        }
    }
}

impl<F: Backend> Iterator for Traversal<'_, F> {
    type Item = IndexResult<(u64, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }

        loop {
            let frame = self.stack.last_mut()?;
            if frame.next >= frame.node.key_count() {
                self.stack.pop();
                continue;
            }

            let index = frame.next;
            frame.next += 1;
            let pair = (frame.node.keys[index], frame.node.values[index]);
            let right = frame.node.children.get(index + 1).copied();

            if let Some(child) = right {
                self.descend_left(child);
            }
            return Some(Ok(pair));
        }
    }
}

impl<F: Backend> IndexFile<F> {
    /// Iterate all pairs in ascending key order
    pub fn traverse(&mut self) -> IndexResult<Traversal<'_, F>> {
        self.ensure_usable()?;
        Ok(Traversal::new(self))
    }

    /// Collect every pair, failing on the first unreadable node
    pub fn entries(&mut self) -> IndexResult<Vec<(u64, u64)>> {
        self.traverse()?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::IndexOptions;
    use crate::operations::tests_support::memory_index;
    use std::io::Cursor;

    #[test]
    fn test_traverse_empty() {
        let mut index = memory_index();
        assert_eq!(index.traverse().unwrap().count(), 0);
    }

    #[test]
    fn test_traverse_sorted_regardless_of_order() {
        let mut index = memory_index();
        let mut keys: Vec<u64> = (0..500u64).map(|i| (i * 7919) % 1009).collect();
        keys.dedup();
        for &k in &keys {
            index.insert(k, k * 2).unwrap();
        }

        let pairs = index.entries().unwrap();
        let mut expected: Vec<u64> = keys.clone();
        expected.sort_unstable();
        expected.dedup();

        assert_eq!(pairs.iter().map(|p| p.0).collect::<Vec<_>>(), expected);
        assert!(pairs.iter().all(|&(k, v)| v == k * 2));
    }

    #[test]
    fn test_traverse_is_restartable_and_lazy() {
        let mut index = memory_index();
        for k in 1..=100u64 {
            index.insert(k, k).unwrap();
        }

        let first: Vec<_> = index
            .traverse()
            .unwrap()
            .take(3)
            .collect::<IndexResult<_>>()
            .unwrap();
        assert_eq!(first, vec![(1, 1), (2, 2), (3, 3)]);

        assert_eq!(index.entries().unwrap().len(), 100);
        assert_eq!(index.entries().unwrap().len(), 100);
    }

    #[test]
    fn test_traverse_skips_corrupt_subtree() {
        let mut bytes = Vec::new();
        {
            let mut index =
                IndexFile::format(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
            for k in 1..=20u64 {
                index.insert(k, k).unwrap();
            }
        }
        // Root [11] over leaves 2 (1..=10) and 3 (12..=20); break leaf 2
        bytes[2 * 512 + 16] = 0xEE;

        let mut index = IndexFile::load(Cursor::new(&mut bytes), IndexOptions::default()).unwrap();
        let items: Vec<_> = index.traverse().unwrap().collect();

        assert!(matches!(
            items[0],
            Err(IndexError::CorruptNode { block: 2, .. })
        ));
        let keys: Vec<u64> = items[1..]
            .iter()
            .map(|item| item.as_ref().map(|p| p.0).unwrap())
            .collect();
        assert_eq!(keys, (11..=20).collect::<Vec<_>>());

        assert!(index.entries().is_err());
    }
}
