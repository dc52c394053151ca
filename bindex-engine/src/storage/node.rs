//! B-tree node records
//!
//! Each node occupies one block. Layout (little-endian):
//! - Offset 0x000: block_id (u64)
//! - Offset 0x008: parent_id (u64, 0 for the root)
//! - Offset 0x010: key_count (u64)
//! - Offset 0x018: keys region (19 x u64)
//! - Offset 0x0B0: values region (19 x u64)
//! - Offset 0x148: children region (20 x u64)
//!
//! Slots beyond `key_count` are zero. A node whose first child slot is zero
//! is a leaf; block 0 is the header, so it can never be a child.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{IndexError, IndexResult};

/// Maximum keys per node (fanout K)
pub const MAX_KEYS: usize = 19;

/// Maximum child pointers per node
pub const MAX_CHILDREN: usize = MAX_KEYS + 1;

/// Size of the keys (and values) region
pub const KEYS_REGION: usize = MAX_KEYS * 8;

/// Size of the children region
pub const CHILDREN_REGION: usize = MAX_CHILDREN * 8;

/// Fixed fields before the regions
const NODE_HEADER_SIZE: usize = 24;

/// Encoded node size in bytes
pub const NODE_SIZE: usize = NODE_HEADER_SIZE + 2 * KEYS_REGION + CHILDREN_REGION;

/// Parent id of the root node
pub const NO_PARENT: u64 = 0;

/// One tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Block this node lives in
    pub block_id: u64,
    /// Parent block, `NO_PARENT` for the root
    pub parent_id: u64,
    /// Ascending keys
    pub keys: Vec<u64>,
    /// Values parallel to `keys`
    pub values: Vec<u64>,
    /// Child blocks, empty for a leaf, `keys.len() + 1` otherwise
    pub children: Vec<u64>,
}

impl Node {
    /// Create an empty leaf
    pub fn new_leaf(block_id: u64, parent_id: u64) -> Self {
        Node {
            block_id,
            parent_id,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an internal node with one separator and two children
    pub fn new_internal(
        block_id: u64,
        parent_id: u64,
        separator: (u64, u64),
        left: u64,
        right: u64,
    ) -> Self {
        Node {
            block_id,
            parent_id,
            keys: vec![separator.0],
            values: vec![separator.1],
            children: vec![left, right],
        }
    }

    /// Parse a node record
    pub fn from_bytes(data: &[u8]) -> IndexResult<Self> {
        if data.len() < NODE_SIZE {
            let block = if data.len() >= 8 {
                LittleEndian::read_u64(&data[..8])
            } else {
                0
            };
            return Err(IndexError::corrupt(
                block,
                format!("record is {} bytes, need {}", data.len(), NODE_SIZE),
            ));
        }

        let mut cursor = Cursor::new(data);
        let block_id = cursor.read_u64::<LittleEndian>()?;
        let parent_id = cursor.read_u64::<LittleEndian>()?;
        let key_count = cursor.read_u64::<LittleEndian>()?;

        if key_count > MAX_KEYS as u64 {
            return Err(IndexError::corrupt(
                block_id,
                format!("key_count {} exceeds capacity {}", key_count, MAX_KEYS),
            ));
        }
        let key_count = key_count as usize;

        let keys_at = NODE_HEADER_SIZE;
        let values_at = keys_at + KEYS_REGION;
        let children_at = values_at + KEYS_REGION;

        let keys = read_slots(&data[keys_at..values_at], key_count);
        let values = read_slots(&data[values_at..children_at], key_count);

        let children_region = &data[children_at..NODE_SIZE];
        let children = if LittleEndian::read_u64(children_region) == 0 {
            Vec::new()
        } else {
            read_slots(children_region, key_count + 1)
        };

        let node = Node {
            block_id,
            parent_id,
            keys,
            values,
            children,
        };
        node.check_shape()?;
        Ok(node)
    }

    /// Serialize the node (unpadded, `NODE_SIZE` bytes)
    pub fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        self.check_shape()?;

        let mut buf = vec![0u8; NODE_SIZE];
        let mut cursor = Cursor::new(&mut buf[..NODE_HEADER_SIZE]);
        cursor.write_u64::<LittleEndian>(self.block_id)?;
        cursor.write_u64::<LittleEndian>(self.parent_id)?;
        cursor.write_u64::<LittleEndian>(self.keys.len() as u64)?;

        let keys_at = NODE_HEADER_SIZE;
        let values_at = keys_at + KEYS_REGION;
        let children_at = values_at + KEYS_REGION;

        write_slots(&mut buf[keys_at..values_at], &self.keys);
        write_slots(&mut buf[values_at..children_at], &self.values);
        write_slots(&mut buf[children_at..NODE_SIZE], &self.children);

        Ok(buf)
    }

    fn check_shape(&self) -> IndexResult<()> {
        if self.keys.len() > MAX_KEYS {
            return Err(IndexError::corrupt(
                self.block_id,
                format!("key_count {} exceeds capacity {}", self.keys.len(), MAX_KEYS),
            ));
        }
        if self.values.len() != self.keys.len() {
            return Err(IndexError::corrupt(
                self.block_id,
                format!("{} keys but {} values", self.keys.len(), self.values.len()),
            ));
        }
        if !self.children.is_empty() {
            if self.keys.is_empty() || self.children.len() != self.keys.len() + 1 {
                return Err(IndexError::corrupt(
                    self.block_id,
                    format!(
                        "internal node with {} keys has {} children",
                        self.keys.len(),
                        self.children.len()
                    ),
                ));
            }
            if self.children.contains(&0) {
                return Err(IndexError::corrupt(self.block_id, "null child pointer"));
            }
        }
        if self.keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(IndexError::corrupt(
                self.block_id,
                "keys not strictly ascending",
            ));
        }
        Ok(())
    }

    /// Number of stored keys
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Check if the node has more keys than a block can hold
    pub fn is_overfull(&self) -> bool {
        self.keys.len() > MAX_KEYS
    }

    /// Locate a key: `Ok(index)` on a match, `Err(insertion point)` otherwise
    pub fn find(&self, key: u64) -> Result<usize, usize> {
        self.keys.binary_search(&key)
    }

    /// Child subtree that may contain `key` (internal nodes only)
    pub fn child_for(&self, key: u64) -> Option<u64> {
        match self.find(key) {
            Ok(_) => None,
            Err(index) => self.children.get(index).copied(),
        }
    }

    /// Insert or overwrite a pair, returning the previous value on overwrite
    pub fn upsert(&mut self, key: u64, value: u64) -> Option<u64> {
        match self.find(key) {
            Ok(index) => Some(std::mem::replace(&mut self.values[index], value)),
            Err(index) => {
                self.keys.insert(index, key);
                self.values.insert(index, value);
                None
            }
        }
    }

    /// Insert a separator promoted from child `at`, whose right half is `right_child`
    pub fn insert_separator(&mut self, at: usize, separator: (u64, u64), right_child: u64) {
        self.keys.insert(at, separator.0);
        self.values.insert(at, separator.1);
        self.children.insert(at + 1, right_child);
    }

    /// Split an overfull node at the median.
    ///
    /// `self` keeps the lower half; the upper half is returned as a new node
    /// for `right_block_id` together with the promoted median pair.
    pub fn split(&mut self, right_block_id: u64) -> ((u64, u64), Node) {
        let mid = self.keys.len() / 2;

        let right_keys = self.keys.split_off(mid + 1);
        let right_values = self.values.split_off(mid + 1);
        let right_children = if self.is_leaf() {
            Vec::new()
        } else {
            self.children.split_off(mid + 1)
        };

        // The median is now the last entry of the left half
        let median_key = self.keys.pop().unwrap_or_default();
        let median_value = self.values.pop().unwrap_or_default();

        let right = Node {
            block_id: right_block_id,
            parent_id: self.parent_id,
            keys: right_keys,
            values: right_values,
            children: right_children,
        };

        ((median_key, median_value), right)
    }

    /// Iterate `(key, value)` pairs in order
    pub fn entries(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.keys.iter().copied().zip(self.values.iter().copied())
    }
}

fn read_slots(region: &[u8], count: usize) -> Vec<u64> {
    region
        .chunks_exact(8)
        .take(count)
        .map(LittleEndian::read_u64)
        .collect()
}

fn write_slots(region: &mut [u8], slots: &[u64]) {
    for (chunk, slot) in region.chunks_exact_mut(8).zip(slots) {
        LittleEndian::write_u64(chunk, *slot);
    }
}
