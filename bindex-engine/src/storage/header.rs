//! Index file header - block 0
//!
//! Layout (little-endian):
//! - Offset 0x00: format marker (8 bytes, `4337PRJ3`)
//! - Offset 0x08: root_block_id (u64)
//! - Offset 0x10: next_block_id (u64)
//!
//! The rest of block 0 is zero padding.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::error::{IndexError, IndexResult};

/// Marker identifying a bindex file
pub const FORMAT_MARKER: [u8; 8] = *b"4337PRJ3";

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Block of the root node in a freshly created file
pub const INITIAL_ROOT_BLOCK: u64 = 1;

/// File-level metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Block holding the tree root
    pub root_block_id: u64,
    /// One past the highest allocated block
    pub next_block_id: u64,
}

impl Header {
    /// Header of a file containing only an empty root
    pub fn new() -> Self {
        Header {
            root_block_id: INITIAL_ROOT_BLOCK,
            next_block_id: INITIAL_ROOT_BLOCK + 1,
        }
    }

    /// Parse a header from the start of block 0
    pub fn from_bytes(data: &[u8]) -> IndexResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(IndexError::InvalidFormat(format!(
                "header needs {} bytes, found {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let mut marker = [0u8; 8];
        cursor.read_exact(&mut marker)?;
        if marker != FORMAT_MARKER {
            return Err(IndexError::InvalidFormat(format!(
                "bad format marker {:02X?}",
                marker
            )));
        }

        let root_block_id = cursor.read_u64::<LittleEndian>()?;
        let next_block_id = cursor.read_u64::<LittleEndian>()?;

        if root_block_id == 0 || root_block_id >= next_block_id {
            return Err(IndexError::InvalidFormat(format!(
                "root block {} outside allocated range 1..{}",
                root_block_id, next_block_id
            )));
        }

        Ok(Header {
            root_block_id,
            next_block_id,
        })
    }

    /// Serialize the header (unpadded)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&FORMAT_MARKER);
        buf.write_u64::<LittleEndian>(self.root_block_id).unwrap();
        buf.write_u64::<LittleEndian>(self.next_block_id).unwrap();
        buf
    }

    /// Whether a block id is inside the allocated node range
    pub fn is_live(&self, block_id: u64) -> bool {
        block_id >= self.root_block_id && block_id < self.next_block_id
    }

    /// Number of allocated node blocks
    pub fn node_count(&self) -> u64 {
        self.next_block_id - self.root_block_id
    }

    /// Reserve the next block id
    pub fn allocate(&mut self) -> IndexResult<u64> {
        let block_id = self.next_block_id;
        self.next_block_id = block_id
            .checked_add(1)
            .ok_or_else(|| IndexError::corrupt(block_id, "allocation cursor exhausted"))?;
        Ok(block_id)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        for header in [
            Header::new(),
            Header {
                root_block_id: 1,
                next_block_id: 4096,
            },
            Header {
                root_block_id: 3,
                next_block_id: u64::MAX,
            },
        ] {
            let bytes = header.to_bytes();
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn test_layout_is_little_endian() {
        let bytes = Header {
            root_block_id: 1,
            next_block_id: 0x0203,
        }
        .to_bytes();
        assert_eq!(&bytes[0..8], b"4337PRJ3");
        assert_eq!(&bytes[8..16], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &[3, 2, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_bad_marker_rejected() {
        let mut bytes = Header::new().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_short_and_inconsistent_rejected() {
        let bytes = Header::new().to_bytes();
        assert!(Header::from_bytes(&bytes[..16]).is_err());

        let bad = Header {
            root_block_id: 5,
            next_block_id: 5,
        }
        .to_bytes();
        assert!(matches!(
            Header::from_bytes(&bad),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_allocate_advances_cursor() {
        let mut header = Header::new();
        assert_eq!(header.allocate().unwrap(), 2);
        assert_eq!(header.allocate().unwrap(), 3);
        assert_eq!(header.next_block_id, 4);
        assert_eq!(header.node_count(), 3);
        assert!(header.is_live(3));
        assert!(!header.is_live(4));
        assert!(!header.is_live(0));

        let mut full = Header {
            root_block_id: 1,
            next_block_id: u64::MAX,
        };
        assert!(full.allocate().is_err());
        assert_eq!(full.next_block_id, u64::MAX);
    }
}
