//! Block I/O over a single index file
//!
//! The file is an array of fixed-size blocks. Block 0 holds the header,
//! every other allocated block holds exactly one tree node.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{IndexError, IndexResult};

/// Size of every block in bytes
pub const BLOCK_SIZE: usize = 512;

/// Block holding the file header
pub const HEADER_BLOCK: u64 = 0;

/// Seekable storage a block store can run on
pub trait Backend: Read + Write + Seek {
    /// Force written data to durable storage
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Backend for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl Backend for Cursor<Vec<u8>> {}

impl Backend for Cursor<&mut Vec<u8>> {}

/// Byte offset of a block within the file
pub fn block_offset(block_id: u64) -> IndexResult<u64> {
    block_id
        .checked_mul(BLOCK_SIZE as u64)
        .ok_or_else(|| IndexError::corrupt(block_id, "block offset overflows the file size"))
}

/// A full block read from or destined for the file
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    /// Block number (0-based)
    pub block_id: u64,
    /// Raw block data, always `BLOCK_SIZE` bytes
    pub data: Vec<u8>,
}

impl Block {
    /// Create a zero-filled block
    pub fn new(block_id: u64) -> Self {
        Block {
            block_id,
            data: vec![0; BLOCK_SIZE],
        }
    }

    /// Build a block from a record, zero-padding it to the block boundary
    pub fn from_record(block_id: u64, record: &[u8]) -> IndexResult<Self> {
        if record.len() > BLOCK_SIZE {
            return Err(IndexError::BlockOverflow {
                block: block_id,
                len: record.len(),
            });
        }
        let mut block = Block::new(block_id);
        block.data[..record.len()].copy_from_slice(record);
        Ok(block)
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("block_id", &self.block_id)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Block I/O operations on a seekable backend
pub struct BlockStore<F> {
    file: F,
}

impl<F: Backend> BlockStore<F> {
    /// Wrap a backend
    pub fn new(file: F) -> Self {
        BlockStore { file }
    }

    /// Read a full block. A short read is reported as `TruncatedBlock`.
    pub fn read_block(&mut self, block_id: u64) -> IndexResult<Block> {
        self.file.seek(SeekFrom::Start(block_offset(block_id)?))?;

        let mut data = vec![0u8; BLOCK_SIZE];
        self.file.read_exact(&mut data).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                IndexError::TruncatedBlock(block_id)
            } else {
                IndexError::Io(e)
            }
        })?;

        Ok(Block { block_id, data })
    }

    /// Write a record at a block, padded to `BLOCK_SIZE`
    pub fn write_block(&mut self, block_id: u64, record: &[u8]) -> IndexResult<()> {
        let block = Block::from_record(block_id, record)?;
        self.write(&block)
    }

    /// Write a full block
    pub fn write(&mut self, block: &Block) -> IndexResult<()> {
        if block.data.len() != BLOCK_SIZE {
            return Err(IndexError::BlockOverflow {
                block: block.block_id,
                len: block.data.len(),
            });
        }
        self.file.seek(SeekFrom::Start(block_offset(block.block_id)?))?;
        self.file.write_all(&block.data)?;
        Ok(())
    }

    /// Number of complete blocks currently in the backend
    pub fn block_count(&mut self) -> IndexResult<u64> {
        let end = self.file.seek(SeekFrom::End(0))?;
        Ok(end / BLOCK_SIZE as u64)
    }

    /// Flush buffered writes
    pub fn flush(&mut self) -> IndexResult<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flush and force the contents to durable storage
    pub fn sync(&mut self) -> IndexResult<()> {
        self.file.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_offset() {
        assert_eq!(block_offset(0).unwrap(), 0);
        assert_eq!(block_offset(1).unwrap(), 512);
        assert_eq!(block_offset(7).unwrap(), 3584);
        assert!(matches!(
            block_offset(1 << 60),
            Err(IndexError::CorruptNode { block, .. }) if block == 1 << 60
        ));
    }

    #[test]
    fn test_huge_block_id_is_error() {
        let mut store = BlockStore::new(Cursor::new(Vec::new()));
        assert!(matches!(
            store.read_block(u64::MAX),
            Err(IndexError::CorruptNode { .. })
        ));
        assert!(matches!(
            store.write_block(1 << 60, &[1u8; 8]),
            Err(IndexError::CorruptNode { .. })
        ));
        assert_eq!(store.block_count().unwrap(), 0);
    }

    #[test]
    fn test_write_pads_and_extends() {
        let mut store = BlockStore::new(Cursor::new(Vec::new()));

        // Writing block 3 of an empty backend extends it to 4 blocks
        store.write_block(3, &[0xAB; 10]).unwrap();
        assert_eq!(store.block_count().unwrap(), 4);

        let block = store.read_block(3).unwrap();
        assert_eq!(&block.data[..10], &[0xAB; 10]);
        assert!(block.data[10..].iter().all(|&b| b == 0));

        // The gap is zero-filled
        let gap = store.read_block(1).unwrap();
        assert!(gap.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_short_read_is_truncated_block() {
        let mut store = BlockStore::new(Cursor::new(vec![0u8; BLOCK_SIZE + 100]));
        assert!(store.read_block(0).is_ok());
        assert!(matches!(
            store.read_block(1),
            Err(IndexError::TruncatedBlock(1))
        ));
        assert!(matches!(
            store.read_block(9),
            Err(IndexError::TruncatedBlock(9))
        ));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut store = BlockStore::new(Cursor::new(Vec::new()));
        let err = store.write_block(1, &[1u8; BLOCK_SIZE + 1]).unwrap_err();
        assert!(matches!(err, IndexError::BlockOverflow { block: 1, len: 513 }));
        assert_eq!(store.block_count().unwrap(), 0);
    }
}
