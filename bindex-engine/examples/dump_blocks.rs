//! Debug tool to examine the raw blocks of an index file
//!
//! Decodes every block independently of the tree structure, so it still
//! works on files whose pointers are damaged.

use std::fs::File;
use std::path::Path;

use bindex_engine::storage::{BlockStore, Header, Node, BLOCK_SIZE};
use bindex_engine::IndexError;

fn main() -> Result<(), IndexError> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: dump_blocks <index_file>");
        return Ok(());
    }

    let path = Path::new(&args[1]);
    let mut store = BlockStore::new(File::open(path)?);
    let blocks = store.block_count()?;

    println!("=== {} ===", path.display());
    println!("Blocks: {} of {} bytes", blocks, BLOCK_SIZE);

    let header_block = store.read_block(0)?;
    match Header::from_bytes(&header_block.data) {
        Ok(header) => println!(
            "Header: root={} next={} nodes={}",
            header.root_block_id,
            header.next_block_id,
            header.node_count()
        ),
        Err(e) => println!("Header: unreadable ({})", e),
    }

    for block_id in 1..blocks {
        let block = store.read_block(block_id)?;
        match Node::from_bytes(&block.data) {
            Ok(node) => {
                let kind = if node.is_leaf() { "leaf" } else { "internal" };
                let mark = if node.block_id == block_id { "" } else { " MISPLACED" };
                println!(
                    "Block {}: {} id={}{} parent={} keys={}",
                    block_id,
                    kind,
                    node.block_id,
                    mark,
                    node.parent_id,
                    node.key_count()
                );
                for (i, (k, v)) in node.entries().enumerate().take(20) {
                    println!("  Entry {}: key={} value={}", i, k, v);
                }
                if node.key_count() > 20 {
                    println!("  ... ({} more entries)", node.key_count() - 20);
                }
                if !node.is_leaf() {
                    println!("  Children: {:?}", node.children);
                }
            }
            Err(e) => println!("Block {}: {}", block_id, e),
        }
    }

    Ok(())
}
