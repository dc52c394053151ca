//! Diagnostic dump of the header and every node block
//!
//! Unlike traversal this walks blocks by number, so it also shows nodes the
//! tree no longer reaches. Unreadable blocks are reported and skipped.

use std::io::Write;

use tracing::warn;

use crate::error::IndexResult;
use crate::file_manager::IndexFile;
use crate::storage::block::Backend;
use crate::storage::header::FORMAT_MARKER;
use crate::storage::node::Node;

/// Counters gathered while printing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintSummary {
    /// Node blocks decoded successfully
    pub nodes: u64,
    /// Live blocks that could not be decoded
    pub corrupt: u64,
    /// Pairs held by the decoded nodes
    pub entries: u64,
    /// Node-shaped blocks found past the allocation cursor
    pub stray: u64,
    /// Live-range blocks missing from the end of the file
    pub missing: u64,
}

impl<F: Backend> IndexFile<F> {
    /// Write the header and one line per node block to `out`
    pub fn print<W: Write>(&mut self, out: &mut W) -> IndexResult<PrintSummary> {
        self.ensure_usable()?;

        let header = self.header;
        writeln!(
            out,
            "Header: marker={} root={} next={}",
            String::from_utf8_lossy(&FORMAT_MARKER),
            header.root_block_id,
            header.next_block_id
        )?;

        let mut summary = PrintSummary::default();
        let end = header.next_block_id.min(self.stored_blocks()?);
        for block_id in header.root_block_id..end {
            match self.read_node(block_id) {
                Ok(node) => {
                    summary.nodes += 1;
                    summary.entries += node.key_count() as u64;
                    write_node(out, &node, "")?;
                }
                Err(e) if e.is_node_damage() => {
                    warn!("Block {} unreadable: {}", block_id, e);
                    summary.corrupt += 1;
                    writeln!(out, "Node {}: ERROR {}", block_id, e)?;
                }
                Err(e) => return Err(e),
            }
        }

        // The header claims blocks the file does not have: one line for all
        if end < header.next_block_id {
            let first_missing = end.max(header.root_block_id);
            summary.missing = header.next_block_id - first_missing;
            warn!("{} live blocks missing from the file", summary.missing);
            writeln!(
                out,
                "Blocks {}..{}: ERROR truncated, {} blocks missing from the file",
                first_missing, header.next_block_id, summary.missing
            )?;
            return Ok(summary);
        }

        // Leftovers of an insert that never committed its header
        let mut block_id = header.next_block_id;
        loop {
            match self.read_node_if_present(block_id) {
                Ok(Some(node)) if node.block_id == block_id => {
                    summary.stray += 1;
                    write_node(out, &node, " [beyond allocation cursor]")?;
                }
                Ok(_) => break,
                Err(e) if e.is_node_damage() => break,
                Err(e) => return Err(e),
            }
            block_id += 1;
        }

        Ok(summary)
    }
}

fn write_node<W: Write>(out: &mut W, node: &Node, note: &str) -> IndexResult<()> {
    writeln!(
        out,
        "Node {} (parent {}){}: keys={:?} values={:?} children={:?}",
        node.block_id, node.parent_id, note, node.keys, node.values, node.children
    )?;
    Ok(())
}
