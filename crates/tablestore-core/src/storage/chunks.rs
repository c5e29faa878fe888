//! Row chunk directory.
//!
//! Every append writes one chunk: a contiguous run of rows stored as one
//! segment block per column. The directory lists the chunks in row order.

use serde::{Deserialize, Serialize};

use super::format::BlockRef;

/// One chunk: rows `first_row..first_row + rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChunkEntry {
    pub first_row: u64,
    pub rows: u64,
    /// One segment per schema column, in schema order.
    pub segments: Vec<BlockRef>,
}

impl ChunkEntry {
    pub(crate) fn end_row(&self) -> u64 {
        self.first_row + self.rows
    }
}

/// All chunks of a table, ordered by `first_row`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Directory {
    pub chunks: Vec<ChunkEntry>,
}

impl Directory {
    /// Total number of rows covered.
    pub(crate) fn row_count(&self) -> u64 {
        self.chunks.last().map_or(0, ChunkEntry::end_row)
    }

    /// Index of the chunk holding `row`.
    pub(crate) fn chunk_of(&self, row: u64) -> Option<usize> {
        let index = self.chunks.partition_point(|c| c.end_row() <= row);
        (index < self.chunks.len()).then_some(index)
    }

    /// Checks that chunks are contiguous from row 0, non-empty and carry
    /// one segment per column.
    pub(crate) fn validate(&self, columns: usize) -> Result<(), String> {
        let mut expected = 0u64;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.first_row != expected {
                return Err(format!(
                    "chunk {i} starts at row {}, expected {expected}",
                    chunk.first_row
                ));
            }
            if chunk.rows == 0 {
                return Err(format!("chunk {i} is empty"));
            }
            if chunk.segments.len() != columns {
                return Err(format!(
                    "chunk {i} has {} segments for {columns} columns",
                    chunk.segments.len()
                ));
            }
            expected = chunk.end_row();
        }
        Ok(())
    }

    /// Bytes referenced by all segments, headers included.
    pub(crate) fn live_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .flat_map(|c| c.segments.iter())
            .map(|s| s.framed_len())
            .sum()
    }
}
