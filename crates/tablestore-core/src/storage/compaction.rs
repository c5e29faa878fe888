//! In-place compaction of a table file.
//!
//! Updates and metadata writes leave superseded blocks behind. Compaction
//! rewrites the live data as one schema block, one metadata block and a
//! single chunk, in two commits:
//!
//! 1. the compacted image is appended after the current end of the file
//!    and published;
//! 2. the same image is written again at the start of the data region,
//!    now dead, published, and the file is truncated behind it.
//!
//! A crash at any point leaves at least one valid superblock naming an
//! intact image.

use tracing::info;

use super::chunks::{ChunkEntry, Directory};
use super::format::{self, BlockRef, Superblock, DATA_START};
use super::Storage;
use crate::error::Result;

/// Outcome of [`Storage::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// File size before compaction.
    pub bytes_before: u64,
    /// File size after compaction.
    pub bytes_after: u64,
}

impl CompactionStats {
    /// Bytes returned to the file system.
    #[must_use]
    pub fn reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Serialized live contents, ready to be framed at any offset.
struct Image {
    schema: Vec<u8>,
    metadata: Vec<u8>,
    segments: Vec<Vec<u8>>,
    rows: u64,
}

struct Laid {
    bytes: Vec<u8>,
    schema: BlockRef,
    metadata: BlockRef,
    directory: BlockRef,
    layout: Directory,
}

impl Image {
    fn lay_out(&self, base: u64) -> Result<Laid> {
        let mut bytes = Vec::new();
        let frame = |bytes: &mut Vec<u8>, payload: &[u8]| {
            let at = base + bytes.len() as u64;
            format::frame_block(bytes, at, payload)
        };
        let schema = frame(&mut bytes, &self.schema)?;
        let metadata = frame(&mut bytes, &self.metadata)?;
        let segments = self
            .segments
            .iter()
            .map(|segment| frame(&mut bytes, segment))
            .collect::<Result<Vec<_>>>()?;
        let layout = Directory {
            chunks: if self.rows == 0 {
                Vec::new()
            } else {
                vec![ChunkEntry {
                    first_row: 0,
                    rows: self.rows,
                    segments,
                }]
            },
        };
        let directory = frame(&mut bytes, &format::encode(&layout)?)?;
        Ok(Laid {
            bytes,
            schema,
            metadata,
            directory,
            layout,
        })
    }
}

impl Storage {
    /// Rewrites the file keeping only live data, merging all chunks into
    /// one. Content, row count and metadata are unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`](crate::Error::Closed),
    /// [`Error::NotInitialized`](crate::Error::NotInitialized) or I/O
    /// failures. After an I/O failure the file still holds a valid table.
    pub fn compact(&mut self) -> Result<CompactionStats> {
        let bytes_before = self.file_mut()?.metadata()?.len();
        let table = self.ready()?;
        let live_segments = table.directory.live_bytes();
        let image = Image {
            schema: format::encode(&table.schema)?,
            metadata: format::encode(&table.metadata)?,
            segments: if table.row_count() == 0 {
                Vec::new()
            } else {
                table
                    .columns
                    .iter()
                    .map(format::encode)
                    .collect::<Result<Vec<_>>>()?
            },
            rows: table.row_count(),
        };
        let mut current = table.superblock;

        // Phase 1: publish a copy at the tail.
        let tail = self.end.max(DATA_START);
        let laid = image.lay_out(tail)?;
        self.write_at(tail, &laid.bytes)?;
        current = self.publish(current, &laid)?;
        self.end = tail + laid.bytes.len() as u64;

        // Phase 2: move it to the front if it fits in the dead region.
        let front = image.lay_out(DATA_START)?;
        if DATA_START + front.bytes.len() as u64 <= tail {
            self.write_at(DATA_START, &front.bytes)?;
            self.publish(current, &front)?;
            let new_len = DATA_START + front.bytes.len() as u64;
            let sync = self.options.sync_on_commit;
            let file = self.file_mut()?;
            file.set_len(new_len)?;
            if sync {
                file.sync_all()?;
            }
            self.end = new_len;
        }

        let bytes_after = self.file_mut()?.metadata()?.len();
        info!(
            path = %self.path.display(),
            bytes_before,
            bytes_after,
            live_segments,
            "Compacted table"
        );
        Ok(CompactionStats {
            bytes_before,
            bytes_after,
        })
    }

    fn publish(&mut self, current: Superblock, laid: &Laid) -> Result<Superblock> {
        let superblock = Superblock {
            generation: current.generation + 1,
            schema: laid.schema,
            metadata: laid.metadata,
            directory: laid.directory,
            ..current
        };
        self.commit(&superblock)?;
        let table = self.ready_mut()?;
        table.superblock = superblock;
        table.directory = laid.layout.clone();
        Ok(superblock)
    }
}
