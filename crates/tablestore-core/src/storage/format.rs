//! On-disk layout of a table file.
//!
//! ```text
//! [0..128)    superblock slot A
//! [128..256)  superblock slot B
//! [256..)     framed blocks, appended
//! ```
//!
//! Superblock layout (little-endian, zero padded to 128 bytes):
//! - magic: 8 bytes (`TBLSTOR\0`)
//! - version: 4 bytes
//! - generation: 8 bytes
//! - row count: 8 bytes
//! - schema, metadata, directory block refs: 3 x (offset u64 + len u32)
//! - checksum: 4 bytes (CRC32 of the preceding 64 bytes)
//!
//! Generation `g` is always written to slot `g % 2`, so a torn superblock
//! write can only damage the slot that was not current.
//!
//! A block is `[payload len u32][payload crc u32][payload]`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version::FormatVersion;

pub(crate) const MAGIC: &[u8; 8] = b"TBLSTOR\0";
pub(crate) const SLOT_SIZE: u64 = 128;
pub(crate) const DATA_START: u64 = 2 * SLOT_SIZE;

const BLOCK_HEADER: u64 = 8;
const CHECKSUM_AT: usize = 64;

/// Location of a framed block. `len` is the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct BlockRef {
    pub offset: u64,
    pub len: u32,
}

impl BlockRef {
    /// Bytes occupied on disk, header included.
    pub(crate) fn framed_len(self) -> u64 {
        BLOCK_HEADER + u64::from(self.len)
    }

    fn write_to(self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            offset: read_u64(&buf[0..8]),
            len: read_u32(&buf[8..12]),
        }
    }
}

/// Root record naming the current schema, metadata and directory blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Superblock {
    pub version: FormatVersion,
    pub generation: u64,
    pub row_count: u64,
    pub schema: BlockRef,
    pub metadata: BlockRef,
    pub directory: BlockRef,
}

impl Superblock {
    pub(crate) fn slot_offset(&self) -> u64 {
        (self.generation % 2) * SLOT_SIZE
    }

    pub(crate) fn encode(&self) -> [u8; SLOT_SIZE as usize] {
        let mut buf = [0u8; SLOT_SIZE as usize];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.as_u32().to_le_bytes());
        buf[12..20].copy_from_slice(&self.generation.to_le_bytes());
        buf[20..28].copy_from_slice(&self.row_count.to_le_bytes());
        self.schema.write_to(&mut buf[28..40]);
        self.metadata.write_to(&mut buf[40..52]);
        self.directory.write_to(&mut buf[52..64]);
        let checksum = crc32fast::hash(&buf[0..CHECKSUM_AT]);
        buf[CHECKSUM_AT..CHECKSUM_AT + 4].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decodes one slot, returning why it is unusable on failure.
    pub(crate) fn decode(buf: &[u8]) -> std::result::Result<Self, String> {
        if buf.len() < CHECKSUM_AT + 4 {
            return Err("truncated superblock".to_string());
        }
        if &buf[0..8] != MAGIC {
            return Err("bad magic".to_string());
        }
        let stored = read_u32(&buf[CHECKSUM_AT..CHECKSUM_AT + 4]);
        let computed = crc32fast::hash(&buf[0..CHECKSUM_AT]);
        if stored != computed {
            return Err(format!(
                "checksum mismatch: expected {stored:08x}, got {computed:08x}"
            ));
        }
        let tag = read_u32(&buf[8..12]);
        let version =
            FormatVersion::from_u32(tag).ok_or_else(|| format!("unsupported version {tag}"))?;
        Ok(Self {
            version,
            generation: read_u64(&buf[12..20]),
            row_count: read_u64(&buf[20..28]),
            schema: BlockRef::read_from(&buf[28..40]),
            metadata: BlockRef::read_from(&buf[40..52]),
            directory: BlockRef::read_from(&buf[52..64]),
        })
    }
}

/// Reads both slots and picks the valid one with the highest generation.
///
/// Returns `Ok(None)` for a zero-length file, or one whose first commit
/// never reached the superblock (both slots still zero).
pub(crate) fn read_superblock(file: &mut File, path: &Path) -> Result<Option<Superblock>> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut header = [0u8; DATA_START as usize];
    file.seek(SeekFrom::Start(0))?;
    let available = usize::try_from(len.min(DATA_START)).unwrap_or(header.len());
    file.read_exact(&mut header[..available])?;
    if header.iter().all(|&b| b == 0) {
        return Ok(None);
    }

    let slot_a = Superblock::decode(&header[0..SLOT_SIZE as usize]);
    let slot_b = Superblock::decode(&header[SLOT_SIZE as usize..]);
    let chosen = match (slot_a, slot_b) {
        (Ok(a), Ok(b)) => {
            if a.generation >= b.generation {
                a
            } else {
                b
            }
        }
        (Ok(sb), Err(reason)) | (Err(reason), Ok(sb)) => {
            if sb.generation > 1 {
                tracing::warn!(
                    path = %path.display(),
                    generation = sb.generation,
                    reason = %reason,
                    "Superblock slot unusable, using the other slot"
                );
            }
            sb
        }
        (Err(a), Err(b)) => {
            return Err(Error::invalid_format(
                path,
                format!("no valid superblock (slot A: {a}; slot B: {b})"),
            ))
        }
    };

    if chosen.generation == 0 {
        return Err(Error::invalid_format(path, "superblock generation is zero"));
    }
    Ok(Some(chosen))
}

/// Writes `sb` into its slot.
pub(crate) fn write_superblock(file: &mut File, sb: &Superblock) -> Result<()> {
    file.seek(SeekFrom::Start(sb.slot_offset()))?;
    file.write_all(&sb.encode())?;
    Ok(())
}

/// Frames `payload` into `out`, to be written at absolute offset `at`.
pub(crate) fn frame_block(out: &mut Vec<u8>, at: u64, payload: &[u8]) -> Result<BlockRef> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::LimitExceeded {
        limit: "block size",
        value: payload.len() as u64,
        max: u64::from(u32::MAX),
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(BlockRef { offset: at, len })
}

/// Reads and verifies the block at `block`.
pub(crate) fn read_block(file: &mut File, path: &Path, block: BlockRef) -> Result<Vec<u8>> {
    let file_len = file.metadata()?.len();
    let end = block.offset.checked_add(block.framed_len());
    if block.offset < DATA_START || end.is_none_or(|end| end > file_len) {
        return Err(Error::invalid_format(
            path,
            format!(
                "block at {} (len {}) lies outside the file",
                block.offset, block.len
            ),
        ));
    }

    let mut header = [0u8; BLOCK_HEADER as usize];
    file.seek(SeekFrom::Start(block.offset))?;
    file.read_exact(&mut header)?;
    let len = read_u32(&header[0..4]);
    if len != block.len {
        return Err(Error::invalid_format(
            path,
            format!(
                "block at {} has length {len}, expected {}",
                block.offset, block.len
            ),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    file.read_exact(&mut payload)?;
    let stored = read_u32(&header[4..8]);
    if crc32fast::hash(&payload) != stored {
        return Err(Error::invalid_format(
            path,
            format!("block at {} failed its checksum", block.offset),
        ));
    }
    Ok(payload)
}

/// Serializes `value` with bincode and decodes with a format error on failure.
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    path: &Path,
    what: &str,
    bytes: &[u8],
) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| Error::invalid_format(path, format!("corrupt {what} block: {e}")))
}

fn read_u32(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[..4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(bytes)
}
