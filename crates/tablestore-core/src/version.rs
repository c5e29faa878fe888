//! On-disk format versions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag stored in every table file's superblock.
///
/// Version 1 is the legacy layout: scalar, string, reference and mask
/// columns only, and a string-valued metadata block. Version 2 adds the
/// fixed-array and dataset-reference columns and typed metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormatVersion {
    /// Legacy format.
    V1,
    /// Extended format with typed metadata.
    V2,
}

impl FormatVersion {
    /// Version written by default.
    pub const CURRENT: Self = Self::V2;

    /// Returns the numeric tag.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    /// Parses a numeric tag.
    #[must_use]
    pub const fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    /// Whether typed metadata (`add_meta_map`, `set_metadata`) is available.
    #[must_use]
    pub const fn supports_typed_metadata(self) -> bool {
        matches!(self, Self::V2)
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}
