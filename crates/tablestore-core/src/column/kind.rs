//! The closed set of column kinds.

use serde::{Deserialize, Serialize};

use super::values::ValueShape;
use crate::version::FormatVersion;

/// Semantic kind of a column.
///
/// Every kind maps to exactly one [`ValueShape`]; the reference kinds share
/// the `Long` shape and differ only in what the ids point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// 64-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// UTF-8 string with a fixed maximum byte length.
    String,
    /// Fixed-length array of i64.
    LongArray,
    /// Fixed-length array of f32.
    FloatArray,
    /// Fixed-length array of f64.
    DoubleArray,
    /// Image id.
    ImageReference,
    /// ROI id.
    RoiReference,
    /// Well id.
    WellReference,
    /// Plate id.
    PlateReference,
    /// Original file id.
    FileReference,
    /// Dataset id.
    DatasetReference,
    /// Image mask: plane, bounding box and packed bitmap per row.
    Mask,
}

impl ColumnKind {
    /// All kinds, in tag order.
    pub const ALL: [Self; 14] = [
        Self::Long,
        Self::Double,
        Self::Bool,
        Self::String,
        Self::LongArray,
        Self::FloatArray,
        Self::DoubleArray,
        Self::ImageReference,
        Self::RoiReference,
        Self::WellReference,
        Self::PlateReference,
        Self::FileReference,
        Self::DatasetReference,
        Self::Mask,
    ];

    /// Stable tag used when a column crosses a wire or file boundary.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Long => "LongColumn",
            Self::Double => "DoubleColumn",
            Self::Bool => "BoolColumn",
            Self::String => "StringColumn",
            Self::LongArray => "LongArrayColumn",
            Self::FloatArray => "FloatArrayColumn",
            Self::DoubleArray => "DoubleArrayColumn",
            Self::ImageReference => "ImageColumn",
            Self::RoiReference => "RoiColumn",
            Self::WellReference => "WellColumn",
            Self::PlateReference => "PlateColumn",
            Self::FileReference => "FileColumn",
            Self::DatasetReference => "DatasetColumn",
            Self::Mask => "MaskColumn",
        }
    }

    /// Inverse of [`ColumnKind::type_name`].
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    /// Physical representation of the kind's values.
    #[must_use]
    pub const fn shape(self) -> ValueShape {
        match self {
            Self::Long
            | Self::ImageReference
            | Self::RoiReference
            | Self::WellReference
            | Self::PlateReference
            | Self::FileReference
            | Self::DatasetReference => ValueShape::Long,
            Self::Double => ValueShape::Double,
            Self::Bool => ValueShape::Bool,
            Self::String => ValueShape::String,
            Self::LongArray => ValueShape::LongArray,
            Self::FloatArray => ValueShape::FloatArray,
            Self::DoubleArray => ValueShape::DoubleArray,
            Self::Mask => ValueShape::Mask,
        }
    }

    /// Whether the kind needs a declared `size`.
    #[must_use]
    pub const fn is_sized(self) -> bool {
        matches!(
            self,
            Self::String | Self::LongArray | Self::FloatArray | Self::DoubleArray
        )
    }

    /// Whether values are ids of other objects.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            Self::ImageReference
                | Self::RoiReference
                | Self::WellReference
                | Self::PlateReference
                | Self::FileReference
                | Self::DatasetReference
        )
    }

    /// Whether the column may appear in a row-selection condition.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        self.shape().is_scalar()
    }

    /// Oldest on-disk version able to store the kind.
    #[must_use]
    pub const fn min_format_version(self) -> FormatVersion {
        match self {
            Self::LongArray | Self::FloatArray | Self::DoubleArray | Self::DatasetReference => {
                FormatVersion::V2
            }
            _ => FormatVersion::V1,
        }
    }
}
