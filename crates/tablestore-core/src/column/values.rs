//! Typed value sequences held by columns.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::mask::MaskValues;

/// Physical representation shared by one or more column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    /// `Vec<i64>`
    Long,
    /// `Vec<f64>`
    Double,
    /// `Vec<bool>`
    Bool,
    /// `Vec<String>`
    String,
    /// `Vec<Vec<i64>>`
    LongArray,
    /// `Vec<Vec<f32>>`
    FloatArray,
    /// `Vec<Vec<f64>>`
    DoubleArray,
    /// [`MaskValues`]
    Mask,
}

impl ValueShape {
    /// Human-readable shape name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::LongArray => "long[]",
            Self::FloatArray => "float[]",
            Self::DoubleArray => "double[]",
            Self::Mask => "mask",
        }
    }

    /// Whether one value of this shape is a single scalar.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Long | Self::Double | Self::Bool | Self::String)
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single scalar value, used for condition literals and bound variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Integer.
    Long(i64),
    /// Float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// String.
    String(String),
}

impl Scalar {
    /// Name of the scalar's type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Borrowed scalar read out of a column without copying strings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarRef<'a> {
    /// Integer.
    Long(i64),
    /// Float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// String slice.
    Str(&'a str),
}

impl<'a> From<&'a Scalar> for ScalarRef<'a> {
    fn from(s: &'a Scalar) -> Self {
        match s {
            Scalar::Long(v) => Self::Long(*v),
            Scalar::Double(v) => Self::Double(*v),
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::String(v) => Self::Str(v),
        }
    }
}

/// The values of one column, one entry per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    /// Long and reference columns.
    Long(Vec<i64>),
    /// Double columns.
    Double(Vec<f64>),
    /// Bool columns.
    Bool(Vec<bool>),
    /// String columns.
    String(Vec<String>),
    /// Long array columns.
    LongArray(Vec<Vec<i64>>),
    /// Float array columns.
    FloatArray(Vec<Vec<f32>>),
    /// Double array columns.
    DoubleArray(Vec<Vec<f64>>),
    /// Mask columns.
    Mask(MaskValues),
}

impl ColumnValues {
    /// Creates an empty sequence of the given shape.
    #[must_use]
    pub fn empty(shape: ValueShape) -> Self {
        match shape {
            ValueShape::Long => Self::Long(Vec::new()),
            ValueShape::Double => Self::Double(Vec::new()),
            ValueShape::Bool => Self::Bool(Vec::new()),
            ValueShape::String => Self::String(Vec::new()),
            ValueShape::LongArray => Self::LongArray(Vec::new()),
            ValueShape::FloatArray => Self::FloatArray(Vec::new()),
            ValueShape::DoubleArray => Self::DoubleArray(Vec::new()),
            ValueShape::Mask => Self::Mask(MaskValues::default()),
        }
    }

    /// Shape of the payload.
    #[must_use]
    pub const fn shape(&self) -> ValueShape {
        match self {
            Self::Long(_) => ValueShape::Long,
            Self::Double(_) => ValueShape::Double,
            Self::Bool(_) => ValueShape::Bool,
            Self::String(_) => ValueShape::String,
            Self::LongArray(_) => ValueShape::LongArray,
            Self::FloatArray(_) => ValueShape::FloatArray,
            Self::DoubleArray(_) => ValueShape::DoubleArray,
            Self::Mask(_) => ValueShape::Mask,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Long(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
            Self::LongArray(v) => v.len(),
            Self::FloatArray(v) => v.len(),
            Self::DoubleArray(v) => v.len(),
            Self::Mask(v) => v.len(),
        }
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads row `row` as a scalar. `None` for array and mask shapes or an
    /// out-of-range row.
    #[must_use]
    pub fn scalar_at(&self, row: usize) -> Option<ScalarRef<'_>> {
        match self {
            Self::Long(v) => v.get(row).map(|x| ScalarRef::Long(*x)),
            Self::Double(v) => v.get(row).map(|x| ScalarRef::Double(*x)),
            Self::Bool(v) => v.get(row).map(|x| ScalarRef::Bool(*x)),
            Self::String(v) => v.get(row).map(|x| ScalarRef::Str(x)),
            _ => None,
        }
    }

    /// Appends every row of `other`. Returns false, leaving `self`
    /// untouched, when the shapes differ.
    pub(crate) fn extend_from(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => a.extend_from_slice(b),
            (Self::Double(a), Self::Double(b)) => a.extend_from_slice(b),
            (Self::Bool(a), Self::Bool(b)) => a.extend_from_slice(b),
            (Self::String(a), Self::String(b)) => a.extend_from_slice(b),
            (Self::LongArray(a), Self::LongArray(b)) => a.extend_from_slice(b),
            (Self::FloatArray(a), Self::FloatArray(b)) => a.extend_from_slice(b),
            (Self::DoubleArray(a), Self::DoubleArray(b)) => a.extend_from_slice(b),
            (Self::Mask(a), Self::Mask(b)) => a.extend_from(b),
            _ => return false,
        }
        true
    }

    /// Overwrites row `row` with row `src_row` of `src`. Returns false when
    /// the shapes differ.
    ///
    /// Both indices must be in range.
    pub(crate) fn set_row(&mut self, row: usize, src: &Self, src_row: usize) -> bool {
        match (self, src) {
            (Self::Long(a), Self::Long(b)) => a[row] = b[src_row],
            (Self::Double(a), Self::Double(b)) => a[row] = b[src_row],
            (Self::Bool(a), Self::Bool(b)) => a[row] = b[src_row],
            (Self::String(a), Self::String(b)) => a[row].clone_from(&b[src_row]),
            (Self::LongArray(a), Self::LongArray(b)) => a[row].clone_from(&b[src_row]),
            (Self::FloatArray(a), Self::FloatArray(b)) => a[row].clone_from(&b[src_row]),
            (Self::DoubleArray(a), Self::DoubleArray(b)) => a[row].clone_from(&b[src_row]),
            (Self::Mask(a), Self::Mask(b)) => a.set_row(row, b, src_row),
            _ => return false,
        }
        true
    }

    /// Copies out the given rows, in order. Indices must be in range.
    #[must_use]
    pub(crate) fn gather(&self, rows: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().map(|&r| v[r].clone()).collect()
        }
        match self {
            Self::Long(v) => Self::Long(pick(v, rows)),
            Self::Double(v) => Self::Double(pick(v, rows)),
            Self::Bool(v) => Self::Bool(pick(v, rows)),
            Self::String(v) => Self::String(pick(v, rows)),
            Self::LongArray(v) => Self::LongArray(pick(v, rows)),
            Self::FloatArray(v) => Self::FloatArray(pick(v, rows)),
            Self::DoubleArray(v) => Self::DoubleArray(pick(v, rows)),
            Self::Mask(v) => Self::Mask(v.gather(rows)),
        }
    }

    /// Copies out the half-open row range `start..stop`. Bounds must be valid.
    #[must_use]
    pub(crate) fn range(&self, start: usize, stop: usize) -> Self {
        match self {
            Self::Long(v) => Self::Long(v[start..stop].to_vec()),
            Self::Double(v) => Self::Double(v[start..stop].to_vec()),
            Self::Bool(v) => Self::Bool(v[start..stop].to_vec()),
            Self::String(v) => Self::String(v[start..stop].to_vec()),
            Self::LongArray(v) => Self::LongArray(v[start..stop].to_vec()),
            Self::FloatArray(v) => Self::FloatArray(v[start..stop].to_vec()),
            Self::DoubleArray(v) => Self::DoubleArray(v[start..stop].to_vec()),
            Self::Mask(v) => Self::Mask(v.range(start, stop)),
        }
    }
}
