//! Column model: the closed set of column kinds and their value contracts.
//!
//! A [`Column`] pairs a [`ColumnDescriptor`] (name, description, kind,
//! size) with a [`ColumnValues`] payload. Columns do no I/O; the storage
//! layer maps each kind to its on-disk representation.
//!
//! ```rust,ignore
//! use tablestore_core::column::{Column, ColumnValues};
//!
//! let ids = Column::long("id")?.with_values(ColumnValues::Long(vec![1, 2, 3]))?;
//! let names = Column::string("name", 64)?
//!     .with_values(ColumnValues::String(vec!["a".into(), "b".into(), "c".into()]))?;
//! ```

mod kind;
mod mask;
mod values;

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::error::{Error, Result};
use crate::version::FormatVersion;

pub use kind::ColumnKind;
pub use mask::{MaskRow, MaskValues};
pub use values::{ColumnValues, Scalar, ScalarRef, ValueShape};

/// Prefix reserved for engine-managed column names and metadata keys.
pub const RESERVED_PREFIX: &str = "__";

/// Returns true if `name` starts with the reserved prefix.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Definition of a column as stored in a table's schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Unique name within the table.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Semantic kind.
    pub kind: ColumnKind,
    /// Maximum string bytes or array length; 0 for unsized kinds.
    pub size: usize,
}

/// A named, typed column with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    descriptor: ColumnDescriptor,
    values: ColumnValues,
}

impl Column {
    /// Creates an empty column after validating its name and size.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidColumn`] for an empty name, or a sized kind with
    ///   `size == 0`.
    /// - [`Error::ReservedName`] for a name starting with `__`.
    pub fn new(name: impl Into<String>, kind: ColumnKind, size: usize) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidColumn(
                "column name must not be empty".to_string(),
            ));
        }
        if is_reserved(&name) {
            return Err(Error::ReservedName(name));
        }
        if kind.is_sized() && size == 0 {
            return Err(Error::InvalidColumn(format!(
                "{} '{}' requires a size > 0",
                kind.type_name(),
                name
            )));
        }
        let size = if kind.is_sized() { size } else { 0 };
        Ok(Self::header(ColumnDescriptor {
            name,
            description: String::new(),
            kind,
            size,
        }))
    }

    /// Creates an empty column from a descriptor without validation.
    ///
    /// Used for headers read back from storage and for descriptors decoded
    /// at a wire boundary; `initialize` validates them again.
    #[must_use]
    pub fn header(descriptor: ColumnDescriptor) -> Self {
        let values = ColumnValues::empty(descriptor.kind.shape());
        Self { descriptor, values }
    }

    /// Long column.
    pub fn long(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::Long, 0)
    }

    /// Double column.
    pub fn double(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::Double, 0)
    }

    /// Bool column.
    pub fn bool(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::Bool, 0)
    }

    /// String column holding at most `size` bytes per value.
    pub fn string(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::new(name, ColumnKind::String, size)
    }

    /// Long array column of exactly `size` elements per row.
    pub fn long_array(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::new(name, ColumnKind::LongArray, size)
    }

    /// Float array column of exactly `size` elements per row.
    pub fn float_array(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::new(name, ColumnKind::FloatArray, size)
    }

    /// Double array column of exactly `size` elements per row.
    pub fn double_array(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::new(name, ColumnKind::DoubleArray, size)
    }

    /// Image reference column.
    pub fn image(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::ImageReference, 0)
    }

    /// ROI reference column.
    pub fn roi(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::RoiReference, 0)
    }

    /// Well reference column.
    pub fn well(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::WellReference, 0)
    }

    /// Plate reference column.
    pub fn plate(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::PlateReference, 0)
    }

    /// Original file reference column.
    pub fn file(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::FileReference, 0)
    }

    /// Dataset reference column.
    pub fn dataset(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::DatasetReference, 0)
    }

    /// Mask column.
    pub fn mask(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ColumnKind::Mask, 0)
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    /// Replaces the values, consuming and returning the column.
    ///
    /// # Errors
    ///
    /// See [`Column::set_values`].
    pub fn with_values(mut self, values: ColumnValues) -> Result<Self> {
        self.set_values(values)?;
        Ok(self)
    }

    /// Replaces the values after type-checking them against the kind and size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueMismatch`] if the payload has the wrong shape, a
    /// string exceeds `size` bytes, an array is not exactly `size` long, or
    /// mask sub-arrays disagree in length. The column is left unchanged.
    pub fn set_values(&mut self, values: ColumnValues) -> Result<()> {
        check_values(&self.descriptor, &values)?;
        self.values = values;
        Ok(())
    }

    /// Binds the column to a table's stored definition.
    ///
    /// String and array widths are fixed when the table is initialized, so a
    /// column built by a caller takes its `size` (and description) from the
    /// stored column of the same name.
    ///
    /// # Errors
    ///
    /// - [`Error::ColumnMismatch`] if no stored column has this name and kind.
    /// - [`Error::ValueMismatch`] if the current values violate the bound size.
    pub fn settable(&mut self, schema: &[ColumnDescriptor]) -> Result<()> {
        let stored = schema
            .iter()
            .find(|d| d.name == self.descriptor.name)
            .ok_or_else(|| {
                Error::ColumnMismatch(format!("no column named '{}'", self.descriptor.name))
            })?;
        if stored.kind != self.descriptor.kind {
            return Err(Error::ColumnMismatch(format!(
                "column '{}' is a {}, not a {}",
                stored.name,
                stored.kind.type_name(),
                self.descriptor.kind.type_name()
            )));
        }
        check_values(stored, &self.values)?;
        self.descriptor.size = stored.size;
        self.descriptor.description.clone_from(&stored.description);
        Ok(())
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Column description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    /// Column kind.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        self.descriptor.kind
    }

    /// Declared size; 0 for unsized kinds.
    #[must_use]
    pub fn size(&self) -> usize {
        self.descriptor.size
    }

    /// Full descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ColumnDescriptor {
        &self.descriptor
    }

    /// Values.
    #[must_use]
    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Takes the values, leaving an empty sequence of the same shape.
    pub fn take_values(&mut self) -> ColumnValues {
        std::mem::replace(
            &mut self.values,
            ColumnValues::empty(self.descriptor.kind.shape()),
        )
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the column holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn from_parts(descriptor: ColumnDescriptor, values: ColumnValues) -> Self {
        Self { descriptor, values }
    }
}

/// Type-checks `values` against a descriptor.
pub(crate) fn check_values(descriptor: &ColumnDescriptor, values: &ColumnValues) -> Result<()> {
    let name = descriptor.name.as_str();
    let expected = descriptor.kind.shape();
    if values.shape() != expected {
        return Err(Error::value_mismatch(
            name,
            format!("expected {expected} values, got {}", values.shape()),
        ));
    }

    let size = descriptor.size;
    match values {
        ColumnValues::String(v) => {
            if let Some((row, s)) = v.iter().enumerate().find(|(_, s)| s.len() > size) {
                return Err(Error::value_mismatch(
                    name,
                    format!(
                        "row {row}: string of {} bytes exceeds size {size}",
                        s.len()
                    ),
                ));
            }
        }
        ColumnValues::LongArray(v) => check_array_lengths(name, size, v.iter().map(Vec::len))?,
        ColumnValues::FloatArray(v) => check_array_lengths(name, size, v.iter().map(Vec::len))?,
        ColumnValues::DoubleArray(v) => check_array_lengths(name, size, v.iter().map(Vec::len))?,
        ColumnValues::Mask(m) => {
            if !m.is_consistent() {
                return Err(Error::value_mismatch(
                    name,
                    format!("mask sub-arrays differ in length: {:?}", m.sub_lengths()),
                ));
            }
        }
        ColumnValues::Long(_) | ColumnValues::Double(_) | ColumnValues::Bool(_) => {}
    }
    Ok(())
}

fn check_array_lengths(
    name: &str,
    size: usize,
    lengths: impl Iterator<Item = usize>,
) -> Result<()> {
    for (row, len) in lengths.enumerate() {
        if len != size {
            return Err(Error::value_mismatch(
                name,
                format!("row {row}: array of length {len}, expected {size}"),
            ));
        }
    }
    Ok(())
}

/// Validates a schema before it is written by `initialize`.
pub(crate) fn validate_schema(
    columns: &[ColumnDescriptor],
    version: FormatVersion,
    limits: &LimitsConfig,
) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::InvalidColumn(
            "a table needs at least one column".to_string(),
        ));
    }

    let mut seen = rustc_hash::FxHashSet::default();
    for (index, column) in columns.iter().enumerate() {
        let name = column.name.as_str();
        if name.is_empty() {
            return Err(Error::InvalidColumn(format!("Column unnamed:{index}")));
        }
        if is_reserved(name) {
            return Err(Error::ReservedName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(Error::InvalidColumn(format!("Duplicate column name: {name}")));
        }

        let kind = column.kind;
        if kind.is_sized() {
            if column.size == 0 {
                return Err(Error::InvalidColumn(format!(
                    "{} '{name}' requires a size > 0",
                    kind.type_name()
                )));
            }
            let (limit, max) = if kind == ColumnKind::String {
                ("limits.max_string_size", limits.max_string_size)
            } else {
                ("limits.max_array_size", limits.max_array_size)
            };
            if column.size > max {
                return Err(Error::LimitExceeded {
                    limit,
                    value: column.size as u64,
                    max: max as u64,
                });
            }
        } else if column.size != 0 {
            return Err(Error::InvalidColumn(format!(
                "{} '{name}' does not take a size",
                kind.type_name()
            )));
        }

        let required = kind.min_format_version();
        if required > version {
            return Err(Error::VersionUnsupported {
                operation: kind.type_name(),
                required: required.as_u32(),
                actual: version.as_u32(),
            });
        }
    }
    Ok(())
}
