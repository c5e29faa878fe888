//! # `TableStore` Core
//!
//! File-backed columnar table engine.
//!
//! Every table lives in one file holding its schema, a typed metadata map
//! and its rows, stored column by column. Tables are appended to, updated
//! in place and queried with a small condition language.
//!
//! ## Features
//!
//! - **Typed columns**: longs, doubles, bools, strings, fixed-length
//!   arrays, object references and composite image masks
//! - **Crash-safe commits**: every write publishes through a checksummed
//!   superblock; a torn write leaves the previous commit readable
//! - **Exclusive locking**: one open handle per file, contention fails fast
//! - **Condition queries**: `(a > 2) & (b < 1.5)` parsed and type-checked
//!   before any row is read
//! - **Registry**: reference-counted sharing of open tables with
//!   authorization and stale-handle detection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tablestore_core::{Column, ColumnValues, MetadataMap, Storage, Variables};
//!
//! let mut table = Storage::open("./measurements.tbl")?;
//! table.initialize(&[Column::long("a")?, Column::double("b")?], MetadataMap::new())?;
//! table.append(&[
//!     Column::long("a")?.with_values(ColumnValues::Long(vec![1, 2, 3]))?,
//!     Column::double("b")?.with_values(ColumnValues::Double(vec![1.0, 2.0, 3.0]))?,
//! ])?;
//!
//! let rows = table.get_where_list("(a==2)", &Variables::new(), 0, 0, 0)?;
//! let values = table.read_coordinates(&rows)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// =============================================================================
// NUMERIC CAST LINTS
// =============================================================================
// Row indices are u64 on the API and usize in memory. Conversions happen
// after bounds checks against the row count.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
// =============================================================================
// STYLISTIC LINTS
// =============================================================================
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::float_cmp)]

pub mod column;
pub mod condition;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
pub mod version;

pub use column::{
    Column, ColumnDescriptor, ColumnKind, ColumnValues, MaskRow, MaskValues, Scalar, ValueShape,
};
pub use condition::{ConditionError, ConditionErrorKind, Variables};
pub use config::{ConfigError, TablesConfig};
pub use error::{Error, ErrorCategory, Result};
pub use registry::{
    AllowAll, Authorizer, CallerIdentity, DirectoryRepository, FileRef, FileRepository,
    SessionContext, TableHandle, TableRegistry,
};
pub use storage::{
    metadata_from_json, metadata_to_json, CompactionStats, MetaValue, MetadataMap, Storage,
    StorageOptions, StorageState, INITIALIZED_KEY, VERSION_KEY,
};
pub use version::FormatVersion;
