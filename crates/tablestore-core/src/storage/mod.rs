//! Table storage: one table per file.
//!
//! A [`Storage`] owns an open, exclusively locked table file. It moves
//! through three states: uninitialized (file open, no schema), ready
//! (schema present) and closed (after [`Storage::cleanup`]).
//!
//! Every write appends blocks to the file and then publishes them with a
//! new superblock, so readers of the file only ever see whole commits. All
//! rows are decoded into memory at open; reads and queries never touch the
//! file.
//!
//! # Example
//!
//! ```rust,ignore
//! use tablestore_core::{Column, ColumnValues, Storage, Variables};
//!
//! let mut storage = Storage::open("/data/tables/42.tbl")?;
//! storage.initialize(&[Column::long("a")?, Column::double("b")?], MetadataMap::new())?;
//! storage.append(&[
//!     Column::long("a")?.with_values(ColumnValues::Long(vec![1, 2, 3]))?,
//!     Column::double("b")?.with_values(ColumnValues::Double(vec![1.0, 2.0, 3.0]))?,
//! ])?;
//! assert_eq!(storage.get_where_list("(a==2)", &Variables::new(), 0, 0, 0)?, vec![1]);
//! ```

mod chunks;
mod compaction;
mod format;
mod lock;
mod metadata;

#[cfg(test)]
mod storage_tests;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::column::{check_values, validate_schema, Column, ColumnDescriptor, ColumnValues};
use crate::condition::{self, Variables};
use crate::config::{LimitsConfig, TablesConfig};
use crate::error::{Error, Result};
use crate::version::FormatVersion;

use chunks::{ChunkEntry, Directory};
use format::{BlockRef, Superblock, DATA_START};
use lock::FileLock;

pub use compaction::CompactionStats;
pub use metadata::{
    metadata_from_json, metadata_to_json, MetaValue, MetadataMap, INITIALIZED_KEY, VERSION_KEY,
};

/// Options a [`Storage`] is opened with.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Fsync before and after each superblock write.
    pub sync_on_commit: bool,
    /// Version written by [`Storage::initialize`].
    pub format_version: FormatVersion,
    /// Size limits.
    pub limits: LimitsConfig,
}

impl StorageOptions {
    /// Derives options from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &TablesConfig) -> Self {
        Self {
            sync_on_commit: config.storage.sync_on_commit,
            format_version: config.format_version(),
            limits: config.limits.clone(),
        }
    }
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self::from_config(&TablesConfig::default())
    }
}

/// Lifecycle state of a [`Storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    /// File is open and locked but has no schema yet.
    Uninitialized,
    /// Schema is present; rows can be appended and queried.
    Ready,
    /// [`Storage::cleanup`] has run.
    Closed,
}

/// Decoded contents of an initialized table file.
#[derive(Debug)]
struct Table {
    superblock: Superblock,
    schema: Vec<ColumnDescriptor>,
    metadata: MetadataMap,
    directory: Directory,
    columns: Vec<ColumnValues>,
}

impl Table {
    fn row_count(&self) -> u64 {
        self.superblock.row_count
    }

    fn load(file: &mut File, path: &Path, superblock: Superblock) -> Result<Self> {
        let schema: Vec<ColumnDescriptor> = format::decode(
            path,
            "schema",
            &format::read_block(file, path, superblock.schema)?,
        )?;
        let metadata: MetadataMap = format::decode(
            path,
            "metadata",
            &format::read_block(file, path, superblock.metadata)?,
        )?;
        let directory: Directory = format::decode(
            path,
            "directory",
            &format::read_block(file, path, superblock.directory)?,
        )?;

        directory
            .validate(schema.len())
            .map_err(|reason| Error::invalid_format(path, reason))?;
        if directory.row_count() != superblock.row_count {
            return Err(Error::invalid_format(
                path,
                format!(
                    "directory covers {} rows, superblock says {}",
                    directory.row_count(),
                    superblock.row_count
                ),
            ));
        }

        let mut columns: Vec<ColumnValues> = schema
            .iter()
            .map(|d| ColumnValues::empty(d.kind.shape()))
            .collect();
        for chunk in &directory.chunks {
            for (index, segment) in chunk.segments.iter().enumerate() {
                let values: ColumnValues = format::decode(
                    path,
                    "segment",
                    &format::read_block(file, path, *segment)?,
                )?;
                check_values(&schema[index], &values).map_err(|e| {
                    Error::invalid_format(
                        path,
                        format!("segment at row {}: {e}", chunk.first_row),
                    )
                })?;
                if values.len() as u64 != chunk.rows || !columns[index].extend_from(&values) {
                    return Err(Error::invalid_format(
                        path,
                        format!(
                            "segment for column '{}' at row {} does not match the schema",
                            schema[index].name, chunk.first_row
                        ),
                    ));
                }
            }
        }

        Ok(Self {
            superblock,
            schema,
            metadata,
            directory,
            columns,
        })
    }

    /// Re-checks that every column holds exactly `row_count` values.
    fn check_row_counts(&self) -> Result<()> {
        let rows = self.row_count();
        for (descriptor, values) in self.schema.iter().zip(&self.columns) {
            if values.len() as u64 != rows {
                return Err(Error::Internal(format!(
                    "column '{}' holds {} values, table has {rows} rows",
                    descriptor.name,
                    values.len()
                )));
            }
        }
        Ok(())
    }

    fn row_indices(&self, row_numbers: &[u64]) -> Result<Vec<usize>> {
        let rows = self.row_count();
        row_numbers
            .iter()
            .map(|&row| {
                if row < rows {
                    Ok(row as usize)
                } else {
                    Err(Error::RowOutOfRange { row, rows })
                }
            })
            .collect()
    }

    fn column_indices(&self, col_numbers: &[usize]) -> Result<Vec<usize>> {
        let count = self.schema.len();
        col_numbers
            .iter()
            .map(|&c| {
                if c < count {
                    Ok(c)
                } else {
                    Err(Error::ColumnMismatch(format!(
                        "column number {c} out of range (table has {count} columns)"
                    )))
                }
            })
            .collect()
    }

    /// Maps supplied columns onto schema positions, checking name, kind and
    /// values against the stored definitions.
    fn resolve<'a>(&self, columns: &'a [Column]) -> Result<Vec<(usize, &'a ColumnValues)>> {
        let mut resolved: Vec<(usize, &ColumnValues)> = Vec::with_capacity(columns.len());
        for column in columns {
            let index = self
                .schema
                .iter()
                .position(|d| d.name == column.name())
                .ok_or_else(|| {
                    Error::ColumnMismatch(format!("no column named '{}'", column.name()))
                })?;
            let stored = &self.schema[index];
            if stored.kind != column.kind() {
                return Err(Error::ColumnMismatch(format!(
                    "column '{}' is a {}, not a {}",
                    stored.name,
                    stored.kind.type_name(),
                    column.kind().type_name()
                )));
            }
            if resolved.iter().any(|(i, _)| *i == index) {
                return Err(Error::ColumnMismatch(format!(
                    "column '{}' supplied more than once",
                    stored.name
                )));
            }
            check_values(stored, column.values())?;
            resolved.push((index, column.values()));
        }
        Ok(resolved)
    }

    fn project(&self, index: usize, values: ColumnValues) -> Column {
        Column::from_parts(self.schema[index].clone(), values)
    }
}

/// One table backed by one exclusively locked file.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    options: StorageOptions,
    lock: Option<FileLock>,
    table: Option<Table>,
    end: u64,
    stamp: u64,
}

impl Storage {
    /// Opens (creating if missing) and locks the table file at `path` with
    /// default options.
    ///
    /// # Errors
    ///
    /// See [`Storage::open_with_options`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, StorageOptions::default())
    }

    /// Opens (creating if missing) and locks the table file at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the parent directory does not exist.
    /// - [`Error::Locked`] if another handle holds the file.
    /// - [`Error::InvalidFormat`] if the file is not a table file.
    /// - [`Error::Io`] for other I/O failures.
    pub fn open_with_options(path: impl AsRef<Path>, options: StorageOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(Error::NotFound(parent.to_path_buf()));
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut lock = FileLock::acquire(file, &path)?;
        let file = lock.file();

        let table = match format::read_superblock(file, &path)? {
            Some(superblock) => Some(Table::load(file, &path, superblock)?),
            None => None,
        };
        let end = file.metadata()?.len().max(DATA_START);

        info!(
            path = %path.display(),
            rows = table.as_ref().map_or(0, Table::row_count),
            version = table.as_ref().map(|t| t.superblock.version.as_u32()),
            "Opened table"
        );

        Ok(Self {
            path,
            options,
            lock: Some(lock),
            table,
            end,
            stamp: 0,
        })
    }

    /// Reads the format version of the table file at `path` from its
    /// superblock alone, without locking or loading rows.
    ///
    /// Returns `None` for an uninitialized file.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the file does not exist.
    /// - [`Error::InvalidFormat`] if the file is not a table file.
    pub fn probe_version(path: impl AsRef<Path>) -> Result<Option<FormatVersion>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(format::read_superblock(&mut file, path)?.map(|sb| sb.version))
    }

    /// Path of the table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StorageState {
        match (&self.lock, &self.table) {
            (None, _) => StorageState::Closed,
            (Some(_), None) => StorageState::Uninitialized,
            (Some(_), Some(_)) => StorageState::Ready,
        }
    }

    /// Format version, once initialized.
    #[must_use]
    pub fn version(&self) -> Option<FormatVersion> {
        self.table.as_ref().map(|t| t.superblock.version)
    }

    /// Modification counter, advanced by every successful schema or row
    /// write.
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Options the storage was opened with.
    #[must_use]
    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Writes the schema and initial metadata using the configured format
    /// version.
    ///
    /// # Errors
    ///
    /// See [`Storage::initialize_with_version`].
    pub fn initialize(&mut self, columns: &[Column], metadata: MetadataMap) -> Result<()> {
        let version = self.options.format_version;
        self.initialize_with_version(columns, metadata, version)
    }

    /// Writes the schema and initial metadata with an explicit format
    /// version.
    ///
    /// On v2 the metadata gains `__version` and `__initialized`. A v1 file
    /// carries no metadata at all.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInitialized`] if the file already has a schema.
    /// - [`Error::InvalidColumn`] / [`Error::ReservedName`] for a bad
    ///   column, naming its position or name.
    /// - [`Error::ReservedMetadataKey`] for a `__` metadata key.
    /// - [`Error::VersionUnsupported`] for v2-only kinds, or metadata, on v1.
    pub fn initialize_with_version(
        &mut self,
        columns: &[Column],
        metadata: MetadataMap,
        version: FormatVersion,
    ) -> Result<()> {
        self.ensure_open()?;
        if self.table.is_some() {
            return Err(Error::AlreadyInitialized(self.path.clone()));
        }

        let schema: Vec<ColumnDescriptor> = columns.iter().map(|c| c.descriptor().clone()).collect();
        validate_schema(&schema, version, &self.options.limits)?;
        if let Some(key) = metadata.keys().find(|k| crate::column::is_reserved(k)) {
            return Err(Error::ReservedMetadataKey(key.clone()));
        }
        let metadata = if version.supports_typed_metadata() {
            metadata::apply(&MetadataMap::new(), metadata, true, true, version)?
        } else if metadata.is_empty() {
            MetadataMap::new()
        } else {
            return Err(Error::VersionUnsupported {
                operation: "Tables metadata",
                required: FormatVersion::V2.as_u32(),
                actual: version.as_u32(),
            });
        };

        let directory = Directory::default();
        let refs = self.write_blocks(&[
            format::encode(&schema)?,
            format::encode(&metadata)?,
            format::encode(&directory)?,
        ])?;
        let superblock = Superblock {
            version,
            generation: 1,
            row_count: 0,
            schema: refs[0],
            metadata: refs[1],
            directory: refs[2],
        };
        self.commit(&superblock)?;

        info!(
            path = %self.path.display(),
            columns = schema.len(),
            version = version.as_u32(),
            "Initialized table"
        );
        let columns = schema
            .iter()
            .map(|d| ColumnValues::empty(d.kind.shape()))
            .collect();
        self.table = Some(Table {
            superblock,
            schema,
            metadata,
            directory,
            columns,
        });
        self.stamp += 1;
        Ok(())
    }

    /// Column definitions, in schema order, without values.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] or [`Error::NotInitialized`].
    pub fn headers(&self) -> Result<Vec<Column>> {
        let table = self.ready()?;
        Ok(table.schema.iter().cloned().map(Column::header).collect())
    }

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] or [`Error::NotInitialized`].
    pub fn row_count(&self) -> Result<u64> {
        Ok(self.ready()?.row_count())
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Appends rows. Every schema column must be supplied exactly once,
    /// all with the same number of values; the rows become visible in a
    /// single commit. Appending zero rows is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::ColumnMismatch`] for missing, unknown, repeated or
    ///   differently sized columns.
    /// - [`Error::ValueMismatch`] for values violating a column's kind or size.
    pub fn append(&mut self, columns: &[Column]) -> Result<()> {
        let table = self.ready()?;
        if columns.len() != table.schema.len() {
            return Err(Error::ColumnMismatch(format!(
                "expected {} columns, got {}",
                table.schema.len(),
                columns.len()
            )));
        }
        let mut resolved = table.resolve(columns)?;
        resolved.sort_by_key(|(index, _)| *index);

        let added = resolved.first().map_or(0, |(_, v)| v.len());
        if let Some((index, values)) = resolved.iter().find(|(_, v)| v.len() != added) {
            return Err(Error::ColumnMismatch(format!(
                "column '{}' has {} values, expected {added}",
                table.schema[*index].name,
                values.len()
            )));
        }
        if added == 0 {
            return Ok(());
        }

        let payloads = resolved
            .iter()
            .map(|(_, values)| format::encode(*values))
            .collect::<Result<Vec<_>>>()?;
        let segments = self.write_blocks(&payloads)?;

        let table = self.ready()?;
        let current = table.superblock;
        let first_row = table.row_count();
        let mut directory = table.directory.clone();
        directory.chunks.push(ChunkEntry {
            first_row,
            rows: added as u64,
            segments,
        });
        let directory_block = self.write_blocks(&[format::encode(&directory)?])?[0];
        let superblock = Superblock {
            generation: current.generation + 1,
            row_count: first_row + added as u64,
            directory: directory_block,
            ..current
        };
        self.commit(&superblock)?;

        let table = self.ready_mut()?;
        for (index, values) in resolved {
            if !table.columns[index].extend_from(values) {
                return Err(Error::Internal(format!(
                    "shape changed while appending to column {index}"
                )));
            }
        }
        table.directory = directory;
        table.superblock = superblock;
        table.check_row_counts()?;
        self.stamp += 1;

        debug!(path = %self.path.display(), added, rows = superblock.row_count, "Appended rows");
        Ok(())
    }

    /// Overwrites existing rows. Each supplied column (any subset of the
    /// schema) carries one value per entry of `row_numbers`; value `i` goes
    /// to row `row_numbers[i]`. The row count is unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::RowOutOfRange`] naming the first bad row.
    /// - [`Error::ColumnMismatch`] / [`Error::ValueMismatch`] as for
    ///   [`Storage::append`].
    pub fn update(&mut self, row_numbers: &[u64], columns: &[Column]) -> Result<()> {
        let table = self.ready()?;
        let resolved = table.resolve(columns)?;
        if let Some((index, values)) = resolved
            .iter()
            .find(|(_, v)| v.len() != row_numbers.len())
        {
            return Err(Error::ColumnMismatch(format!(
                "column '{}' has {} values for {} row numbers",
                table.schema[*index].name,
                values.len(),
                row_numbers.len()
            )));
        }
        let rows = table.row_indices(row_numbers)?;
        if rows.is_empty() || resolved.is_empty() {
            return Ok(());
        }

        // Rebuild each touched (chunk, column) segment with the new values.
        let mut touched: BTreeMap<(usize, usize), ColumnValues> = BTreeMap::new();
        for (column, values) in &resolved {
            for (i, &row) in rows.iter().enumerate() {
                let chunk_index = table.directory.chunk_of(row as u64).ok_or_else(|| {
                    Error::Internal(format!("row {row} is not covered by any chunk"))
                })?;
                let chunk = &table.directory.chunks[chunk_index];
                let first = chunk.first_row as usize;
                let segment = touched.entry((chunk_index, *column)).or_insert_with(|| {
                    table.columns[*column].range(first, chunk.end_row() as usize)
                });
                if !segment.set_row(row - first, values, i) {
                    return Err(Error::Internal(format!(
                        "shape changed while updating column {column}"
                    )));
                }
            }
        }

        let payloads = touched
            .values()
            .map(format::encode)
            .collect::<Result<Vec<_>>>()?;
        let refs = self.write_blocks(&payloads)?;

        let table = self.ready()?;
        let current = table.superblock;
        let mut directory = table.directory.clone();
        for (&(chunk, column), block) in touched.keys().zip(refs) {
            directory.chunks[chunk].segments[column] = block;
        }
        let directory_block = self.write_blocks(&[format::encode(&directory)?])?[0];
        let superblock = Superblock {
            generation: current.generation + 1,
            directory: directory_block,
            ..current
        };
        self.commit(&superblock)?;

        let table = self.ready_mut()?;
        for (column, values) in &resolved {
            for (i, &row) in rows.iter().enumerate() {
                if !table.columns[*column].set_row(row, values, i) {
                    return Err(Error::Internal(format!(
                        "shape changed while updating column {column}"
                    )));
                }
            }
        }
        table.directory = directory;
        table.superblock = superblock;
        table.check_row_counts()?;
        self.stamp += 1;

        debug!(
            path = %self.path.display(),
            rows = rows.len(),
            columns = resolved.len(),
            segments = touched.len(),
            "Updated rows"
        );
        Ok(())
    }

    /// Every column at the requested rows, in request order. Duplicates are
    /// allowed.
    ///
    /// # Errors
    ///
    /// [`Error::RowOutOfRange`], or [`Error::LimitExceeded`] past
    /// `limits.max_read_rows`.
    pub fn read_coordinates(&self, row_numbers: &[u64]) -> Result<Vec<Column>> {
        let table = self.ready()?;
        self.check_read_limit(row_numbers.len() as u64)?;
        let rows = table.row_indices(row_numbers)?;
        Ok((0..table.schema.len())
            .map(|c| table.project(c, table.columns[c].gather(&rows)))
            .collect())
    }

    /// The columns `col_numbers` over rows `start..stop`. `stop == 0` means
    /// the end of the table, a larger `stop` is clamped to the row count and
    /// `start > stop` yields no rows.
    ///
    /// # Errors
    ///
    /// [`Error::ColumnMismatch`] for an unknown column number, or
    /// [`Error::LimitExceeded`] past `limits.max_read_rows`.
    pub fn read(&self, col_numbers: &[usize], start: u64, stop: u64) -> Result<Vec<Column>> {
        let table = self.ready()?;
        let columns = table.column_indices(col_numbers)?;
        let rows = table.row_count();
        let stop = if stop == 0 { rows } else { stop.min(rows) };
        let start = start.min(stop);
        self.check_read_limit(stop - start)?;
        Ok(columns
            .into_iter()
            .map(|c| {
                table.project(
                    c,
                    table.columns[c].range(start as usize, stop as usize),
                )
            })
            .collect())
    }

    /// Arbitrary columns at arbitrary rows. Empty `col_numbers` selects all
    /// columns and empty `row_numbers` all rows.
    ///
    /// # Errors
    ///
    /// As for [`Storage::read`] and [`Storage::read_coordinates`].
    pub fn slice(&self, col_numbers: &[usize], row_numbers: &[u64]) -> Result<Vec<Column>> {
        let table = self.ready()?;
        let columns = if col_numbers.is_empty() {
            (0..table.schema.len()).collect()
        } else {
            table.column_indices(col_numbers)?
        };
        if row_numbers.is_empty() {
            self.check_read_limit(table.row_count())?;
            return Ok(columns
                .into_iter()
                .map(|c| table.project(c, table.columns[c].clone()))
                .collect());
        }
        self.check_read_limit(row_numbers.len() as u64)?;
        let rows = table.row_indices(row_numbers)?;
        Ok(columns
            .into_iter()
            .map(|c| table.project(c, table.columns[c].gather(&rows)))
            .collect())
    }

    /// Ascending indices of the rows in `start..stop` (stepping by `step`)
    /// for which `condition` holds. `stop == 0` means the end of the table
    /// and `step == 0` means 1.
    ///
    /// The condition is parsed and type-checked before any row is read.
    ///
    /// # Errors
    ///
    /// [`Error::Condition`] for a bad condition, or [`Error::LimitExceeded`]
    /// if it is longer than `limits.max_condition_length`.
    pub fn get_where_list(
        &self,
        condition: &str,
        variables: &Variables,
        start: u64,
        stop: u64,
        step: u64,
    ) -> Result<Vec<u64>> {
        let table = self.ready()?;
        let max = self.options.limits.max_condition_length;
        if condition.len() > max {
            return Err(Error::LimitExceeded {
                limit: "limits.max_condition_length",
                value: condition.len() as u64,
                max: max as u64,
            });
        }

        let expr = condition::parse(condition)?;
        let compiled = condition::compile(&expr, &table.schema, variables)?;

        let rows = table.row_count();
        let stop = if stop == 0 { rows } else { stop.min(rows) };
        let step = step.max(1);
        let mut matches = Vec::new();
        let mut row = start;
        while row < stop {
            if compiled.matches(&table.columns, row as usize)? {
                matches.push(row);
            }
            row = row.saturating_add(step);
        }

        debug!(
            path = %self.path.display(),
            condition,
            scanned = stop.saturating_sub(start).div_ceil(step),
            matched = matches.len(),
            "Evaluated where list"
        );
        Ok(matches)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// All metadata, reserved keys included.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] or [`Error::NotInitialized`].
    pub fn get_meta_map(&self) -> Result<MetadataMap> {
        Ok(self.ready()?.metadata.clone())
    }

    /// Merges `map` into the metadata. With `replace`, every non-reserved
    /// key is dropped first. The row data is not rewritten.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionUnsupported`] on a v1 file.
    /// - [`Error::ReservedMetadataKey`] for a `__` key.
    ///
    /// On error the metadata is unchanged.
    pub fn add_meta_map(&mut self, map: MetadataMap, replace: bool) -> Result<()> {
        self.add_meta_map_internal(map, replace, false)
    }

    /// Metadata write that may also reset the reserved keys (`init`).
    pub(crate) fn add_meta_map_internal(
        &mut self,
        map: MetadataMap,
        replace: bool,
        init: bool,
    ) -> Result<()> {
        let table = self.ready()?;
        let keys = map.len();
        let next = metadata::apply(&table.metadata, map, replace, init, table.superblock.version)?;

        let current = table.superblock;
        let block = self.write_blocks(&[format::encode(&next)?])?[0];
        let superblock = Superblock {
            generation: current.generation + 1,
            metadata: block,
            ..current
        };
        self.commit(&superblock)?;

        let table = self.ready_mut()?;
        table.metadata = next;
        table.superblock = superblock;
        debug!(path = %self.path.display(), keys, replace, "Updated metadata");
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Releases the file lock and drops all in-memory rows. Idempotent.
    pub fn cleanup(&mut self) {
        if self.lock.take().is_some() {
            self.table = None;
            info!(path = %self.path.display(), "Closed table");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lock.is_some() {
            Ok(())
        } else {
            Err(Error::Closed(self.path.clone()))
        }
    }

    fn ready(&self) -> Result<&Table> {
        self.ensure_open()?;
        self.table
            .as_ref()
            .ok_or_else(|| Error::NotInitialized(self.path.clone()))
    }

    fn ready_mut(&mut self) -> Result<&mut Table> {
        self.ensure_open()?;
        self.table
            .as_mut()
            .ok_or_else(|| Error::NotInitialized(self.path.clone()))
    }

    fn check_read_limit(&self, rows: u64) -> Result<()> {
        let max = self.options.limits.max_read_rows;
        if rows > max {
            return Err(Error::LimitExceeded {
                limit: "limits.max_read_rows",
                value: rows,
                max,
            });
        }
        Ok(())
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.lock
            .as_mut()
            .map(FileLock::file)
            .ok_or_else(|| Error::Closed(self.path.clone()))
    }

    /// Appends framed blocks at the end of the file.
    fn write_blocks(&mut self, payloads: &[Vec<u8>]) -> Result<Vec<BlockRef>> {
        let start = self.end.max(DATA_START);
        let mut buf = Vec::with_capacity(payloads.iter().map(|p| p.len() + 8).sum());
        let mut refs = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let at = start + buf.len() as u64;
            refs.push(format::frame_block(&mut buf, at, payload)?);
        }
        self.write_at(start, &buf)?;
        self.end = start + buf.len() as u64;
        Ok(refs)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Publishes `superblock`: flushes the blocks it references, then
    /// writes it into its slot.
    fn commit(&mut self, superblock: &Superblock) -> Result<()> {
        let sync = self.options.sync_on_commit;
        let file = self.file_mut()?;
        if sync {
            file.sync_data()?;
        }
        format::write_superblock(file, superblock)?;
        if sync {
            file.sync_data()?;
        }
        Ok(())
    }
}
