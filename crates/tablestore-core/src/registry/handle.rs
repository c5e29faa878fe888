//! Per-caller handle on a shared table.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::collaborators::{FileRef, SessionContext};
use super::RegistryInner;
use crate::column::Column;
use crate::condition::Variables;
use crate::error::{Error, Result};
use crate::storage::{MetaValue, MetadataMap, Storage};
use crate::version::FormatVersion;

/// A caller's view of one open table.
///
/// Handles on the same file share one [`Storage`]. Each handle remembers
/// the modification stamp it last observed: row reads, queries and row
/// writes through a handle that has fallen behind another handle's writes
/// fail with [`Error::OptimisticLock`] until [`TableHandle::refresh`] is
/// called. Headers, row count and metadata are not stamped.
///
/// Closing (explicitly or on drop) releases the handle's reference in the
/// registry.
pub struct TableHandle {
    registry: Arc<RegistryInner>,
    path: PathBuf,
    file: FileRef,
    context: SessionContext,
    storage: Arc<Mutex<Storage>>,
    stamp: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandle")
            .field("path", &self.path)
            .field("file", &self.file)
            .field("stamp", &self.stamp())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl TableHandle {
    pub(crate) fn new(
        registry: Arc<RegistryInner>,
        path: PathBuf,
        file: FileRef,
        context: SessionContext,
        storage: Arc<Mutex<Storage>>,
        stamp: u64,
    ) -> Self {
        Self {
            registry,
            path,
            file,
            context,
            storage,
            stamp: AtomicU64::new(stamp),
            closed: AtomicBool::new(false),
        }
    }

    /// The file reference the table lives in.
    #[must_use]
    pub fn original_file(&self) -> &FileRef {
        &self.file
    }

    /// Absolute path of the table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp this handle last observed.
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    /// Returns true once [`TableHandle::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Adopts the table's current stamp, accepting whatever other handles
    /// wrote in the meantime.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after close.
    pub fn refresh(&self) -> Result<u64> {
        let storage = self.lock()?;
        let stamp = storage.stamp();
        self.stamp.store(stamp, Ordering::Release);
        Ok(stamp)
    }

    // ========================================================================
    // Schema and metadata
    // ========================================================================

    /// See [`Storage::initialize`]. Requires write permission.
    ///
    /// # Errors
    ///
    /// [`Error::SecurityViolation`], [`Error::OptimisticLock`] or the
    /// storage's errors.
    pub fn initialize(&self, columns: &[Column], metadata: MetadataMap) -> Result<()> {
        self.write(|storage| storage.initialize(columns, metadata))
    }

    /// See [`Storage::headers`].
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] or [`Error::NotInitialized`].
    pub fn headers(&self) -> Result<Vec<Column>> {
        self.lock()?.headers()
    }

    /// See [`Storage::row_count`].
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] or [`Error::NotInitialized`].
    pub fn row_count(&self) -> Result<u64> {
        self.lock()?.row_count()
    }

    /// Format version, once initialized.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`].
    pub fn version(&self) -> Result<Option<FormatVersion>> {
        Ok(self.lock()?.version())
    }

    /// See [`Storage::get_meta_map`].
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] or [`Error::NotInitialized`].
    pub fn get_meta_map(&self) -> Result<MetadataMap> {
        self.lock()?.get_meta_map()
    }

    /// See [`Storage::add_meta_map`]. Requires write permission.
    ///
    /// # Errors
    ///
    /// [`Error::SecurityViolation`] or the storage's errors.
    pub fn add_meta_map(&self, map: MetadataMap, replace: bool) -> Result<()> {
        self.authorize()?;
        self.lock()?.add_meta_map(map, replace)
    }

    /// Sets one typed metadata value. Requires write permission.
    ///
    /// # Errors
    ///
    /// [`Error::SecurityViolation`],
    /// [`Error::VersionUnsupported`] on a v1 file, or
    /// [`Error::ReservedMetadataKey`].
    pub fn set_metadata(&self, key: &str, value: impl Into<MetaValue>) -> Result<()> {
        let mut map = MetadataMap::new();
        map.insert(key.to_string(), value.into());
        self.add_meta_map(map, false)
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// See [`Storage::append`]. Requires write permission.
    ///
    /// # Errors
    ///
    /// [`Error::SecurityViolation`], [`Error::OptimisticLock`] or the
    /// storage's errors.
    pub fn add_data(&self, columns: &[Column]) -> Result<()> {
        self.write(|storage| storage.append(columns))
    }

    /// See [`Storage::update`]. Requires write permission.
    ///
    /// # Errors
    ///
    /// [`Error::SecurityViolation`], [`Error::OptimisticLock`] or the
    /// storage's errors.
    pub fn update(&self, row_numbers: &[u64], columns: &[Column]) -> Result<()> {
        self.write(|storage| storage.update(row_numbers, columns))
    }

    /// See [`Storage::read_coordinates`].
    ///
    /// # Errors
    ///
    /// [`Error::OptimisticLock`] or the storage's errors.
    pub fn read_coordinates(&self, row_numbers: &[u64]) -> Result<Vec<Column>> {
        self.stamped(|storage| storage.read_coordinates(row_numbers))
    }

    /// See [`Storage::read`].
    ///
    /// # Errors
    ///
    /// [`Error::OptimisticLock`] or the storage's errors.
    pub fn read(&self, col_numbers: &[usize], start: u64, stop: u64) -> Result<Vec<Column>> {
        self.stamped(|storage| storage.read(col_numbers, start, stop))
    }

    /// See [`Storage::slice`].
    ///
    /// # Errors
    ///
    /// [`Error::OptimisticLock`] or the storage's errors.
    pub fn slice(&self, col_numbers: &[usize], row_numbers: &[u64]) -> Result<Vec<Column>> {
        self.stamped(|storage| storage.slice(col_numbers, row_numbers))
    }

    /// See [`Storage::get_where_list`].
    ///
    /// # Errors
    ///
    /// [`Error::OptimisticLock`] or the storage's errors.
    pub fn get_where_list(
        &self,
        condition: &str,
        variables: &Variables,
        start: u64,
        stop: u64,
        step: u64,
    ) -> Result<Vec<u64>> {
        self.stamped(|storage| storage.get_where_list(condition, variables, start, stop, step))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Releases this handle's reference. The storage is cleaned up when
    /// the last handle on the file closes. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.registry.release(&self.path);
        }
    }

    fn lock(&self) -> Result<parking_lot::MutexGuard<'_, Storage>> {
        if self.is_closed() {
            return Err(Error::Closed(self.path.clone()));
        }
        Ok(self.storage.lock())
    }

    fn authorize(&self) -> Result<()> {
        let identity = self.context.identity();
        if self.registry.authorizer().can_write(&self.file, identity) {
            return Ok(());
        }
        warn!(
            file = self.file.id,
            user = identity.user_id,
            group = identity.group_id,
            "Write refused"
        );
        Err(Error::SecurityViolation(format!(
            "user {} may not write {}",
            identity.user_id, self.file
        )))
    }

    fn check_stamp(&self, storage: &Storage) -> Result<()> {
        let handle = self.stamp();
        let table = storage.stamp();
        if handle < table {
            return Err(Error::OptimisticLock { handle, table });
        }
        Ok(())
    }

    fn stamped<T>(&self, op: impl FnOnce(&Storage) -> Result<T>) -> Result<T> {
        let storage = self.lock()?;
        self.check_stamp(&storage)?;
        op(&storage)
    }

    fn write<T>(&self, op: impl FnOnce(&mut Storage) -> Result<T>) -> Result<T> {
        self.authorize()?;
        let mut storage = self.lock()?;
        self.check_stamp(&storage)?;
        let out = op(&mut storage)?;
        self.stamp.store(storage.stamp(), Ordering::Release);
        Ok(out)
    }
}

impl Drop for TableHandle {
    fn drop(&mut self) {
        self.close();
    }
}
