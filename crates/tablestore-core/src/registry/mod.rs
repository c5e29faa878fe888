//! Open-table registry.
//!
//! A [`TableRegistry`] maps each table file to the single live [`Storage`]
//! for its path and counts the [`TableHandle`]s sharing it. The storage is
//! opened by the first `get_table` for a path and cleaned up when its last
//! handle closes.
//!
//! The registry is an ordinary value: construct one per hosting process and
//! pass clones to whoever needs tables. Clones share state.
//!
//! Locking: the registry map is guarded by its own mutex, each storage by
//! another. Code holding both always takes the registry lock first.
//!
//! # Example
//!
//! ```rust,ignore
//! use tablestore_core::registry::{AllowAll, CallerIdentity, DirectoryRepository, SessionContext, TableRegistry};
//! use tablestore_core::{Column, MetadataMap, TablesConfig};
//!
//! let registry = TableRegistry::new(
//!     &TablesConfig::default(),
//!     DirectoryRepository::new("/data/tables")?,
//!     AllowAll,
//! );
//! let ctx = SessionContext::new(CallerIdentity { user_id: 1, group_id: 1 }, "s1");
//! let table = registry.new_table("measurements", &ctx)?;
//! table.initialize(&[Column::long("a")?], MetadataMap::new())?;
//! ```

mod collaborators;
mod handle;


use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::config::TablesConfig;
use crate::error::Result;
use crate::storage::{Storage, StorageOptions};

pub use collaborators::{
    AllowAll, Authorizer, CallerIdentity, DirectoryRepository, FileRef, FileRepository,
    SessionContext, TABLE_FILE_EXTENSION,
};
pub use handle::TableHandle;

/// One open storage and the number of handles sharing it.
struct OpenTable {
    storage: Arc<Mutex<Storage>>,
    refs: usize,
}

pub(crate) struct RegistryInner {
    options: StorageOptions,
    repository: Box<dyn FileRepository>,
    authorizer: Box<dyn Authorizer>,
    open: Mutex<FxHashMap<PathBuf, OpenTable>>,
}

impl RegistryInner {
    pub(crate) fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    /// Drops one reference to `path`, cleaning the storage up when it was
    /// the last.
    pub(crate) fn release(&self, path: &Path) {
        let mut open = self.open.lock();
        let Some(entry) = open.get_mut(path) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            debug!(path = %path.display(), refs = entry.refs, "Released table handle");
            return;
        }
        if let Some(entry) = open.remove(path) {
            entry.storage.lock().cleanup();
            info!(path = %path.display(), "Closed last handle, table released");
        }
    }
}

/// Resolves file references to shared, reference-counted table storage.
#[derive(Clone)]
pub struct TableRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRegistry")
            .field("open", &self.open_paths())
            .finish_non_exhaustive()
    }
}

impl TableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        config: &TablesConfig,
        repository: impl FileRepository + 'static,
        authorizer: impl Authorizer + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                options: StorageOptions::from_config(config),
                repository: Box::new(repository),
                authorizer: Box::new(authorizer),
                open: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Returns a handle on the table stored in `file`, opening its storage
    /// unless another handle already holds it.
    ///
    /// # Errors
    ///
    /// - Whatever [`FileRepository::path_for`] returns.
    /// - [`Error::InvalidFormat`](crate::Error::InvalidFormat) if the file
    ///   is not a table file.
    /// - [`Error::Locked`](crate::Error::Locked) if another process (or
    ///   another registry) holds the file.
    pub fn get_table(&self, file: &FileRef, context: &SessionContext) -> Result<TableHandle> {
        let path = std::path::absolute(self.inner.repository.path_for(file)?)?;

        let mut open = self.inner.open.lock();
        let storage = if let Some(entry) = open.get_mut(&path) {
            entry.refs += 1;
            debug!(path = %path.display(), refs = entry.refs, "Reusing open table");
            Arc::clone(&entry.storage)
        } else {
            let storage = Arc::new(Mutex::new(Storage::open_with_options(
                &path,
                self.inner.options.clone(),
            )?));
            open.insert(
                path.clone(),
                OpenTable {
                    storage: Arc::clone(&storage),
                    refs: 1,
                },
            );
            storage
        };
        let stamp = storage.lock().stamp();
        drop(open);

        Ok(TableHandle::new(
            Arc::clone(&self.inner),
            path,
            file.clone(),
            context.clone(),
            storage,
            stamp,
        ))
    }

    /// Registers a new file named `name` and returns a handle on it. The
    /// table is created empty and still has to be initialized.
    ///
    /// # Errors
    ///
    /// As for [`FileRepository::register_new_file`] and
    /// [`TableRegistry::get_table`].
    pub fn new_table(&self, name: &str, context: &SessionContext) -> Result<TableHandle> {
        let file = self.inner.repository.register_new_file(name, context)?;
        info!(id = file.id, name, "Creating table");
        self.get_table(&file, context)
    }

    /// Paths with a live storage, sorted.
    #[must_use]
    pub fn open_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.open.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of handles sharing the storage for `path`; 0 if not open.
    #[must_use]
    pub fn ref_count(&self, path: &Path) -> usize {
        self.inner.open.lock().get(path).map_or(0, |entry| entry.refs)
    }
}
