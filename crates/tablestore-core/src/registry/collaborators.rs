//! Collaborators the registry consumes from its hosting service.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TablesConfig;
use crate::error::{Error, Result};

/// Extension of table files managed by [`DirectoryRepository`].
pub const TABLE_FILE_EXTENSION: &str = "tbl";

/// Reference to a file known to the hosting service's file repository.
///
/// This is a descriptor, never file content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef {
    /// Repository id.
    pub id: i64,
    /// Display name.
    pub name: String,
}

impl FileRef {
    /// Creates a file reference.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File:{} ({})", self.id, self.name)
    }
}

/// Who is calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// User id.
    pub user_id: i64,
    /// Group the call is scoped to.
    pub group_id: i64,
}

/// Per-call context passed through to the collaborators. The engine never
/// looks inside it beyond the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    identity: CallerIdentity,
    session: String,
}

impl SessionContext {
    /// Creates a context for `identity` within the named session.
    #[must_use]
    pub fn new(identity: CallerIdentity, session: impl Into<String>) -> Self {
        Self {
            identity,
            session: session.into(),
        }
    }

    /// Caller identity.
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Opaque session name.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }
}

/// Resolves file references to physical paths.
pub trait FileRepository: Send + Sync {
    /// Absolute path of the bytes behind `file`. The file must exist.
    ///
    /// # Errors
    ///
    /// Implementation-defined; typically [`Error::NotFound`].
    fn path_for(&self, file: &FileRef) -> Result<PathBuf>;

    /// Registers a new, empty file owned by the caller and creates it.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn register_new_file(&self, name: &str, context: &SessionContext) -> Result<FileRef>;
}

/// Decides whether a caller may modify a file.
pub trait Authorizer: Send + Sync {
    /// Returns true if `identity` may write to `file`.
    fn can_write(&self, file: &FileRef, identity: &CallerIdentity) -> bool;
}

/// Grants every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can_write(&self, _file: &FileRef, _identity: &CallerIdentity) -> bool {
        true
    }
}

/// Repository storing file `id` as `<base>/<id>.tbl`.
///
/// New ids continue after the highest id found under `base` when the
/// repository was created.
#[derive(Debug)]
pub struct DirectoryRepository {
    base: PathBuf,
    next_id: AtomicI64,
}

impl DirectoryRepository {
    /// Creates a repository rooted at `base`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or listed.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = std::path::absolute(base.as_ref())?;
        fs::create_dir_all(&base)?;

        let mut highest = 0i64;
        for entry in fs::read_dir(&base)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_FILE_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i64>().ok())
            {
                highest = highest.max(id);
            }
        }

        Ok(Self {
            base,
            next_id: AtomicI64::new(highest + 1),
        })
    }

    /// Creates a repository rooted at `config.storage.data_dir`.
    ///
    /// # Errors
    ///
    /// As for [`DirectoryRepository::new`].
    pub fn from_config(config: &TablesConfig) -> Result<Self> {
        Self::new(&config.storage.data_dir)
    }

    /// Directory the files live in.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn file_path(&self, id: i64) -> PathBuf {
        self.base.join(format!("{id}.{TABLE_FILE_EXTENSION}"))
    }
}

impl FileRepository for DirectoryRepository {
    fn path_for(&self, file: &FileRef) -> Result<PathBuf> {
        if file.id <= 0 {
            return Err(Error::NotFound(PathBuf::from(file.to_string())));
        }
        let path = self.file_path(file.id);
        if !path.is_file() {
            return Err(Error::NotFound(path));
        }
        Ok(path)
    }

    fn register_new_file(&self, name: &str, context: &SessionContext) -> Result<FileRef> {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let path = self.file_path(id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(
                        id,
                        name,
                        user = context.identity().user_id,
                        "Registered new table file"
                    );
                    return Ok(FileRef::new(id, name));
                }
                // Created behind our back since the directory scan.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
