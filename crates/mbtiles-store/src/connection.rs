//! Owned SQLite connection with operation-scoped exclusive locking.
//!
//! SQLite's own connection mutex is disabled (`SQLITE_OPEN_NO_MUTEX`); the
//! handle serializes every statement through a single lock instead. The lock
//! is held for one operation at a time and never nested, so concurrent
//! readers and writers simply queue behind each other.

use crate::{Result, StoreError};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, no writes.
    ReadOnly,
    /// Existing file, writes allowed.
    ReadWrite,
    /// Create the file if missing, writes allowed.
    Create,
}

impl OpenMode {
    fn flags(self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;
        match self {
            OpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::Create => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        }
    }

    /// Whether statements that modify the database are permitted.
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }
}

/// The single physical connection of a store.
///
/// The connection is closed when the handle is dropped.
pub struct ConnectionHandle {
    /// Connection guarded by the store-wide exclusive lock.
    conn: Mutex<Connection>,
    /// Path the connection was opened on.
    path: PathBuf,
    /// Mode the connection was opened with.
    mode: OpenMode,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

impl ConnectionHandle {
    /// Open the database at `path`.
    ///
    /// Any failure to establish the connection is reported as
    /// [`StoreError::ResourceUnavailable`].
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(&path, mode.flags()).map_err(|e| {
            StoreError::ResourceUnavailable(format!("Database \"{}\": {}", path.display(), e))
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            mode,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::ResourceUnavailable(format!("in-memory database: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
            mode: OpenMode::Create,
        })
    }

    /// Run one operation with exclusive access to the connection.
    ///
    /// The lock is released when `op` returns, on success and error alike.
    pub fn with<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        op(&conn)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the database was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Fail with [`StoreError::ReadOnly`] unless writes are permitted.
    pub fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }
}
