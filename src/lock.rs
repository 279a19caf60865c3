/// Cross-process locking for the file-backed session store
use crate::error::Result;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Manager for store locks
///
/// Uses file-based locks so that two harness processes sharing one data
/// directory never interleave a read-modify-write of the session file.
#[derive(Debug, Clone)]
pub struct StoreLockManager {
    lock_dir: PathBuf,
}

impl StoreLockManager {
    /// Create a new lock manager rooted at `lock_dir`
    pub fn new(lock_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&lock_dir)?;
        Ok(Self { lock_dir })
    }

    /// Acquire an exclusive lock for a store name
    ///
    /// Blocks until the lock is acquired. The lock is released when the
    /// returned `StoreLock` is dropped.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use codeflow::lock::StoreLockManager;
    /// use std::env;
    ///
    /// let manager = StoreLockManager::new(env::temp_dir().join("codeflow-locks")).unwrap();
    /// let lock = manager.acquire_lock("session").unwrap();
    /// // Read and rewrite the store here
    /// drop(lock);
    /// ```
    pub fn acquire_lock(&self, name: &str) -> Result<StoreLock> {
        let lock_path = self.lock_path(name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        file.lock_exclusive()?;

        Ok(StoreLock {
            file: Some(file),
            path: lock_path,
        })
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        let safe_name = name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.lock_dir.join(format!("{}.lock", safe_name))
    }
}

/// RAII guard for a store lock
///
/// The lock file itself is left in place; only the lock is released on drop.
pub struct StoreLock {
    file: Option<File>,
    path: PathBuf,
}

impl StoreLock {
    /// Get the path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}
