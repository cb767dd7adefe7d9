//! On-disk cache layout and the cache-wide lock.
//!
//! ```text
//! <cacheRoot>/
//! ├── .meta/
//! │   ├── lock            # present only while a mutating operation runs
//! │   └── script-index    # name|relative_path|repo lines
//! ├── tools/              # one working copy per registered repository
//! │   ├── .git/
//! │   └── .meta           # repository metadata record
//! └── ...
//! ```
//!
//! Everything that mutates the cache (cloning, syncing, metadata writes,
//! index writes) runs while holding the lock from [`CacheStore::acquire_lock`].
//! Reads never take the lock.

pub mod lock;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::ConfigSet;
use crate::constants::{LOCK_FILE_NAME, META_NAME, SCRIPT_INDEX_FILE_NAME, TRASH_PREFIX};
use crate::core::CachetError;
use crate::utils::fs::is_writable_dir;

pub use lock::{LockHandle, LockOwner};

/// Handle to a cache root directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl CacheStore {
    /// Creates a store rooted at `root` with the default lock timeout.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: crate::constants::DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Creates a store from resolved configuration.
    #[must_use]
    pub fn from_config(config: &ConfigSet) -> Self {
        Self {
            root: config.cache_dir.clone(),
            lock_timeout: config.lock_timeout,
        }
    }

    /// Overrides the lock wait budget.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock wait budget.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// `<root>/.meta`
    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_NAME)
    }

    /// `<root>/.meta/lock`
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.meta_dir().join(LOCK_FILE_NAME)
    }

    /// `<root>/.meta/script-index`
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.meta_dir().join(SCRIPT_INDEX_FILE_NAME)
    }

    /// Working copy directory for repository `name`.
    #[must_use]
    pub fn repo_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Metadata record path for repository `name`.
    #[must_use]
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.repo_dir(name).join(META_NAME)
    }

    /// Unique holding location for a repository being deleted.
    #[must_use]
    pub fn trash_path(&self, name: &str) -> PathBuf {
        self.meta_dir().join(format!("{TRASH_PREFIX}{name}-{}", uuid::Uuid::new_v4()))
    }

    /// Ensures the cache root and its `.meta` directory exist and are writable.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// [`CachetError::PermissionDenied`] when the root cannot be created or
    /// written, [`CachetError::Io`] for other filesystem failures.
    pub async fn init(&self) -> Result<()> {
        let meta = self.meta_dir();
        tokio::fs::create_dir_all(&meta)
            .await
            .map_err(|e| CachetError::from_io("create cache directory", &meta, &e))?;

        let root = self.root.clone();
        let writable = tokio::task::spawn_blocking(move || is_writable_dir(&root)).await?;
        if !writable {
            return Err(CachetError::PermissionDenied {
                operation: "write to cache directory".to_string(),
                path: self.root.display().to_string(),
            }
            .into());
        }

        debug!(target: "cache", "Cache initialized at {}", self.root.display());
        Ok(())
    }

    /// Acquires the cache-wide lock, waiting up to the configured timeout.
    ///
    /// The lock is released when the returned handle is dropped or released.
    ///
    /// # Errors
    ///
    /// [`CachetError::LockTimeout`] if another live process keeps the lock.
    pub async fn acquire_lock(&self) -> Result<LockHandle> {
        self.acquire_lock_with_timeout(self.lock_timeout).await
    }

    /// Acquires the lock with an explicit timeout.
    pub async fn acquire_lock_with_timeout(&self, timeout: Duration) -> Result<LockHandle> {
        let meta = self.meta_dir();
        if !meta.exists() {
            tokio::fs::create_dir_all(&meta)
                .await
                .map_err(|e| CachetError::from_io("create cache directory", &meta, &e))?;
        }
        lock::acquire(&self.lock_path(), timeout).await
    }

    /// Releases a held lock. Never fails.
    pub fn release(&self, handle: LockHandle) {
        handle.release();
    }

    /// Names of directories directly under the root, excluding `.meta`.
    ///
    /// Missing root yields an empty list.
    pub async fn child_dirs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(CachetError::from_io("read cache directory", &self.root, &e).into()),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CachetError::from_io("read cache directory", &self.root, &e))?
        {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == META_NAME {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Removes leftover trash directories from interrupted removals.
    pub async fn purge_trash(&self) {
        let meta = self.meta_dir();
        let Ok(mut entries) = tokio::fs::read_dir(&meta).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(TRASH_PREFIX) {
                let path = entry.path();
                debug!(target: "cache", "Purging leftover {}", path.display());
                let _ = tokio::task::spawn_blocking(move || {
                    crate::utils::fs::remove_dir_all_if_exists(&path)
                })
                .await;
            }
        }
    }
}
