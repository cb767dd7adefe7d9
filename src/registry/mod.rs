//! Registry of cached repositories.
//!
//! The registry owns the per-repository metadata records and is the only
//! component that writes them. A repository exists when its directory holds a
//! metadata record; a directory missing either the record or its `.git` data
//! is reported by [`RepositoryRegistry::validate`] and never repaired
//! silently.
//!
//! # Locking
//!
//! [`add`](RepositoryRegistry::add) and [`remove`](RepositoryRegistry::remove)
//! take the cache lock for their whole duration. The `*_locked` variants take
//! a [`LockHandle`] instead, so a caller that already holds the lock (for
//! example to refresh the script index in the same critical section) can
//! compose several mutations. Reads never lock.

pub mod metadata;
pub mod naming;

use anyhow::Result;
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, LockHandle};
use crate::constants::SUGGESTION_MAX_DISTANCE;
use crate::core::{CachetError, NotFoundKind};
use crate::git::{GitSync, SyncResult, is_repository};
use crate::utils::{atomic_write, closest_match, remove_dir_all_if_exists};
pub use metadata::RepositoryEntry;

/// Result of [`RepositoryRegistry::add`].
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub entry: RepositoryEntry,
    /// Non-fatal problem worth showing, such as a branch fallback
    pub warning: Option<String>,
}

/// Kind of inconsistency found by [`RepositoryRegistry::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Directory without a metadata record
    OrphanedDirectory,
    /// Metadata record without a git working copy
    MissingVcs,
    /// Metadata record that cannot be parsed
    CorruptMetadata,
    /// Metadata `name` differs from the directory name
    NameMismatch,
}

/// One inconsistency in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Directory name under the cache root
    pub name: String,
    pub kind: IssueKind,
    pub path: PathBuf,
    pub detail: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IssueKind::OrphanedDirectory => "orphaned directory",
            IssueKind::MissingVcs => "missing git data",
            IssueKind::CorruptMetadata => "corrupt metadata",
            IssueKind::NameMismatch => "name mismatch",
        };
        write!(f, "{}: {} ({})", self.name, kind, self.detail)
    }
}

/// Tracks cached repositories and their metadata.
#[derive(Debug, Clone)]
pub struct RepositoryRegistry {
    store: CacheStore,
    git: GitSync,
}

impl RepositoryRegistry {
    #[must_use]
    pub const fn new(store: CacheStore, git: GitSync) -> Self {
        Self {
            store,
            git,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        &self.store
    }

    #[must_use]
    pub const fn git(&self) -> &GitSync {
        &self.git
    }

    /// True iff the repository's directory and metadata record both exist.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        naming::validate_name(name).is_ok() && self.store.metadata_path(name).is_file()
    }

    /// Reads one entry.
    ///
    /// # Errors
    ///
    /// [`CachetError::NotFound`] (with the closest known name as suggestion)
    /// when the repository does not exist, [`CachetError::Validation`] when
    /// its metadata is corrupt.
    pub async fn get(&self, name: &str) -> Result<RepositoryEntry> {
        if naming::validate_name(name).is_err() {
            return Err(self.not_found(name).await.into());
        }
        let path = self.store.metadata_path(name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(self.not_found(name).await.into());
            }
            Err(e) => return Err(CachetError::from_io("read", &path, &e).into()),
        };
        RepositoryEntry::from_record(&text, &path, self.store.repo_dir(name))
    }

    async fn not_found(&self, name: &str) -> CachetError {
        let known = self.names().await.unwrap_or_default();
        CachetError::NotFound {
            kind: NotFoundKind::Repository,
            name: name.to_string(),
            suggestion: closest_match(name, known.iter().map(String::as_str), SUGGESTION_MAX_DISTANCE),
        }
    }

    /// Names of all registered repositories, sorted.
    pub async fn names(&self) -> Result<Vec<String>> {
        Ok(self.list().await?.into_iter().map(|e| e.name).collect())
    }

    /// Snapshot of all readable entries, sorted by name. Does not lock.
    ///
    /// Directories without a readable record are skipped; see
    /// [`validate`](Self::validate) for reporting them.
    pub async fn list(&self) -> Result<Vec<RepositoryEntry>> {
        let mut entries = Vec::new();
        for dir in self.store.child_dirs().await? {
            let path = self.store.metadata_path(&dir);
            let Ok(text) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match RepositoryEntry::from_record(&text, &path, self.store.repo_dir(&dir)) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(target: "registry", "Skipping {}: {}", dir, e),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write_entry(&self, entry: &RepositoryEntry) -> Result<()> {
        let path = self.store.metadata_path(&entry.name);
        let record = entry.to_record();
        tokio::task::spawn_blocking(move || atomic_write(&path, record.as_bytes())).await?
    }

    /// Clones `url` and registers it, holding the cache lock throughout.
    ///
    /// # Errors
    ///
    /// - [`CachetError::Validation`] for a bad URL or name
    /// - [`CachetError::Conflict`] when the name is taken; the existing entry
    ///   is left untouched
    /// - [`CachetError::Git`] when the clone fails
    pub async fn add(&self, url: &str, name: Option<&str>, branch: Option<&str>) -> Result<AddOutcome> {
        let lock = self.store.acquire_lock().await?;
        let outcome = self.add_locked(&lock, url, name, branch).await;
        lock.release();
        outcome
    }

    /// [`add`](Self::add) for a caller that already holds the lock.
    pub async fn add_locked(
        &self,
        _lock: &LockHandle,
        url: &str,
        name: Option<&str>,
        branch: Option<&str>,
    ) -> Result<AddOutcome> {
        let url = naming::normalize_url(url)?;
        let name = match name {
            Some(explicit) => {
                naming::validate_name(explicit)?;
                explicit.to_string()
            }
            None => naming::derive_name(&url),
        };

        let dir = self.store.repo_dir(&name);
        if dir.exists() {
            let existing = match self.get(&name).await {
                Ok(entry) => format!("already registered from {}", entry.url),
                Err(_) => format!("{} already exists in the cache", dir.display()),
            };
            return Err(CachetError::Conflict {
                identifier: name,
                message: existing,
                paths: Vec::new(),
            }
            .into());
        }

        let cloned = self.git.clone(&url, &dir, branch).await?;
        let entry = RepositoryEntry::new(&name, &url, &dir, cloned.branch);
        if let Err(e) = self.write_entry(&entry).await {
            warn!(target: "registry", "Metadata write failed for {}; removing clone", name);
            let rollback = dir.clone();
            let _ = tokio::task::spawn_blocking(move || remove_dir_all_if_exists(&rollback)).await;
            return Err(e);
        }

        info!(target: "registry", "Added repository {} from {}", name, url);
        Ok(AddOutcome {
            entry,
            warning: cloned.warning,
        })
    }

    /// Deletes a repository's working copy and metadata, holding the lock.
    ///
    /// Partially broken repositories (no `.git`, corrupt or missing record)
    /// are removable too.
    ///
    /// # Errors
    ///
    /// [`CachetError::NotFound`] when no directory of that name exists.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let lock = self.store.acquire_lock().await?;
        let outcome = self.remove_locked(&lock, name).await;
        lock.release();
        outcome
    }

    /// [`remove`](Self::remove) for a caller that already holds the lock.
    pub async fn remove_locked(&self, _lock: &LockHandle, name: &str) -> Result<()> {
        if naming::validate_name(name).is_err() {
            return Err(self.not_found(name).await.into());
        }
        let dir = self.store.repo_dir(name);
        if !dir.is_dir() {
            return Err(self.not_found(name).await.into());
        }

        // Move out of the way first so the name disappears in one step.
        let trash = self.store.trash_path(name);
        let doomed = match tokio::fs::rename(&dir, &trash).await {
            Ok(()) => trash,
            Err(e) => {
                debug!(target: "registry", "Rename to trash failed ({}); deleting in place", e);
                dir
            }
        };
        tokio::task::spawn_blocking(move || remove_dir_all_if_exists(&doomed)).await??;

        info!(target: "registry", "Removed repository {}", name);
        Ok(())
    }

    /// Fetches and fast-forwards one repository and stamps `last_synced`.
    ///
    /// The caller must hold the lock. A failed sync leaves the metadata
    /// unchanged.
    pub async fn sync_locked(&self, _lock: &LockHandle, name: &str, force: bool) -> Result<SyncResult> {
        let mut entry = self.get(name).await?;
        let result = self.git.sync(&entry.local_path, force).await?;
        entry.last_synced_at = Some(Utc::now());
        self.write_entry(&entry).await?;
        Ok(result)
    }

    /// Stores the script count found by discovery. The caller must hold the lock.
    pub async fn record_script_count(&self, _lock: &LockHandle, name: &str, count: u32) -> Result<()> {
        let mut entry = self.get(name).await?;
        if entry.script_count == count {
            return Ok(());
        }
        entry.script_count = count;
        self.write_entry(&entry).await
    }

    /// Reports inconsistencies without changing anything.
    pub async fn validate(&self) -> Result<Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        for dir_name in self.store.child_dirs().await? {
            let dir = self.store.repo_dir(&dir_name);
            let meta = self.store.metadata_path(&dir_name);
            let issue = |kind, detail: String| ValidationIssue {
                name: dir_name.clone(),
                kind,
                path: dir.clone(),
                detail,
            };

            if !meta.is_file() {
                issues.push(issue(IssueKind::OrphanedDirectory, "no metadata record".to_string()));
                continue;
            }
            match tokio::fs::read_to_string(&meta).await {
                Ok(text) => match RepositoryEntry::from_record(&text, &meta, &dir) {
                    Ok(entry) if entry.name != dir_name => issues.push(issue(
                        IssueKind::NameMismatch,
                        format!("metadata says '{}'", entry.name),
                    )),
                    Ok(_) => {}
                    Err(e) => issues.push(issue(IssueKind::CorruptMetadata, e.to_string())),
                },
                Err(e) => issues.push(issue(IssueKind::CorruptMetadata, e.to_string())),
            }
            if !is_repository(&dir) {
                issues.push(issue(IssueKind::MissingVcs, "no .git directory".to_string()));
            }
        }
        Ok(issues)
    }
}
