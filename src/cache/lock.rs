//! Process-safe mutual exclusion over the cache root.
//!
//! The lock is a plain file, `<cacheRoot>/.meta/lock`, created with
//! `O_CREAT | O_EXCL` semantics so that exactly one process can create it. Its
//! content records who owns it:
//!
//! ```text
//! pid=41235
//! acquired_at=2026-10-15T09:12:44.120Z
//! token=3f1c0d0e-8d4f-4c52-9a59-2d4b0e8e0f11
//! ```
//!
//! # Stale locks
//!
//! A waiter that finds the lock held checks whether the recorded `pid` is
//! still running. If not, the lock is stale and is reclaimed immediately.
//! Takeovers are serialized by a second file, `<cacheRoot>/.meta/lock.takeover`,
//! also created exclusively. Its holder re-reads the lock and deletes it only
//! if it still holds the contents that were judged stale, so a fresh lock
//! installed by a faster waiter is never removed. A guard left behind by a
//! crashed waiter expires after [`LOCK_TAKEOVER_GRACE`].
//!
//! A lock file whose content cannot be read yet (its creator is between
//! create and write) counts as held, unless it is older than
//! [`LOCK_UNREADABLE_GRACE`].
//!
//! # Release
//!
//! A [`LockHandle`] deletes the lock file when released or dropped, but only
//! while the file still carries the handle's own `token`. Releasing never
//! fails, so it is safe on every cleanup path.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::parser::{self, Dialect};
use crate::constants::{LOCK_RETRY_INTERVAL, LOCK_TAKEOVER_GRACE, LOCK_UNREADABLE_GRACE};
use crate::core::CachetError;
use crate::utils::platform::process_alive;

/// Owner information recorded in a lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    /// Process id of the owner
    pub pid: u32,
    /// When the lock was acquired
    pub acquired_at: Option<DateTime<Utc>>,
    /// Unique token distinguishing acquisitions by the same process
    pub token: Option<String>,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Some(Utc::now()),
            token: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    fn render(&self) -> String {
        let pid = self.pid.to_string();
        let at = self
            .acquired_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        let token = self.token.clone().unwrap_or_default();
        parser::render([("pid", pid.as_str()), ("acquired_at", at.as_str()), ("token", token.as_str())])
    }

    /// Parses lock file content. A bare process id is accepted as well.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        let trimmed = content.trim();
        if let Ok(pid) = trimmed.parse::<u32>() {
            return Some(Self {
                pid,
                acquired_at: None,
                token: None,
            });
        }
        let kv = parser::parse(content, Dialect::Record);
        let pid = kv.get("pid")?.trim().parse().ok()?;
        Some(Self {
            pid,
            acquired_at: kv
                .get("acquired_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                .map(|t| t.with_timezone(&Utc)),
            token: kv.get("token").map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        })
    }
}

/// Held mutual exclusion over the cache root.
///
/// Dropping the handle releases the lock.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    owner: LockOwner,
    released: bool,
}

impl LockHandle {
    /// Process id recorded as owner.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.owner.pid
    }

    /// Acquisition timestamp.
    #[must_use]
    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        self.owner.acquired_at
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock now instead of at drop time.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!(target: "cache::lock", "Lock {} already gone: {}", self.path.display(), e);
                return;
            }
        };
        match LockOwner::parse(&content) {
            Some(current) if current.pid == self.owner.pid && current.token == self.owner.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        debug!(target: "cache::lock", "Failed to remove lock file: {}", e);
                    }
                } else {
                    debug!(target: "cache::lock", "Cache lock released");
                }
            }
            _ => {
                warn!(
                    target: "cache::lock",
                    "Lock {} is now owned by someone else; leaving it in place",
                    self.path.display()
                );
            }
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

enum Observed {
    /// Lock file vanished between the failed create and the read
    Gone,
    /// Owner is alive, or the file is too fresh to judge
    Held,
    /// Owner is dead; carries the content that was judged stale
    Stale(String),
}

async fn observe(path: &Path) -> Observed {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Observed::Gone,
        Err(_) => return Observed::Held,
    };

    match LockOwner::parse(&content) {
        Some(owner) if process_alive(owner.pid) => Observed::Held,
        Some(owner) => {
            debug!(target: "cache::lock", "Lock owner pid {} is no longer running", owner.pid);
            Observed::Stale(content)
        }
        None => {
            if file_age(path).await > LOCK_UNREADABLE_GRACE {
                Observed::Stale(content)
            } else {
                Observed::Held
            }
        }
    }
}

/// Path of the file that serializes stale-lock takeovers.
fn takeover_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".takeover");
    path.with_file_name(name)
}

/// Takes the takeover guard, clearing one abandoned by a crashed waiter.
async fn enter_takeover(guard: &Path) -> bool {
    match tokio::fs::OpenOptions::new().write(true).create_new(true).open(guard).await {
        Ok(_) => return true,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => {
            debug!(target: "cache::lock", "Cannot create takeover guard {}: {}", guard.display(), e);
            return false;
        }
    }
    if file_age(guard).await > LOCK_TAKEOVER_GRACE {
        warn!(target: "cache::lock", "Removing abandoned takeover guard {}", guard.display());
        let _ = tokio::fs::remove_file(guard).await;
    }
    false
}

/// Removes a stale lock only if it still holds `stale_content`.
///
/// Returns `false` when another waiter is mid-takeover and the caller should
/// back off before retrying.
async fn reclaim(path: &Path, stale_content: &str) -> bool {
    let guard = takeover_path(path);
    if !enter_takeover(&guard).await {
        return false;
    }

    // Only the guard holder deletes, and a live lock is never touched: its
    // content differs from what was judged stale.
    match tokio::fs::read_to_string(path).await {
        Ok(current) if current == stale_content => match tokio::fs::remove_file(path).await {
            Ok(()) => warn!(target: "cache::lock", "Reclaimed stale cache lock {}", path.display()),
            Err(e) => debug!(target: "cache::lock", "Failed to remove stale lock: {}", e),
        },
        _ => debug!(target: "cache::lock", "Stale lock already replaced"),
    }

    let _ = tokio::fs::remove_file(&guard).await;
    true
}

async fn file_age(path: &Path) -> Duration {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .unwrap_or_default()
}

async fn try_create(path: &Path, owner: &LockOwner) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(path).await?;
    let written = async {
        file.write_all(owner.render().as_bytes()).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}

/// Acquires the lock at `path`, waiting up to `timeout`.
///
/// # Errors
///
/// - [`CachetError::LockTimeout`] if a live owner keeps the lock past `timeout`
/// - [`CachetError::Io`] / [`CachetError::PermissionDenied`] if the lock file
///   cannot be created for any other reason
pub async fn acquire(path: &Path, timeout: Duration) -> Result<LockHandle> {
    let start = Instant::now();
    let owner = LockOwner::current();
    debug!(target: "cache::lock", "Waiting for cache lock {}", path.display());

    loop {
        match try_create(path, &owner).await {
            Ok(()) => {
                debug!(
                    target: "cache::lock",
                    wait_ms = start.elapsed().as_millis() as u64,
                    "Cache lock acquired"
                );
                return Ok(LockHandle {
                    path: path.to_path_buf(),
                    owner,
                    released: false,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CachetError::from_io("create lock file", path, &e).into()),
        }

        match observe(path).await {
            Observed::Gone => continue,
            Observed::Stale(content) => {
                if reclaim(path, &content).await {
                    continue;
                }
            }
            Observed::Held => {}
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(CachetError::LockTimeout {
                path: path.display().to_string(),
                waited: timeout,
            }
            .into());
        }
        tokio::time::sleep(LOCK_RETRY_INTERVAL.min(remaining)).await;
    }
}

/// Reads the current owner of the lock at `path`, if any.
pub async fn current_owner(path: &Path) -> Option<LockOwner> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    LockOwner::parse(&content)
}
