//! Git operations on cached working copies.
//!
//! [`GitSync`] is the single place where cachet talks to the external git
//! client. It clones repositories into the cache, fast-forwards them from
//! their upstream, and reports their status. Every subprocess is built with
//! [`GitCommand`](command_builder::GitCommand), which bounds it by the
//! configured timeout.
//!
//! # Retries
//!
//! Network operations (`clone`, `fetch`) are retried up to the configured
//! number of times with a fixed delay between attempts. A missing branch is
//! not a transient failure and is never retried. Local operations (`status`,
//! `stash`, `merge`) run once.
//!
//! # Sync
//!
//! ```text
//! modified paths? ── no force ──> Conflict (nothing touched)
//!        │ force
//!        v
//!   stash push ──> fetch ──> upstream? ──> ahead/behind ──> merge --ff-only
//! ```
//!
//! Stashed changes are left on the stash; they are not re-applied.

pub mod command_builder;
pub mod status;

use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use crate::config::ConfigSet;
use crate::constants::{META_NAME, NETWORK_RETRY_DELAY_MS};
use crate::core::CachetError;
use crate::utils::platform::get_git_command;
use command_builder::GitCommand;
pub use status::{RepoState, RepoStatus};

/// Outcome of a successful clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    /// Branch actually checked out
    pub branch: String,
    /// Set when the requested branch did not exist and the remote's default
    /// branch was used instead
    pub warning: Option<String>,
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// New commits were merged
    pub updated: bool,
    /// Nothing to merge
    pub already_current: bool,
    /// Number of commits merged
    pub commits: u32,
    /// Local modifications were stashed first
    pub stashed: bool,
    /// Upstream reference merged from
    pub upstream: String,
}

/// Checks that the git executable can be found on `PATH`.
///
/// # Errors
///
/// [`CachetError::GitNotFound`] when it cannot.
pub fn ensure_git_available() -> Result<PathBuf> {
    which::which(get_git_command()).map_err(|_| CachetError::GitNotFound.into())
}

/// Whether `path` holds a git working copy.
#[must_use]
pub fn is_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

fn is_missing_branch_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<CachetError>(),
        Some(CachetError::Git { stderr, .. }) if status::is_missing_branch(stderr)
    )
}

fn is_retryable(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<CachetError>(), Some(CachetError::Git { .. }))
        && !is_missing_branch_error(error)
}

fn repo_label(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Clone, sync, and status operations bounded by timeout and retry policy.
#[derive(Debug, Clone)]
pub struct GitSync {
    timeout: Duration,
    retries: u32,
    default_branch: String,
}

impl GitSync {
    #[must_use]
    pub fn new(timeout: Duration, retries: u32, default_branch: impl Into<String>) -> Self {
        Self {
            timeout,
            retries,
            default_branch: default_branch.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ConfigSet) -> Self {
        Self::new(config.git_timeout, config.network_retries, config.default_branch.clone())
    }

    /// Branch requested when a clone does not name one.
    #[must_use]
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    fn bounded(&self, cmd: GitCommand) -> GitCommand {
        cmd.with_timeout(Some(self.timeout))
    }

    async fn with_network_retry<T, F, Fut>(&self, label: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let strategy =
            FixedInterval::from_millis(NETWORK_RETRY_DELAY_MS).take(self.retries as usize);
        let mut attempt = 0u32;
        RetryIf::spawn(
            strategy,
            || {
                attempt += 1;
                if attempt > 1 {
                    debug!(target: "git", "({}) Retry attempt {}", label, attempt - 1);
                }
                action()
            },
            is_retryable,
        )
        .await
    }

    async fn clone_once(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<()> {
        let label = repo_label(dest);
        let context = label.as_str();
        self.with_network_retry(&label, || async move {
            let result = self
                .bounded(GitCommand::clone(url, dest, branch))
                .with_context(context)
                .execute_success()
                .await;
            if result.is_err() {
                remove_partial(dest).await;
            }
            result
        })
        .await
    }

    /// Clones `url` into `dest`, checking out `branch` (or the configured
    /// default branch).
    ///
    /// When the branch does not exist on the remote, the remote's default
    /// branch is cloned instead and the outcome carries a warning.
    ///
    /// # Errors
    ///
    /// [`CachetError::Validation`] if `dest` already exists, otherwise
    /// [`CachetError::Git`]. A failed clone leaves no `dest` behind.
    pub async fn clone(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<CloneOutcome> {
        if dest.exists() {
            return Err(CachetError::validation(
                "destination",
                format!("{} already exists", dest.display()),
            )
            .into());
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CachetError::from_io("create directory", parent, &e))?;
        }

        let requested = branch.unwrap_or(&self.default_branch).to_string();
        info!(target: "git", "Cloning {} into {}", url, dest.display());

        let warning = match self.clone_once(url, dest, Some(&requested)).await {
            Ok(()) => None,
            Err(e) if is_missing_branch_error(&e) => {
                let message = format!(
                    "branch '{requested}' not found in {url}; using the repository's default branch"
                );
                warn!(target: "git", "{}", message);
                self.clone_once(url, dest, None).await?;
                Some(message)
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = exclude_metadata(dest).await {
            remove_partial(dest).await;
            return Err(e);
        }

        let branch = match self.current_branch(dest).await {
            Ok(b) if !b.is_empty() => b,
            _ => requested,
        };

        Ok(CloneOutcome {
            branch,
            warning,
        })
    }

    /// Paths with uncommitted changes to tracked files.
    pub async fn modified_paths(&self, dest: &Path) -> Result<Vec<String>> {
        let out = self
            .bounded(GitCommand::status_porcelain(true))
            .current_dir(dest)
            .execute()
            .await?;
        Ok(status::parse_porcelain(&out.stdout))
    }

    async fn current_branch(&self, dest: &Path) -> Result<String> {
        self.bounded(GitCommand::current_branch()).current_dir(dest).execute_stdout().await
    }

    async fn ref_exists(&self, dest: &Path, reference: &str) -> bool {
        self.bounded(GitCommand::verify_ref(reference)).current_dir(dest).execute_success().await.is_ok()
    }

    /// Upstream of the current branch, falling back to `origin/<branch>`,
    /// `origin/main`, then `origin/master`.
    pub async fn resolve_upstream(&self, dest: &Path) -> Option<String> {
        match self.bounded(GitCommand::upstream()).current_dir(dest).execute_stdout().await {
            Ok(upstream) if !upstream.is_empty() => return Some(upstream),
            _ => {}
        }

        let mut candidates = Vec::new();
        match self.current_branch(dest).await {
            Ok(branch) if !branch.is_empty() => candidates.push(format!("origin/{branch}")),
            _ => {}
        }
        candidates.push("origin/main".to_string());
        candidates.push("origin/master".to_string());

        for candidate in candidates {
            if self.ref_exists(dest, &candidate).await {
                debug!(target: "git", "No tracking upstream; using {}", candidate);
                return Some(candidate);
            }
        }
        None
    }

    async fn ahead_behind(&self, dest: &Path, upstream: &str) -> Result<(u32, u32)> {
        let out = self
            .bounded(GitCommand::left_right_count("HEAD", upstream))
            .current_dir(dest)
            .execute_stdout()
            .await?;
        status::parse_left_right(&out).ok_or_else(|| {
            CachetError::Git {
                operation: "rev-list".to_string(),
                stderr: format!("unexpected output: {out}"),
            }
            .into()
        })
    }

    fn ensure_repository(dest: &Path) -> Result<()> {
        if is_repository(dest) {
            Ok(())
        } else {
            Err(CachetError::Git {
                operation: "sync".to_string(),
                stderr: format!("{} is not a git working copy", dest.display()),
            }
            .into())
        }
    }

    /// Fetches and fast-forwards the working copy at `dest`.
    ///
    /// # Errors
    ///
    /// - [`CachetError::Conflict`] listing modified paths when there are local
    ///   modifications and `force` is false; nothing is changed
    /// - [`CachetError::Git`] when fetching fails after retries, no upstream
    ///   exists, or the branch has diverged; modifications stashed by `force`
    ///   are popped back before returning
    pub async fn sync(&self, dest: &Path, force: bool) -> Result<SyncResult> {
        Self::ensure_repository(dest)?;
        let label = repo_label(dest);

        let modified = self.modified_paths(dest).await?;
        let mut stashed = false;
        if !modified.is_empty() {
            if !force {
                return Err(CachetError::Conflict {
                    identifier: label,
                    message: format!("{} locally modified file(s)", modified.len()),
                    paths: modified,
                }
                .into());
            }
            info!(target: "git", "({}) Stashing {} modified file(s)", label, modified.len());
            self.bounded(GitCommand::stash_push("cachet: stashed before sync"))
                .current_dir(dest)
                .with_context(label.clone())
                .execute_success()
                .await?;
            stashed = true;
        }

        let outcome = self.fast_forward(dest, &label, stashed).await;
        if stashed && outcome.is_err() {
            self.restore_stash(dest, &label).await;
        }
        outcome
    }

    /// Puts stashed local modifications back after a failed sync.
    async fn restore_stash(&self, dest: &Path, label: &str) {
        match self
            .bounded(GitCommand::stash_pop())
            .current_dir(dest)
            .with_context(label.to_string())
            .execute_success()
            .await
        {
            Ok(()) => debug!(target: "git", "({}) Restored stashed changes after failed sync", label),
            Err(e) => warn!(
                target: "git",
                "({}) Could not restore stashed changes; they remain in `git stash`: {}",
                label,
                e
            ),
        }
    }

    async fn fast_forward(&self, dest: &Path, label: &str, stashed: bool) -> Result<SyncResult> {
        self.with_network_retry(label, || {
            self.bounded(GitCommand::fetch())
                .current_dir(dest)
                .with_context(label.to_string())
                .execute_success()
        })
        .await?;

        let upstream = self.resolve_upstream(dest).await.ok_or_else(|| CachetError::Git {
            operation: "sync".to_string(),
            stderr: "no upstream branch found (tried @{u}, origin/main, origin/master)".to_string(),
        })?;

        let (ahead, behind) = self.ahead_behind(dest, &upstream).await?;
        if behind == 0 {
            debug!(target: "git", "({}) Already up to date with {}", label, upstream);
            return Ok(SyncResult {
                updated: false,
                already_current: true,
                commits: 0,
                stashed,
                upstream,
            });
        }
        if ahead > 0 {
            return Err(CachetError::Git {
                operation: "merge".to_string(),
                stderr: format!(
                    "local branch has diverged from {upstream} ({ahead} ahead, {behind} behind); \
                     resolve manually in {}",
                    dest.display()
                ),
            }
            .into());
        }

        self.bounded(GitCommand::merge_ff_only(&upstream))
            .current_dir(dest)
            .with_context(label.to_string())
            .execute_success()
            .await?;
        info!(target: "git", "({}) Fast-forwarded {} commit(s) from {}", label, behind, upstream);

        Ok(SyncResult {
            updated: true,
            already_current: false,
            commits: behind,
            stashed,
            upstream,
        })
    }

    /// Local status of the working copy at `dest`. Does not fetch.
    pub async fn status(&self, dest: &Path) -> Result<RepoStatus> {
        Self::ensure_repository(dest)?;

        let porcelain = self
            .bounded(GitCommand::status_porcelain(false))
            .current_dir(dest)
            .execute()
            .await?;
        let modified = status::parse_porcelain(&porcelain.stdout);

        let branch = match self.current_branch(dest).await? {
            b if b.is_empty() => "HEAD".to_string(),
            b => b,
        };
        let last_commit = self
            .bounded(GitCommand::last_commit_summary())
            .current_dir(dest)
            .execute_stdout()
            .await
            .unwrap_or_default();

        let upstream = self.resolve_upstream(dest).await;
        let (ahead, behind) = match &upstream {
            Some(u) => self.ahead_behind(dest, u).await.unwrap_or((0, 0)),
            None => (0, 0),
        };

        Ok(RepoStatus {
            state: RepoState::classify(!modified.is_empty(), ahead, behind),
            branch,
            last_commit,
            upstream,
            ahead,
            behind,
            modified,
        })
    }
}

async fn remove_partial(dest: &Path) {
    match tokio::fs::remove_dir_all(dest).await {
        Ok(()) => debug!(target: "git", "Removed partial clone at {}", dest.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(target: "git", "Failed to remove partial clone {}: {}", dest.display(), e),
    }
}

/// Adds the metadata record to `.git/info/exclude` so it never shows up as a
/// local modification.
async fn exclude_metadata(dest: &Path) -> Result<()> {
    let info = dest.join(".git").join("info");
    tokio::fs::create_dir_all(&info)
        .await
        .map_err(|e| CachetError::from_io("create directory", &info, &e))?;
    let exclude = info.join("exclude");
    let entry = format!("/{META_NAME}");

    let mut content = match tokio::fs::read_to_string(&exclude).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(CachetError::from_io("read", &exclude, &e).into()),
    };
    if content.lines().any(|l| l.trim() == entry) {
        return Ok(());
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&entry);
    content.push('\n');
    tokio::fs::write(&exclude, content)
        .await
        .map_err(|e| CachetError::from_io("write", &exclude, &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SourceRepo, TestGit};
    use tempfile::TempDir;

    fn git_sync() -> GitSync {
        GitSync::new(Duration::from_secs(60), 0, "main")
    }

    async fn cloned(temp: &TempDir, origin: &SourceRepo) -> PathBuf {
        let dest = temp.path().join("cache").join("tools");
        git_sync().clone(&origin.url(), &dest, None).await.unwrap();
        TestGit::new(&dest).config_user().unwrap();
        dest
    }

    #[tokio::test]
    async fn test_clone_checks_out_branch_and_excludes_metadata() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("deploy.sh", "echo hi\n")]).unwrap();
        let dest = temp.path().join("cache").join("tools");

        let outcome = git_sync().clone(&origin.url(), &dest, None).await.unwrap();
        assert_eq!(outcome.branch, "main");
        assert!(outcome.warning.is_none());
        assert!(dest.join("deploy.sh").exists());

        let exclude = std::fs::read_to_string(dest.join(".git/info/exclude")).unwrap();
        assert!(exclude.lines().any(|l| l == "/.meta"));
        std::fs::write(dest.join(".meta"), "name=tools\n").unwrap();
        assert!(git_sync().modified_paths(&dest).await.unwrap().is_empty());
        assert_eq!(git_sync().status(&dest).await.unwrap().state, RepoState::Clean);
    }

    #[tokio::test]
    async fn test_clone_missing_branch_falls_back_with_warning() {
        let temp = TempDir::new().unwrap();
        let origin =
            SourceRepo::create_on_branch(temp.path(), "tools", "master", &[("a.sh", "")]).unwrap();
        let dest = temp.path().join("cache").join("tools");

        let outcome = git_sync().clone(&origin.url(), &dest, Some("nope")).await.unwrap();
        assert_eq!(outcome.branch, "master");
        assert!(outcome.warning.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("cache").join("ghost");
        let missing = url::Url::from_file_path(temp.path().join("does-not-exist")).unwrap();

        let err = git_sync().clone(missing.as_str(), &dest, None).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CachetError>(), Some(CachetError::Git { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_clone_into_existing_dir_is_rejected() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[]).unwrap();
        let dest = temp.path().join("taken");
        std::fs::create_dir_all(&dest).unwrap();

        let err = git_sync().clone(&origin.url(), &dest, None).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CachetError>(), Some(CachetError::Validation { .. })));
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_sync_already_current() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("a.sh", "")]).unwrap();
        let dest = cloned(&temp, &origin).await;

        let result = git_sync().sync(&dest, false).await.unwrap();
        assert!(result.already_current);
        assert!(!result.updated);
        assert_eq!(result.upstream, "origin/main");
    }

    #[tokio::test]
    async fn test_sync_fast_forwards_new_commits() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("a.sh", "")]).unwrap();
        let dest = cloned(&temp, &origin).await;

        origin.write_file("b.sh", "echo b\n").unwrap();
        origin.commit_all("add b").unwrap();

        let result = git_sync().sync(&dest, false).await.unwrap();
        assert!(result.updated);
        assert_eq!(result.commits, 1);
        assert!(dest.join("b.sh").exists());
    }

    #[tokio::test]
    async fn test_sync_with_local_edits_requires_force() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("deploy.sh", "v1\n")]).unwrap();
        let dest = cloned(&temp, &origin).await;
        origin.write_file("other.sh", "x\n").unwrap();
        origin.commit_all("upstream change").unwrap();
        std::fs::write(dest.join("deploy.sh"), "local edit\n").unwrap();
        let head_before = TestGit::new(&dest).head().unwrap();

        let err = git_sync().sync(&dest, false).await.unwrap_err();
        match err.downcast_ref::<CachetError>() {
            Some(CachetError::Conflict {
                paths,
                ..
            }) => assert_eq!(paths, &vec!["deploy.sh".to_string()]),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(TestGit::new(&dest).head().unwrap(), head_before);
        assert_eq!(std::fs::read_to_string(dest.join("deploy.sh")).unwrap(), "local edit\n");

        let result = git_sync().sync(&dest, true).await.unwrap();
        assert!(result.updated);
        assert!(result.stashed);
        assert_eq!(TestGit::new(&dest).stash_count().unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dest.join("deploy.sh")).unwrap(), "v1\n");
        assert!(dest.join("other.sh").exists());
    }

    #[tokio::test]
    async fn test_sync_diverged_is_git_error() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("a.sh", "")]).unwrap();
        let dest = cloned(&temp, &origin).await;

        origin.write_file("up.sh", "").unwrap();
        origin.commit_all("upstream").unwrap();
        std::fs::write(dest.join("local.sh"), "").unwrap();
        let local = TestGit::new(&dest);
        local.add_all().unwrap();
        local.commit("local").unwrap();

        let err = git_sync().sync(&dest, false).await.unwrap_err();
        match err.downcast_ref::<CachetError>() {
            Some(CachetError::Git {
                stderr,
                ..
            }) => assert!(stderr.contains("diverged")),
            other => panic!("expected git error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_forced_sync_restores_local_edits() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("a.sh", "v1\n")]).unwrap();
        let dest = cloned(&temp, &origin).await;

        origin.write_file("up.sh", "").unwrap();
        origin.commit_all("upstream").unwrap();
        std::fs::write(dest.join("local.sh"), "").unwrap();
        let local = TestGit::new(&dest);
        local.add_all().unwrap();
        local.commit("local").unwrap();
        std::fs::write(dest.join("a.sh"), "local edit\n").unwrap();

        let err = git_sync().sync(&dest, true).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CachetError>(), Some(CachetError::Git { .. })));
        assert_eq!(std::fs::read_to_string(dest.join("a.sh")).unwrap(), "local edit\n");
        assert_eq!(local.stash_count().unwrap(), 0);
        assert_eq!(git_sync().modified_paths(&dest).await.unwrap(), vec!["a.sh"]);
    }

    #[tokio::test]
    async fn test_status_reports_modified_and_behind() {
        let temp = TempDir::new().unwrap();
        let origin = SourceRepo::create(temp.path(), "tools", &[("a.sh", "1\n")]).unwrap();
        let dest = cloned(&temp, &origin).await;

        let status = git_sync().status(&dest).await.unwrap();
        assert_eq!(status.branch, "main");
        assert!(status.last_commit.ends_with("Initial commit"));

        origin.write_file("a.sh", "2\n").unwrap();
        origin.commit_all("second").unwrap();
        GitCommand::fetch().current_dir(&dest).execute_success().await.unwrap();
        let status = git_sync().status(&dest).await.unwrap();
        assert_eq!(status.state, RepoState::Behind);
        assert_eq!(status.behind, 1);

        std::fs::write(dest.join("a.sh"), "dirty\n").unwrap();
        let status = git_sync().status(&dest).await.unwrap();
        assert_eq!(status.state, RepoState::Modified);
        assert_eq!(status.modified, vec!["a.sh"]);
    }

    #[tokio::test]
    async fn test_sync_on_non_repository_fails() {
        let temp = TempDir::new().unwrap();
        let err = git_sync().sync(temp.path(), false).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CachetError>(), Some(CachetError::Git { .. })));
    }

    #[test]
    fn test_ensure_git_available() {
        assert!(ensure_git_available().is_ok());
    }
}
