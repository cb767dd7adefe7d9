//! Global constants used throughout the cachet codebase.
//!
//! Timeouts, polling intervals, and the reserved file names that make up the
//! on-disk cache layout. Keeping them here keeps the layout discoverable for
//! anyone inspecting a cache directory by hand.

use std::time::Duration;

/// Name of the reserved metadata directory under the cache root, and of the
/// per-repository metadata record inside each working copy.
pub const META_NAME: &str = ".meta";

/// Lock file name inside `<cacheRoot>/.meta/`.
pub const LOCK_FILE_NAME: &str = "lock";

/// Script index file name inside `<cacheRoot>/.meta/`.
pub const SCRIPT_INDEX_FILE_NAME: &str = "script-index";

/// Prefix for repository directories parked for deletion.
pub const TRASH_PREFIX: &str = "trash-";

/// Default timeout for cache lock acquisition (30 seconds).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed sleep between lock acquisition attempts while a live owner holds it.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// A lock file that has no readable owner yet is treated as being written by
/// its creator for this long before it is considered abandoned.
pub const LOCK_UNREADABLE_GRACE: Duration = Duration::from_secs(10);

/// Age after which a leftover stale-lock takeover guard is removed.
pub const LOCK_TAKEOVER_GRACE: Duration = Duration::from_secs(10);

/// Default timeout for a single git subprocess (5 minutes).
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of retries for network git operations (clone, fetch).
pub const DEFAULT_NETWORK_RETRIES: u32 = 2;

/// Delay between retries of a failed network git operation.
pub const NETWORK_RETRY_DELAY_MS: u64 = 500;

/// Fallback token used when a repository name cannot be derived from a URL.
pub const FALLBACK_REPO_NAME: &str = "repository";

/// Default branch requested when none is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Default script pattern (matched against file names).
pub const DEFAULT_SCRIPT_PATTERNS: &[&str] = &["*.sh"];

/// Directories pruned during script discovery.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] =
    &[".git", "node_modules", "vendor", "target", ".venv", "__pycache__"];

/// Maximum edit distance for "did you mean" suggestions.
pub const SUGGESTION_MAX_DISTANCE: usize = 3;
