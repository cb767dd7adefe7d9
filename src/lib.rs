//! cachet - a local cache of git repositories with name-based script lookup
//!
//! cachet clones git repositories into a cache directory, keeps them up to
//! date with fast-forward syncs, indexes the scripts they contain, and runs
//! any of them by name. When several repositories provide a script of the
//! same name, the user picks one.
//!
//! # Architecture Overview
//!
//! ```text
//! ConfigResolver ──> ConfigSet ──> CacheStore (+ PID lock)
//!                                     │
//!                        RepositoryRegistry ──> GitSync (system git)
//!                                     │
//!                              ScriptIndexer ──> ConflictResolver
//! ```
//!
//! - The CLI resolves the configuration once at startup and initializes the
//!   cache root.
//! - Every mutation of the cache (add, remove, sync, index rebuild) happens
//!   while holding the cache-wide lock; reads never lock.
//! - The filesystem is the source of truth. Metadata records and the script
//!   index are derived data that [`registry`] and [`scripts`] rebuild or
//!   report on, never silently repair.
//!
//! # Core Modules
//!
//! - [`config`] - layered configuration (defaults, file, environment, CLI)
//! - [`cache`] - cache directory layout and the cross-process lock
//! - [`registry`] - cached repositories and their metadata records
//! - [`git`] - clone, fetch, fast-forward and status via the `git` binary
//! - [`scripts`] - script discovery and the name index
//! - [`conflict`] - choosing between same-named scripts
//! - [`core`] - error taxonomy and exit codes
//! - [`cli`] - the `cachet` command-line interface
//! - [`utils`] - filesystem, platform and progress helpers
//!
//! # Cache Layout
//!
//! ```text
//! <cache_dir>/
//!   .meta/
//!     lock                  holder pid, acquisition time, token
//!     script-index          name|relative_path|repository per line
//!   <repository>/
//!     .git/
//!     .meta                 key=value metadata record
//!     ...working tree...
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod constants;
pub mod core;
pub mod git;
pub mod registry;
pub mod scripts;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
