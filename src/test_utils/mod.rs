//! Test utilities for cachet
//!
//! Helpers shared by unit tests and the integration suite:
//! - [`init_test_logging`] installs a test-writer tracing subscriber once
//! - [`TestGit`] runs git commands against a test repository
//! - [`SourceRepo`] builds a committed "remote" repository reachable through a
//!   `file://` URL, so clone/fetch paths run against real git without network
//!
//! # Example
//!
//! ```rust,no_run
//! use cachet::test_utils::SourceRepo;
//!
//! let temp = tempfile::TempDir::new().unwrap();
//! let origin = SourceRepo::create(temp.path(), "tools", &[("deploy.sh", "echo hi\n")]).unwrap();
//! let url = origin.url();
//! ```

pub mod fixtures;
pub mod git_helper;

pub use fixtures::SourceRepo;
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither
/// is set.
///
/// ```bash
/// RUST_LOG=cache::lock=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
