//! Integration test suite for cachet
//!
//! These tests drive real `git` against local origin repositories reached
//! through `file://` URLs, so no network access is needed.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **lifecycle**: add, index, resolve, sync and remove through the library
//! - **cli**: the `cachet` binary end to end, including exit codes
//! - **locking**: lock contention, stale lock reclamation, concurrent adds

mod common;

mod cli;
mod lifecycle;
mod locking;
