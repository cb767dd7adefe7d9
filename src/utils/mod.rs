//! Cross-platform utilities: file operations, platform helpers, progress.

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, remove_dir_all_if_exists, safe_write};
pub use platform::{get_git_command, process_alive, resolve_path};

use strsim::levenshtein;

/// Returns the candidate closest to `target` within `max_distance` edits.
///
/// Ties are broken by the order of `candidates`.
pub fn closest_match<'a, I>(target: &str, candidates: I, max_distance: usize) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter(|c| *c != target)
        .map(|c| (levenshtein(target, c), c))
        .filter(|(d, _)| *d <= max_distance)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}
