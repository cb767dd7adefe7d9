//! Working-copy status types and parsing of git's porcelain output.

use serde::Serialize;
use std::fmt;

/// Summary state of a working copy relative to its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoState {
    /// No local changes, in step with upstream
    Clean,
    /// Local modifications present
    Modified,
    /// Local commits not on upstream
    Ahead,
    /// Upstream commits not yet merged
    Behind,
    /// Both ahead and behind
    Diverged,
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clean => "clean",
            Self::Modified => "modified",
            Self::Ahead => "ahead",
            Self::Behind => "behind",
            Self::Diverged => "diverged",
        };
        f.write_str(s)
    }
}

/// Result of `GitSync::status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub state: RepoState,
    /// Current branch, or `HEAD` when detached
    pub branch: String,
    /// `<short hash> <subject>` of HEAD
    pub last_commit: String,
    /// Upstream compared against, if one could be found
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    /// Paths with local modifications
    pub modified: Vec<String>,
}

impl RepoState {
    /// Derives the state. Local modifications take precedence.
    #[must_use]
    pub const fn classify(has_modifications: bool, ahead: u32, behind: u32) -> Self {
        if has_modifications {
            Self::Modified
        } else if ahead > 0 && behind > 0 {
            Self::Diverged
        } else if ahead > 0 {
            Self::Ahead
        } else if behind > 0 {
            Self::Behind
        } else {
            Self::Clean
        }
    }
}

/// Extracts paths from `git status --porcelain` (v1) output.
///
/// Renames (`R  old -> new`) report the new path. Quoted paths are unquoted.
#[must_use]
pub fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            let path = path.rsplit_once(" -> ").map_or(path, |(_, new)| new);
            path.trim_matches('"').to_string()
        })
        .collect()
}

/// Parses `rev-list --left-right --count` output: `<left>\t<right>`.
#[must_use]
pub fn parse_left_right(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    Some((left, right))
}

/// Whether git's diagnostic text says the requested branch does not exist.
#[must_use]
pub fn is_missing_branch(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    (lower.contains("remote branch") && lower.contains("not found"))
        || lower.contains("couldn't find remote ref")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_porcelain() {
        let out = " M deploy.sh\nM  lib/util.sh\nR  old.sh -> new.sh\n?? \"with space.sh\"\n";
        assert_eq!(
            parse_porcelain(out),
            vec!["deploy.sh", "lib/util.sh", "new.sh", "with space.sh"]
        );
        assert!(parse_porcelain("").is_empty());
    }

    #[test]
    fn test_parse_left_right() {
        assert_eq!(parse_left_right("2\t5\n"), Some((2, 5)));
        assert_eq!(parse_left_right("garbage"), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(RepoState::classify(true, 1, 1), RepoState::Modified);
        assert_eq!(RepoState::classify(false, 1, 1), RepoState::Diverged);
        assert_eq!(RepoState::classify(false, 2, 0), RepoState::Ahead);
        assert_eq!(RepoState::classify(false, 0, 3), RepoState::Behind);
        assert_eq!(RepoState::classify(false, 0, 0), RepoState::Clean);
    }

    #[test]
    fn test_missing_branch_detection() {
        assert!(is_missing_branch(
            "warning: Could not find remote branch nope to clone.\nfatal: Remote branch nope not found in upstream origin"
        ));
        assert!(is_missing_branch("fatal: couldn't find remote ref refs/heads/nope"));
        assert!(!is_missing_branch("fatal: repository 'x' does not exist"));
    }
}
