//! Filesystem walk that finds scripts inside one repository.

use anyhow::Result;
use glob::Pattern;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::index::ScriptEntry;
use crate::core::CachetError;

/// Compiled script patterns plus the directory names to prune.
#[derive(Debug, Clone)]
pub struct ScanRules {
    patterns: Vec<Pattern>,
    exclude_dirs: Vec<String>,
}

impl ScanRules {
    /// Compiles glob patterns matched against file names.
    ///
    /// # Errors
    ///
    /// [`CachetError::Validation`] with field `script_patterns` for an
    /// invalid glob.
    pub fn new(patterns: &[String], exclude_dirs: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| CachetError::validation("script_patterns", format!("'{p}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            exclude_dirs: exclude_dirs.to_vec(),
        })
    }

    fn is_script(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(file_name))
    }

    fn is_excluded(&self, dir_name: &str) -> bool {
        self.exclude_dirs.iter().any(|d| d == dir_name)
    }
}

/// Finds every script under `repo_dir`, pruning excluded directories.
///
/// Entries are returned sorted. Unreadable subtrees are skipped with a
/// warning.
#[must_use]
pub fn scan_repository(repository: &str, repo_dir: &Path, rules: &ScanRules) -> Vec<ScriptEntry> {
    let mut found = Vec::new();
    let walker = WalkDir::new(repo_dir).min_depth(1).follow_links(false).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir() && rules.is_excluded(&e.file_name().to_string_lossy()))
    });

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "scripts", "Skipping unreadable path in {}: {}", repository, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !rules.is_script(&file_name) {
            continue;
        }
        let Some(stem) = entry.path().file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(repo_dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let script = ScriptEntry::new(stem, relative, repository);
        if script.is_encodable() {
            found.push(script);
        } else {
            warn!(
                target: "scripts",
                "Ignoring {}/{}: name or path contains '|' or a newline",
                repository,
                script.relative_path
            );
        }
    }

    super::index::normalize(&mut found);
    debug!(target: "scripts", "Found {} script(s) in {}", found.len(), repository);
    found
}
