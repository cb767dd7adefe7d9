//! Script entries and the on-disk index codec.
//!
//! The index file holds one `name|relative_path|repository` line per script,
//! sorted by name, then repository, then path. It is a cache of what is on
//! disk and can always be rebuilt.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// One discovered script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScriptEntry {
    /// File name without extension
    pub name: String,
    /// Path inside the repository, `/`-separated
    pub relative_path: String,
    /// Owning repository
    pub repository: String,
}

impl ScriptEntry {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        relative_path: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            repository: repository.into(),
        }
    }

    /// Whether the entry can be written to the index unambiguously.
    #[must_use]
    pub fn is_encodable(&self) -> bool {
        [&self.name, &self.relative_path, &self.repository]
            .iter()
            .all(|f| !f.is_empty() && !f.contains(['|', '\n', '\r']))
    }
}

impl Ord for ScriptEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.repository.cmp(&other.repository))
            .then_with(|| self.relative_path.cmp(&other.relative_path))
    }
}

impl PartialOrd for ScriptEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts and removes duplicates.
pub fn normalize(entries: &mut Vec<ScriptEntry>) {
    entries.sort();
    entries.dedup();
}

/// Serializes entries, one line each. Entries are expected to be normalized.
#[must_use]
pub fn encode(entries: &[ScriptEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.name);
        out.push('|');
        out.push_str(&entry.relative_path);
        out.push('|');
        out.push_str(&entry.repository);
        out.push('\n');
    }
    out
}

/// Parses index content. Malformed lines are skipped.
#[must_use]
pub fn decode(text: &str) -> Vec<ScriptEntry> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        match parts.as_slice() {
            [name, path, repo] if !name.is_empty() && !path.is_empty() && !repo.is_empty() => {
                entries.push(ScriptEntry::new(*name, *path, *repo));
            }
            _ => debug!(target: "scripts", "Skipping malformed index line {}: {}", idx + 1, line),
        }
    }
    normalize(&mut entries);
    entries
}
