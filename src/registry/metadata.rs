//! The per-repository metadata record, `<cacheRoot>/<name>/.meta`.
//!
//! ```text
//! name=tools
//! url=https://example.com/org/tools.git
//! branch=main
//! added_at=2026-10-15T09:12:44Z
//! last_synced=2026-10-15T10:01:02Z
//! script_count=12
//! ```
//!
//! Unknown keys are kept, in order, and written back unchanged.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::parser::{self, Dialect};
use crate::core::CachetError;

const KNOWN_KEYS: [&str; 6] = ["name", "url", "branch", "added_at", "last_synced", "script_count"];

/// One cached repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryEntry {
    pub name: String,
    /// Normalized source URL
    pub url: String,
    /// Working copy directory; derived from the name, not stored
    pub local_path: PathBuf,
    pub default_branch: String,
    pub added_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Scripts found at the last discovery
    pub script_count: u32,
    /// Keys this version does not understand
    #[serde(skip)]
    pub extra: Vec<(String, String)>,
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn corrupt(path: &Path, reason: impl Into<String>) -> anyhow::Error {
    CachetError::validation("metadata", format!("{}: {}", path.display(), reason.into())).into()
}

impl RepositoryEntry {
    /// A freshly added entry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        default_branch: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            url: url.into(),
            local_path: local_path.into(),
            default_branch: default_branch.into(),
            added_at: now,
            last_synced_at: Some(now),
            script_count: 0,
            extra: Vec::new(),
        }
    }

    /// Serializes the record.
    #[must_use]
    pub fn to_record(&self) -> String {
        let added = timestamp(&self.added_at);
        let synced = self.last_synced_at.as_ref().map(timestamp).unwrap_or_default();
        let count = self.script_count.to_string();
        let mut pairs: Vec<(&str, &str)> = vec![
            ("name", self.name.as_str()),
            ("url", self.url.as_str()),
            ("branch", self.default_branch.as_str()),
            ("added_at", added.as_str()),
            ("last_synced", synced.as_str()),
            ("script_count", count.as_str()),
        ];
        pairs.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        parser::render(pairs)
    }

    /// Parses a record read from `path`; `local_path` is the owning directory.
    ///
    /// `name`, `url` and `added_at` are required.
    ///
    /// # Errors
    ///
    /// [`CachetError::Validation`] with field `metadata` when a required key
    /// is missing or a value is malformed.
    pub fn from_record(text: &str, path: &Path, local_path: impl Into<PathBuf>) -> Result<Self> {
        let kv = parser::parse(text, Dialect::Record);
        let required = |key: &str| -> Result<String> {
            kv.get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or_else(|| corrupt(path, format!("missing '{key}'")))
        };

        let name = required("name")?;
        let url = required("url")?;
        let added_raw = required("added_at")?;
        let added_at = DateTime::parse_from_rfc3339(&added_raw)
            .map_err(|e| corrupt(path, format!("bad added_at '{added_raw}': {e}")))?
            .with_timezone(&Utc);

        let last_synced_at = match kv.get("last_synced").map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| corrupt(path, format!("bad last_synced '{raw}': {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        let script_count = match kv.get("script_count").map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => {
                raw.parse().map_err(|_| corrupt(path, format!("bad script_count '{raw}'")))?
            }
            None => 0,
        };

        let mut extra: Vec<(String, String)> = Vec::new();
        for (key, value) in &kv.pairs {
            if KNOWN_KEYS.contains(&key.as_str()) {
                continue;
            }
            match extra.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1.clone_from(value),
                None => extra.push((key.clone(), value.clone())),
            }
        }

        Ok(Self {
            name,
            url,
            local_path: local_path.into(),
            default_branch: kv.get("branch").map(str::trim).unwrap_or_default().to_string(),
            added_at,
            last_synced_at,
            script_count,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> RepositoryEntry {
        RepositoryEntry {
            name: "tools".into(),
            url: "https://example.com/org/tools.git".into(),
            local_path: PathBuf::from("/c/tools"),
            default_branch: "main".into(),
            added_at: Utc.with_ymd_and_hms(2026, 10, 15, 9, 12, 44).unwrap(),
            last_synced_at: Some(Utc.with_ymd_and_hms(2026, 10, 15, 10, 1, 2).unwrap()),
            script_count: 12,
            extra: vec![("owner".into(), "ops team".into())],
        }
    }

    #[test]
    fn test_record_round_trip() {
        let entry = sample();
        let text = entry.to_record();
        assert!(text.starts_with("name=tools\nurl=https://example.com/org/tools.git\n"));
        assert!(text.contains("added_at=2026-10-15T09:12:44Z\n"));
        let parsed = RepositoryEntry::from_record(&text, Path::new("/c/tools/.meta"), "/c/tools").unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_unknown_keys_survive_rewrite() {
        let text = "name=tools\nfuture_key=a=b\nurl=file:///x\nadded_at=2026-01-01T00:00:00Z\n";
        let mut entry = RepositoryEntry::from_record(text, Path::new(".meta"), "/c/tools").unwrap();
        assert_eq!(entry.extra, vec![("future_key".to_string(), "a=b".to_string())]);
        entry.script_count = 3;
        let rewritten = entry.to_record();
        assert!(rewritten.contains("future_key=a=b\n"));
        assert!(rewritten.contains("script_count=3\n"));
    }

    #[test]
    fn test_optional_fields_default() {
        let text = "name=tools\nurl=file:///x\nadded_at=2026-01-01T00:00:00Z\n";
        let entry = RepositoryEntry::from_record(text, Path::new(".meta"), "/c/tools").unwrap();
        assert_eq!(entry.script_count, 0);
        assert!(entry.last_synced_at.is_none());
        assert_eq!(entry.default_branch, "");
    }

    #[test]
    fn test_missing_required_key_is_validation_error() {
        let err = RepositoryEntry::from_record("name=tools\n", Path::new(".meta"), "/c/tools").unwrap_err();
        match err.downcast_ref::<CachetError>() {
            Some(CachetError::Validation {
                field,
                message,
            }) => {
                assert_eq!(field, "metadata");
                assert!(message.contains("url"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let text = "name=t\nurl=u\nadded_at=yesterday\n";
        assert!(RepositoryEntry::from_record(text, Path::new(".meta"), "/c/t").is_err());
        let text = "name=t\nurl=u\nadded_at=2026-01-01T00:00:00Z\nscript_count=-4\n";
        assert!(RepositoryEntry::from_record(text, Path::new(".meta"), "/c/t").is_err());
    }
}
