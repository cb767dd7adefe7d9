//! Repository URL validation and local name derivation.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::constants::{FALLBACK_REPO_NAME, META_NAME};
use crate::core::CachetError;

static SCP_LIKE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[^/\\].*$").ok());
static NAME_CHARS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").ok());

fn is_match(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

const MAX_NAME_LEN: usize = 100;

fn invalid_url(url: &str, reason: &str) -> anyhow::Error {
    CachetError::validation("url", format!("'{url}': {reason}")).into()
}

fn with_git_suffix(url: &str) -> String {
    if url.ends_with(".git") { url.to_string() } else { format!("{url}.git") }
}

/// Validates a repository URL and returns its normalized form.
///
/// Accepted: `https://`, `http://`, `ssh://`, scp-style `user@host:path`, and
/// `file://`. Remote URLs are normalized to end in `.git`; `file://` URLs only
/// lose trailing slashes, since a local path is used as-is by git.
///
/// # Errors
///
/// [`CachetError::Validation`] with field `url` for anything else.
pub fn normalize_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(invalid_url(url, "URL is empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid_url(url, "URL must not contain whitespace"));
    }

    if !url.contains("://") {
        if is_match(&SCP_LIKE, url) {
            return Ok(with_git_suffix(url.trim_end_matches('/')));
        }
        return Err(invalid_url(url, "expected https://, http://, ssh://, file:// or user@host:path"));
    }

    let parsed = url::Url::parse(url).map_err(|e| invalid_url(url, &e.to_string()))?;
    let trimmed = url.trim_end_matches('/');
    match parsed.scheme() {
        "https" | "http" | "ssh" => {
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(invalid_url(url, "missing host"));
            }
            if parsed.path().trim_matches('/').is_empty() {
                return Err(invalid_url(url, "missing repository path"));
            }
            Ok(with_git_suffix(trimmed))
        }
        "file" => {
            if parsed.path().trim_matches('/').is_empty() {
                return Err(invalid_url(url, "missing repository path"));
            }
            Ok(trimmed.to_string())
        }
        other => Err(invalid_url(url, &format!("unsupported scheme '{other}'"))),
    }
}

/// Derives a local repository name from a (normalized) URL.
///
/// Takes the final path segment, strips `.git`, replaces characters outside
/// `[A-Za-z0-9._-]` with `_`, and trims leading/trailing `.` and `_`. Falls
/// back to a fixed name when nothing is left.
#[must_use]
pub fn derive_name(url: &str) -> String {
    let path = url.trim_end_matches('/');
    let last = path.rsplit(['/', ':']).next().unwrap_or_default();
    let stem = last.strip_suffix(".git").unwrap_or(last);
    let replaced: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let name = replaced.trim_matches(['.', '_']);
    if name.is_empty() { FALLBACK_REPO_NAME.to_string() } else { name.to_string() }
}

/// Validates an explicitly chosen repository name.
///
/// # Errors
///
/// [`CachetError::Validation`] with field `name`.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is longer than 100 characters")
    } else if !is_match(&NAME_CHARS, name) {
        Some("only letters, digits, '.', '_' and '-' are allowed")
    } else if name.starts_with(['.', '_']) {
        Some("name must not start with '.' or '_'")
    } else if name == META_NAME {
        Some("name is reserved")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(CachetError::validation("name", format!("'{name}': {reason}")).into()),
        None => Ok(()),
    }
}
