//! `key=value` record codec shared by the config file, repository metadata
//! records, and the lock file.
//!
//! Two dialects are supported:
//!
//! - [`Dialect::Config`] for hand-edited files: `#` starts a comment (at line
//!   start, or after whitespace outside quotes), values may be wrapped in
//!   single or double quotes, surrounding whitespace is trimmed.
//! - [`Dialect::Record`] for machine-written records: everything after the
//!   first `=` is the value, verbatim, so a write/read cycle is lossless.
//!
//! Blank lines are ignored in both. A line without `=`, or with an empty or
//! ill-formed key, is reported as a [`MalformedLine`] and skipped; it is never
//! fatal.

use std::fmt;

/// Parsing dialect, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Hand-edited config file
    Config,
    /// Machine-written record
    Record,
}

/// A line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number
    pub line: usize,
    /// Raw line content
    pub content: String,
    /// Why the line was rejected
    pub reason: &'static str,
}

impl fmt::Display for MalformedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.reason, self.content.trim())
    }
}

/// Result of parsing a `key=value` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues {
    /// Parsed pairs in file order. Later duplicates are kept; use [`KeyValues::get`]
    /// for last-wins lookup.
    pub pairs: Vec<(String, String)>,
    /// Lines that were skipped
    pub malformed: Vec<MalformedLine>,
}

impl KeyValues {
    /// Last value recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Parses a `key=value` document.
#[must_use]
pub fn parse(text: &str, dialect: Dialect) -> KeyValues {
    let mut out = KeyValues::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim_start();
        if trimmed.trim().is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            out.malformed.push(MalformedLine {
                line: line_no,
                content: raw.to_string(),
                reason: "missing '='",
            });
            continue;
        };

        let key = key.trim();
        if !is_valid_key(key) {
            out.malformed.push(MalformedLine {
                line: line_no,
                content: raw.to_string(),
                reason: "invalid key",
            });
            continue;
        }

        let value = match dialect {
            Dialect::Record => value.trim_end_matches('\r').to_string(),
            Dialect::Config => match unquote(value) {
                Some(v) => v,
                None => {
                    out.malformed.push(MalformedLine {
                        line: line_no,
                        content: raw.to_string(),
                        reason: "unterminated quote",
                    });
                    continue;
                }
            },
        };

        out.pairs.push((key.to_string(), value));
    }

    out
}

/// Strips an inline comment and surrounding quotes from a config value.
fn unquote(value: &str) -> Option<String> {
    let value = value.trim();
    let mut chars = value.chars();
    match chars.next() {
        Some(q @ ('"' | '\'')) => {
            let rest = &value[1..];
            let end = rest.find(q)?;
            let tail = rest[end + 1..].trim();
            if !tail.is_empty() && !tail.starts_with('#') {
                return None;
            }
            Some(rest[..end].to_string())
        }
        _ => {
            // A '#' only starts a comment after whitespace, so URL fragments survive.
            let mut cut = value.len();
            let bytes = value.as_bytes();
            for (i, b) in bytes.iter().enumerate() {
                if *b == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
                    cut = i;
                    break;
                }
            }
            Some(value[..cut].trim().to_string())
        }
    }
}

/// Serializes pairs as `key=value` lines in the given order.
///
/// Values are written verbatim; callers must not pass values containing
/// newlines (they are replaced by spaces).
#[must_use]
pub fn render<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push('=');
        out.push_str(&value.replace(['\n', '\r'], " "));
        out.push('\n');
    }
    out
}

/// Parses a boolean the way config values are written.
///
/// Accepts `true/false/yes/no/1/0/on/off`, case-insensitively.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a non-negative integer.
#[must_use]
pub fn parse_non_negative(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.starts_with('+') {
        return None;
    }
    value.parse::<u64>().ok()
}

/// Splits a comma-separated list, dropping empty items.
#[must_use]
pub fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dialect_comments_quotes_blanks() {
        let text = "# header\n\ncache_dir = \"/tmp/my cache\" # trailing\nbranch='dev'\nurl=https://x/y#frag\n";
        let kv = parse(text, Dialect::Config);
        assert!(kv.malformed.is_empty());
        assert_eq!(kv.get("cache_dir"), Some("/tmp/my cache"));
        assert_eq!(kv.get("branch"), Some("dev"));
        assert_eq!(kv.get("url"), Some("https://x/y#frag"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "good=1\nno equals sign\n=empty key\nbad key=2\nquote=\"open\nalso_good=2\n";
        let kv = parse(text, Dialect::Config);
        assert_eq!(kv.pairs.len(), 2);
        assert_eq!(kv.malformed.len(), 4);
        assert_eq!(kv.malformed[0].line, 2);
        assert_eq!(kv.get("also_good"), Some("2"));
    }

    #[test]
    fn test_record_dialect_is_verbatim() {
        let text = "message= keep  # this \"too\"\n";
        let kv = parse(text, Dialect::Record);
        assert_eq!(kv.get("message"), Some(" keep  # this \"too\""));
    }

    #[test]
    fn test_render_then_parse_record() {
        let rendered = render([("name", "tools"), ("url", "https://h/o/tools.git")]);
        assert_eq!(rendered, "name=tools\nurl=https://h/o/tools.git\n");
        let kv = parse(&rendered, Dialect::Record);
        assert_eq!(kv.get("url"), Some("https://h/o/tools.git"));
    }

    #[test]
    fn test_last_value_wins() {
        let kv = parse("a=1\na=2\n", Dialect::Config);
        assert_eq!(kv.get("a"), Some("2"));
    }

    #[test]
    fn test_parse_bool_variants() {
        for v in ["true", "YES", "1", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "No", "0", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_non_negative() {
        assert_eq!(parse_non_negative("30"), Some(30));
        assert_eq!(parse_non_negative("-1"), None);
        assert_eq!(parse_non_negative("+3"), None);
        assert_eq!(parse_non_negative("1.5"), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("*.sh, *.bash ,,"), vec!["*.sh", "*.bash"]);
    }
}
