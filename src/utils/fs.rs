//! File system helpers: directory creation, atomic writes, and removals that
//! tolerate half-broken trees.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::core::CachetError;

/// Ensures a directory exists, creating it and its parents if needed.
///
/// # Errors
///
/// Fails with [`CachetError::PermissionDenied`] or [`CachetError::Io`] if the
/// directory cannot be created, or if `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| CachetError::from_io("create directory", path, &e))?;
    } else if !path.is_dir() {
        return Err(CachetError::Io {
            operation: "use directory".to_string(),
            path: path.display().to_string(),
            reason: "path exists but is not a directory".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Safely writes a string to a file using atomic operations.
///
/// Convenience wrapper around [`atomic_write`].
pub fn safe_write(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Write content to a uniquely named temporary file next to `path`
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
///
/// Readers never observe a partially written file, and a process killed
/// mid-write leaves only a stray temporary file behind. The temporary file
/// lives in the same directory so the rename never crosses file systems.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| CachetError::from_io("create temp file in", parent, &e))?;

    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;

    temp.persist(path).map_err(|e| CachetError::from_io("rename temp file to", path, &e.error))?;

    Ok(())
}

/// Removes a directory tree, treating "already gone" as success.
///
/// Read-only files (git pack files on Windows) are made writable and the
/// removal is retried once.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(first) => {
            tracing::debug!(
                "Retrying removal of {} after clearing read-only flags: {}",
                path.display(),
                first
            );
            clear_readonly(path);
            fs::remove_dir_all(path)
                .map_err(|e| CachetError::from_io("remove directory", path, &e).into())
        }
    }
}

fn clear_readonly(path: &Path) {
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(entry.path(), perms);
            }
        }
    }
}

/// Checks whether new files can be created inside `dir`.
pub fn is_writable_dir(dir: &Path) -> bool {
    dir.is_dir() && tempfile::Builder::new().prefix(".probe-").tempfile_in(dir).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested").join("file.txt");

        atomic_write(&target, b"first").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");

        safe_write(&target, "second").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");

        // No temp files left next to the target
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_ensure_dir_rejects_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, "x").unwrap();
        assert!(ensure_dir(&file).is_err());
        ensure_dir(&temp.path().join("a/b/c")).unwrap();
        assert!(temp.path().join("a/b/c").is_dir());
    }

    #[test]
    fn test_remove_dir_all_if_exists_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("gone");
        fs::create_dir_all(dir.join("inner")).unwrap();
        fs::write(dir.join("inner/file"), "x").unwrap();

        remove_dir_all_if_exists(&dir).unwrap();
        assert!(!dir.exists());
        remove_dir_all_if_exists(&dir).unwrap();
    }

    #[test]
    fn test_is_writable_dir() {
        let temp = TempDir::new().unwrap();
        assert!(is_writable_dir(temp.path()));
        assert!(!is_writable_dir(&temp.path().join("missing")));
    }
}
