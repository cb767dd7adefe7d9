//! Platform-specific helpers: git executable name, path expansion, and
//! process liveness checks used by stale-lock detection.

use anyhow::Result;
use std::path::PathBuf;

/// Returns true when compiled for Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Returns the git executable name for the current platform.
#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() {
        "git.exe"
    } else {
        "git"
    }
}

/// Expands `~` and `$VAR`/`${VAR}` references in a user-supplied path.
///
/// # Errors
///
/// Fails if the path references an environment variable that is not set.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| anyhow::anyhow!("Invalid path '{path}': {e}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Reports whether a process with the given id is currently running.
///
/// A process we are not allowed to signal is still alive; only a definite
/// "no such process" answer counts as dead.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    if pid == 0 {
        return false;
    }
    process_alive_impl(pid)
}

#[cfg(target_os = "linux")]
fn process_alive_impl(pid: u32) -> bool {
    std::path::Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive_impl(pid: u32) -> bool {
    match std::process::Command::new("kill").args(["-0", &pid.to_string()]).output() {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            stderr.contains("not permitted")
        }
        // Can't tell; never reclaim a lock on a guess.
        Err(_) => true,
    }
}

#[cfg(windows)]
fn process_alive_impl(pid: u32) -> bool {
    match std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output()
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\"")),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!process_alive(pid));
    }

    #[test]
    fn test_resolve_path_plain() {
        assert_eq!(resolve_path("/tmp/cache").unwrap(), PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_resolve_path_tilde() {
        let resolved = resolve_path("~/cachet").unwrap();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with("cachet"));
    }

    #[test]
    fn test_git_command_name() {
        if is_windows() {
            assert_eq!(get_git_command(), "git.exe");
        } else {
            assert_eq!(get_git_command(), "git");
        }
    }
}
