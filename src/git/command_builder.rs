//! Builder for git subprocess invocations.
//!
//! Every git call in cachet goes through [`GitCommand`] so that timeout
//! handling, logging, and error mapping are identical everywhere. Commands run
//! with `-C <dir>` instead of changing the process working directory.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::DEFAULT_GIT_TIMEOUT;
use crate::core::CachetError;
use crate::utils::platform::get_git_command;

/// Fluent builder for a single git invocation.
///
/// ```rust,ignore
/// use cachet::git::command_builder::GitCommand;
///
/// let branch = GitCommand::current_branch()
///     .current_dir("/path/to/repo")
///     .execute_stdout()
///     .await?;
/// ```
#[derive(Debug)]
pub struct GitCommand {
    /// Arguments after `git` (and after `-C <dir>`)
    args: Vec<String>,

    /// Repository the command operates on
    current_dir: Option<PathBuf>,

    /// Extra environment for the child
    env_vars: Vec<(String, String)>,

    /// Upper bound on the command's runtime (None = unbounded)
    timeout_duration: Option<Duration>,

    /// Label included in log lines, usually the repository name
    context: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(DEFAULT_GIT_TIMEOUT),
            context: None,
        }
    }
}

/// Captured output of a successful git command.
#[derive(Debug, Clone)]
pub struct GitCommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error (git prints progress and hints here)
    pub stderr: String,
}

impl GitCommand {
    /// Creates an empty command with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the command against the repository at `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Sets the timeout (None for no timeout).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Sets a label for log lines.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Disables interactive credential prompts; used for network operations.
    #[must_use]
    pub fn non_interactive(self) -> Self {
        self.env("GIT_TERMINAL_PROMPT", "0")
    }

    /// The git subcommand, for error messages.
    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    fn log_prefix(&self) -> String {
        self.context.as_ref().map(|c| format!("({c}) ")).unwrap_or_default()
    }

    /// Executes the command and captures its output.
    ///
    /// # Errors
    ///
    /// - [`CachetError::GitNotFound`] if the git executable cannot be spawned
    /// - [`CachetError::Git`] if git exits non-zero or exceeds the timeout;
    ///   `stderr` carries git's diagnostic text
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = Instant::now();
        let git_command = get_git_command();
        let prefix = self.log_prefix();
        let operation = self.operation();

        let mut full_args = Vec::with_capacity(self.args.len() + 2);
        if let Some(ref dir) = self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());

        tracing::debug!(
            target: "git",
            "{}Executing command: {} {}",
            prefix,
            git_command,
            full_args.join(" ")
        );

        let mut cmd = Command::new(git_command);
        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "git", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        let output_future = cmd.output();
        let spawned = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "git",
                        "{}Command timed out after {} seconds: git {}",
                        prefix,
                        duration.as_secs(),
                        full_args.join(" ")
                    );
                    return Err(CachetError::Git {
                        operation,
                        stderr: format!(
                            "git {} timed out after {} seconds",
                            full_args.join(" "),
                            duration.as_secs()
                        ),
                    }
                    .into());
                }
            },
            None => output_future.await,
        };

        let output = match spawned {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CachetError::GitNotFound.into());
            }
            Err(e) => {
                return Err(CachetError::Git {
                    operation,
                    stderr: format!("failed to start git: {e}"),
                }
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "{}Command failed with exit code: {:?}",
                prefix,
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "git", "{}Error: {}", prefix, stderr.trim());
            }
            let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(CachetError::Git {
                operation,
                stderr: diagnostic.trim().to_string(),
            }
            .into());
        }

        if !stdout.trim().is_empty() {
            tracing::trace!(target: "git", "{}{}", prefix, stdout.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "git::perf",
                "{}Git {} took {:.2}s",
                prefix,
                operation,
                elapsed.as_secs_f64()
            );
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(
                target: "git::perf",
                "{}Git {} took {}ms",
                prefix,
                operation,
                elapsed.as_millis()
            );
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Executes and returns trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Executes and discards output.
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

// Convenience builders for the operations GitSync needs

impl GitCommand {
    /// `git clone [--branch <branch>] <url> <target>`
    #[must_use]
    pub fn clone(url: &str, target: impl AsRef<Path>, branch: Option<&str>) -> Self {
        let mut cmd = Self::new().non_interactive().arg("clone");
        if let Some(branch) = branch {
            cmd = cmd.args(["--branch", branch]);
        }
        cmd.args([url.to_string(), target.as_ref().display().to_string()])
    }

    /// `git fetch --prune origin`
    #[must_use]
    pub fn fetch() -> Self {
        Self::new().non_interactive().args(["fetch", "--prune", "origin"])
    }

    /// Porcelain status. With `tracked_only`, untracked files are ignored.
    #[must_use]
    pub fn status_porcelain(tracked_only: bool) -> Self {
        let cmd = Self::new().args(["status", "--porcelain"]);
        if tracked_only { cmd.arg("--untracked-files=no") } else { cmd }
    }

    /// `git stash push -m <message>`
    ///
    /// The stash commit is authored as cachet so it works in clones where no
    /// user identity is configured.
    #[must_use]
    pub fn stash_push(message: &str) -> Self {
        Self::new()
            .args(["stash", "push", "-m", message])
            .env("GIT_AUTHOR_NAME", "cachet")
            .env("GIT_AUTHOR_EMAIL", "cachet@localhost")
            .env("GIT_COMMITTER_NAME", "cachet")
            .env("GIT_COMMITTER_EMAIL", "cachet@localhost")
    }

    /// Re-applies and drops the most recent stash entry.
    #[must_use]
    pub fn stash_pop() -> Self {
        Self::new().args(["stash", "pop"])
    }

    /// Upstream of the current branch, e.g. `origin/main`.
    #[must_use]
    pub fn upstream() -> Self {
        Self::new().args(["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
    }

    /// Succeeds iff `reference` resolves to a commit.
    #[must_use]
    pub fn verify_ref(reference: &str) -> Self {
        Self::new().args(["rev-parse", "--verify", "--quiet", &format!("{reference}^{{commit}}")])
    }

    /// `<left>...<right>` commit counts: prints `left<TAB>right`.
    #[must_use]
    pub fn left_right_count(left: &str, right: &str) -> Self {
        Self::new().args(["rev-list", "--left-right", "--count", &format!("{left}...{right}")])
    }

    /// Fast-forward-only merge of `reference` into the current branch.
    #[must_use]
    pub fn merge_ff_only(reference: &str) -> Self {
        Self::new().args(["merge", "--ff-only", reference])
    }

    /// `git branch --show-current`
    #[must_use]
    pub fn current_branch() -> Self {
        Self::new().args(["branch", "--show-current"])
    }

    /// Short hash and subject of HEAD.
    #[must_use]
    pub fn last_commit_summary() -> Self {
        Self::new().args(["log", "-1", "--format=%h %s"])
    }

    /// `git --version`
    #[must_use]
    pub fn version() -> Self {
        Self::new().arg("--version").with_timeout(Some(Duration::from_secs(10)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_builder_args() {
        let cmd = GitCommand::clone("https://h/o/r.git", "/tmp/r", Some("dev"));
        assert_eq!(cmd.args, vec!["clone", "--branch", "dev", "https://h/o/r.git", "/tmp/r"]);
        assert!(cmd.env_vars.iter().any(|(k, v)| k == "GIT_TERMINAL_PROMPT" && v == "0"));

        let plain = GitCommand::clone("https://h/o/r.git", "/tmp/r", None);
        assert_eq!(plain.args, vec!["clone", "https://h/o/r.git", "/tmp/r"]);
    }

    #[test]
    fn test_status_builder_args() {
        assert_eq!(
            GitCommand::status_porcelain(true).args,
            vec!["status", "--porcelain", "--untracked-files=no"]
        );
        assert_eq!(GitCommand::status_porcelain(false).args, vec!["status", "--porcelain"]);
    }

    #[test]
    fn test_operation_name() {
        assert_eq!(GitCommand::fetch().operation(), "fetch");
        assert_eq!(GitCommand::new().operation(), "unknown");
    }

    #[tokio::test]
    async fn test_failure_maps_to_git_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let ceiling = temp.path().parent().unwrap().display().to_string();
        let err = GitCommand::current_branch()
            .current_dir(temp.path())
            .env("GIT_CEILING_DIRECTORIES", ceiling)
            .execute()
            .await
            .unwrap_err();
        match err.downcast_ref::<CachetError>() {
            Some(CachetError::Git {
                operation,
                stderr,
            }) => {
                assert_eq!(operation, "branch");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_version_succeeds() {
        let out = GitCommand::version().execute_stdout().await.unwrap();
        assert!(out.starts_with("git version"));
    }
}
