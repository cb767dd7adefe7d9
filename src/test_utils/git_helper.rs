//! Git test helper utilities
//!
//! A blocking wrapper around the git CLI for setting up test repositories.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git command runner for a test repository.
///
/// Use this instead of raw `std::process::Command` for git calls in tests.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run_git_command(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    fn stdout(&self, args: &[&str], action: &str) -> Result<String> {
        let output = self.run_git_command(args, action)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create a new TestGit instance for the given repository path
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Return the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Initialize a repository whose first branch is `branch`
    pub fn init(&self, branch: &str) -> Result<()> {
        std::fs::create_dir_all(&self.repo_path)
            .with_context(|| format!("Failed to create {}", self.repo_path.display()))?;
        self.run_git_command(&["init"], "Failed to initialize git repository")?;
        // Works on git versions without `init -b`.
        self.run_git_command(
            &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")],
            "Failed to set initial branch",
        )?;
        Ok(())
    }

    /// Configure a local identity and disable signing
    pub fn config_user(&self) -> Result<()> {
        for (key, value) in [
            ("user.email", "test@cachet.example"),
            ("user.name", "Test User"),
            ("commit.gpgsign", "false"),
        ] {
            self.run_git_command(&["config", key, value], &format!("Failed to set {key}"))?;
        }
        Ok(())
    }

    /// Stage everything
    pub fn add_all(&self) -> Result<()> {
        self.run_git_command(&["add", "-A"], "Failed to add files to git")?;
        Ok(())
    }

    /// Create a commit with the given message
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_git_command(&["commit", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Create and check out a branch
    pub fn create_branch(&self, branch_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "-b", branch_name],
            &format!("Failed to create branch: {branch_name}"),
        )?;
        Ok(())
    }

    /// Check out an existing branch or commit
    pub fn checkout(&self, ref_name: &str) -> Result<()> {
        self.run_git_command(&["checkout", ref_name], &format!("Failed to checkout: {ref_name}"))?;
        Ok(())
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<String> {
        self.stdout(&["branch", "--show-current"], "Failed to get current branch name")
    }

    /// Get HEAD's commit hash
    pub fn head(&self) -> Result<String> {
        self.stdout(&["rev-parse", "HEAD"], "Failed to get current commit SHA")
    }

    /// Get porcelain status output
    pub fn status_porcelain(&self) -> Result<String> {
        self.stdout(&["status", "--porcelain"], "Failed to get git status")
    }

    /// Number of stash entries
    pub fn stash_count(&self) -> Result<usize> {
        let list = self.stdout(&["stash", "list"], "Failed to list stashes")?;
        Ok(list.lines().filter(|l| !l.trim().is_empty()).count())
    }

    /// Pull from the tracked upstream
    pub fn pull(&self) -> Result<()> {
        self.run_git_command(&["pull", "--ff-only"], "Failed to pull")?;
        Ok(())
    }

    /// Push the current branch to its upstream
    pub fn push(&self) -> Result<()> {
        self.run_git_command(&["push"], "Failed to push")?;
        Ok(())
    }
}
