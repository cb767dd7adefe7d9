//! Committed source repositories used as clone origins in tests.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::TestGit;

/// A local git repository standing in for a remote.
///
/// The repository lives at `<parent>/origins/<name>` and is on branch `main`.
pub struct SourceRepo {
    path: PathBuf,
    git: TestGit,
}

impl SourceRepo {
    /// Creates the repository with `files` committed as the initial commit.
    ///
    /// Files ending in `.sh` are made executable on unix.
    pub fn create(parent: &Path, name: &str, files: &[(&str, &str)]) -> Result<Self> {
        Self::create_on_branch(parent, name, "main", files)
    }

    /// Like [`SourceRepo::create`] but with a different initial branch.
    pub fn create_on_branch(
        parent: &Path,
        name: &str,
        branch: &str,
        files: &[(&str, &str)],
    ) -> Result<Self> {
        let path = parent.join("origins").join(name);
        let git = TestGit::new(&path);
        git.init(branch)?;
        git.config_user()?;
        let repo = Self {
            path,
            git,
        };
        for (rel, content) in files {
            repo.write_file(rel, content)?;
        }
        if files.is_empty() {
            repo.write_file("README", "fixture\n")?;
        }
        repo.commit_all("Initial commit")?;
        Ok(repo)
    }

    /// `file://` URL of the repository.
    pub fn url(&self) -> String {
        url::Url::from_file_path(&self.path)
            .map(|u| u.to_string())
            .unwrap_or_else(|()| format!("file://{}", self.path.display()))
    }

    /// Filesystem path of the repository.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Git helper bound to the repository.
    pub fn git(&self) -> &TestGit {
        &self.git
    }

    /// Writes a file relative to the repository root, creating parents.
    pub fn write_file(&self, rel: &str, content: &str) -> Result<()> {
        let file = self.path.join(rel);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&file, content).with_context(|| format!("Failed to write {}", file.display()))?;
        #[cfg(unix)]
        if rel.ends_with(".sh") {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }

    /// Stages and commits everything.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git.add_all()?;
        self.git.commit(message)
    }
}
