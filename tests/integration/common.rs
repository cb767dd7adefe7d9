//! Shared environment for integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use cachet::cache::CacheStore;
use cachet::config::ConfigSet;
use cachet::git::GitSync;
use cachet::registry::RepositoryRegistry;
use cachet::scripts::ScriptIndexer;
use cachet::test_utils::SourceRepo;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const CACHET_VARS: [&str; 10] = [
    "CACHET_CACHE_DIR",
    "CACHET_CONFIG",
    "CACHET_DEFAULT_BRANCH",
    "CACHET_VERBOSE",
    "CACHET_AUTO_UPDATE",
    "CACHET_DRY_RUN",
    "CACHET_FORCE",
    "CACHET_GIT_TIMEOUT",
    "CACHET_NETWORK_RETRIES",
    "CACHET_LOCK_TIMEOUT",
];

/// A temporary cache directory, config file location, and origin parent.
pub struct TestEnv {
    temp: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        cachet::test_utils::init_test_logging(None);
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join("cache")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("config")
    }

    pub fn write_config(&self, content: &str) {
        std::fs::write(self.config_path(), content).unwrap();
    }

    /// Creates a committed origin repository at `<root>/origins/<name>`.
    pub fn origin(&self, name: &str, files: &[(&str, &str)]) -> SourceRepo {
        SourceRepo::create(self.root(), name, files).unwrap()
    }

    pub fn config(&self) -> ConfigSet {
        let mut config = ConfigSet::with_cache_dir(self.cache_dir());
        config.network_retries = 0;
        config.lock_timeout = Duration::from_secs(10);
        config
    }

    pub fn registry(&self) -> RepositoryRegistry {
        let config = self.config();
        RepositoryRegistry::new(CacheStore::from_config(&config), GitSync::from_config(&config))
    }

    pub fn indexer(&self) -> ScriptIndexer {
        ScriptIndexer::from_config(self.registry(), &self.config()).unwrap()
    }

    /// The `cachet` binary, isolated from the caller's environment.
    pub fn cachet(&self) -> Command {
        let mut cmd = Command::cargo_bin("cachet").unwrap();
        for var in CACHET_VARS {
            cmd.env_remove(var);
        }
        cmd.env("CACHET_CACHE_DIR", self.cache_dir())
            .env("CACHET_CONFIG", self.config_path())
            .env("CACHET_NETWORK_RETRIES", "0")
            .env("CACHET_NO_PROGRESS", "1")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .current_dir(self.root());
        cmd
    }
}
