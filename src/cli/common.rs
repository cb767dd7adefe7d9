//! Shared plumbing for command implementations.

use anyhow::Result;
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::debug;

use crate::cache::CacheStore;
use crate::conflict::{
    Confirmer, ConflictResolver, FixedConfirmer, FixedSelector, Selector, TerminalConfirmer,
    TerminalSelector,
};
use crate::config::ConfigSet;
use crate::git::{GitSync, ensure_git_available};
use crate::registry::RepositoryRegistry;
use crate::scripts::{ScriptEntry, ScriptIndexer};

/// Everything a command needs, built once per invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: ConfigSet,
    pub registry: RepositoryRegistry,
    pub indexer: ScriptIndexer,
    quiet: bool,
}

impl CommandContext {
    /// Initializes the cache root and wires up the components.
    ///
    /// Leftovers from interrupted removals are purged here.
    pub async fn new(config: ConfigSet, quiet: bool) -> Result<Self> {
        let store = CacheStore::from_config(&config);
        store.init().await?;
        store.purge_trash().await;

        let registry = RepositoryRegistry::new(store, GitSync::from_config(&config));
        let indexer = ScriptIndexer::from_config(registry.clone(), &config)?;
        Ok(Self {
            config,
            registry,
            indexer,
            quiet,
        })
    }

    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        self.registry.store()
    }

    /// Fails with `GitNotFound` unless git is on `PATH`.
    pub fn require_git(&self) -> Result<()> {
        let path = ensure_git_available()?;
        debug!(target: "git", "Using git at {}", path.display());
        Ok(())
    }

    /// Prints a status line unless `--quiet`.
    pub fn say(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }

    /// Prints a highlighted warning to stderr unless `--quiet`.
    pub fn warn(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message.as_ref());
        }
    }

    /// Prints what a mutating command would do under `--dry-run`.
    pub fn dry_run(&self, message: impl AsRef<str>) {
        println!("{} {}", "[dry-run]".cyan(), message.as_ref());
    }

    /// Selector honouring `--pick`, falling back to the first candidate when
    /// nobody can answer a prompt.
    #[must_use]
    pub fn selector(&self, pick: Option<usize>) -> Box<dyn Selector> {
        match pick {
            Some(index) => Box::new(FixedSelector(index.to_string())),
            None if is_interactive() => Box::new(TerminalSelector),
            None => Box::new(FixedSelector::first()),
        }
    }

    /// Looks up `name` and picks one candidate.
    pub async fn resolve_script(&self, name: &str, pick: Option<usize>) -> Result<ScriptEntry> {
        let candidates = self.indexer.require(name).await?;
        if candidates.len() > 1 && pick.is_none() && !is_interactive() {
            self.warn(format!(
                "'{}' is provided by {} repositories; using the one from {} (pass --pick N to choose)",
                name,
                candidates.len(),
                candidates[0].repository
            ));
        }
        let mut selector = self.selector(pick);
        ConflictResolver::new().resolve(&candidates, selector.as_mut())
    }

    /// Absolute path of a script inside the cache.
    #[must_use]
    pub fn script_path(&self, entry: &ScriptEntry) -> PathBuf {
        let mut path = self.store().repo_dir(&entry.repository);
        path.extend(entry.relative_path.split('/'));
        path
    }

    /// Confirmer for "stash and retry?" questions.
    ///
    /// `--force` already stashes, and a non-interactive session always
    /// declines.
    #[must_use]
    pub fn confirmer(&self) -> Box<dyn Confirmer> {
        if !self.config.force && is_interactive() {
            Box::new(TerminalConfirmer)
        } else {
            Box::new(FixedConfirmer(false))
        }
    }
}

/// Both stdin and stderr are attached to a terminal.
#[must_use]
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}
