//! Script discovery and the name → location index.
//!
//! [`ScriptIndexer`] walks every cached repository for files matching the
//! configured patterns and persists the result to `<cacheRoot>/.meta/script-index`.
//! The filesystem is the source of truth: lookups read the index when it
//! exists and fall back to an in-memory scan when it does not, and a forced
//! [`discover`](ScriptIndexer::discover) always rebuilds it.
//!
//! Several repositories may provide a script of the same name. That is not an
//! error; lookups return every match in a stable order and
//! [`ConflictResolver`](crate::conflict::ConflictResolver) picks one.

pub mod index;
pub mod walk;

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, info};

use crate::cache::LockHandle;
use crate::config::ConfigSet;
use crate::constants::SUGGESTION_MAX_DISTANCE;
use crate::core::{CachetError, NotFoundKind};
use crate::registry::RepositoryRegistry;
use crate::utils::{atomic_write, closest_match};
pub use index::ScriptEntry;
use walk::ScanRules;

/// How [`ScriptIndexer::list_all`] groups its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// One group per script name, listing the repositories providing it
    Script,
    /// One group per repository, listing its scripts
    Repository,
}

/// One group of a [`Listing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingGroup {
    /// Script name or repository name, depending on grouping
    pub key: String,
    pub entries: Vec<ScriptEntry>,
}

/// Grouped, deterministically ordered view of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub group_by: GroupBy,
    pub groups: Vec<ListingGroup>,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            writeln!(f, "{}", group.key)?;
            for entry in &group.entries {
                let label = match self.group_by {
                    GroupBy::Script => &entry.repository,
                    GroupBy::Repository => &entry.name,
                };
                writeln!(f, "  {label} ({})", entry.relative_path)?;
            }
        }
        Ok(())
    }
}

/// What [`ScriptIndexer::discover`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverSummary {
    /// An index existed and no rebuild was requested
    pub skipped: bool,
    /// Entries in the index afterwards
    pub entries: usize,
}

/// Builds and queries the script index.
#[derive(Debug, Clone)]
pub struct ScriptIndexer {
    registry: RepositoryRegistry,
    rules: ScanRules,
}

impl ScriptIndexer {
    /// # Errors
    ///
    /// Fails when a script pattern is not a valid glob.
    pub fn new(registry: RepositoryRegistry, patterns: &[String], exclude_dirs: &[String]) -> Result<Self> {
        Ok(Self {
            registry,
            rules: ScanRules::new(patterns, exclude_dirs)?,
        })
    }

    pub fn from_config(registry: RepositoryRegistry, config: &ConfigSet) -> Result<Self> {
        Self::new(registry, &config.script_patterns, &config.exclude_dirs)
    }

    #[must_use]
    pub const fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    async fn scan(&self, repository: &str) -> Result<Vec<ScriptEntry>> {
        let dir = self.registry.store().repo_dir(repository);
        let rules = self.rules.clone();
        let name = repository.to_string();
        Ok(tokio::task::spawn_blocking(move || walk::scan_repository(&name, &dir, &rules)).await?)
    }

    async fn scan_all(&self) -> Result<Vec<ScriptEntry>> {
        let mut all = Vec::new();
        for entry in self.registry.list().await? {
            all.extend(self.scan(&entry.name).await?);
        }
        index::normalize(&mut all);
        Ok(all)
    }

    async fn read_index(&self) -> Result<Option<Vec<ScriptEntry>>> {
        let path = self.registry.store().index_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(index::decode(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CachetError::from_io("read", &path, &e).into()),
        }
    }

    async fn write_index(&self, entries: &[ScriptEntry]) -> Result<()> {
        let path = self.registry.store().index_path();
        let content = index::encode(entries);
        tokio::task::spawn_blocking(move || atomic_write(&path, content.as_bytes())).await?
    }

    async fn record_counts(&self, lock: &LockHandle, entries: &[ScriptEntry], repos: &[String]) -> Result<()> {
        for repo in repos {
            let count = entries.iter().filter(|e| &e.repository == repo).count();
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            self.registry.record_script_count(lock, repo, count).await?;
        }
        Ok(())
    }

    /// Walks every repository and writes the index.
    ///
    /// Skipped when an index exists and `force_rebuild` is false. Takes the
    /// cache lock when it writes.
    pub async fn discover(&self, force_rebuild: bool) -> Result<DiscoverSummary> {
        if !force_rebuild {
            if let Some(existing) = self.read_index().await? {
                debug!(target: "scripts", "Index present; skipping discovery");
                return Ok(DiscoverSummary {
                    skipped: true,
                    entries: existing.len(),
                });
            }
        }
        let lock = self.registry.store().acquire_lock().await?;
        let summary = self.discover_locked(&lock).await;
        lock.release();
        summary
    }

    /// Full rebuild for a caller already holding the lock.
    pub async fn discover_locked(&self, lock: &LockHandle) -> Result<DiscoverSummary> {
        let entries = self.scan_all().await?;
        self.write_index(&entries).await?;
        let repos = self.registry.names().await?;
        self.record_counts(lock, &entries, &repos).await?;
        info!(target: "scripts", "Indexed {} script(s) in {} repositories", entries.len(), repos.len());
        Ok(DiscoverSummary {
            skipped: false,
            entries: entries.len(),
        })
    }

    /// Rescans only `repositories`, keeping every other repository's entries
    /// as they are. Builds a full index when none exists.
    pub async fn refresh_repositories(&self, lock: &LockHandle, repositories: &[String]) -> Result<()> {
        let Some(mut entries) = self.read_index().await? else {
            self.discover_locked(lock).await?;
            return Ok(());
        };

        let targets: HashSet<&str> = repositories.iter().map(String::as_str).collect();
        entries.retain(|e| !targets.contains(e.repository.as_str()));
        let mut present = Vec::new();
        for repo in repositories {
            if self.registry.exists(repo) {
                entries.extend(self.scan(repo).await?);
                present.push(repo.clone());
            }
        }
        index::normalize(&mut entries);
        self.write_index(&entries).await?;
        self.record_counts(lock, &entries, &present).await
    }

    /// Drops one repository's entries from the index.
    pub async fn forget_repository(&self, _lock: &LockHandle, repository: &str) -> Result<()> {
        let Some(mut entries) = self.read_index().await? else {
            return Ok(());
        };
        let before = entries.len();
        entries.retain(|e| e.repository != repository);
        if entries.len() != before {
            self.write_index(&entries).await?;
        }
        Ok(())
    }

    /// Current entries: the index file, or an unpersisted scan when the
    /// index is missing.
    pub async fn entries(&self) -> Result<Vec<ScriptEntry>> {
        match self.read_index().await? {
            Some(entries) => Ok(entries),
            None => {
                debug!(target: "scripts", "No index; scanning repositories in memory");
                self.scan_all().await
            }
        }
    }

    /// Every entry named exactly `name`, in index order.
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<ScriptEntry>> {
        Ok(self.entries().await?.into_iter().filter(|e| e.name == name).collect())
    }

    /// Like [`find_by_name`](Self::find_by_name) but an empty result is a
    /// [`CachetError::NotFound`] carrying the closest script name.
    pub async fn require(&self, name: &str) -> Result<Vec<ScriptEntry>> {
        let entries = self.entries().await?;
        let matches: Vec<ScriptEntry> = entries.iter().filter(|e| e.name == name).cloned().collect();
        if !matches.is_empty() {
            return Ok(matches);
        }
        let names: BTreeSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        Err(CachetError::NotFound {
            kind: NotFoundKind::Script,
            name: name.to_string(),
            suggestion: closest_match(name, names, SUGGESTION_MAX_DISTANCE),
        }
        .into())
    }

    /// Grouped listing of all entries.
    pub async fn list_all(&self, group_by: GroupBy) -> Result<Listing> {
        let entries = self.entries().await?;
        let mut groups: BTreeMap<String, Vec<ScriptEntry>> = BTreeMap::new();
        for entry in entries {
            let key = match group_by {
                GroupBy::Script => entry.name.clone(),
                GroupBy::Repository => entry.repository.clone(),
            };
            groups.entry(key).or_default().push(entry);
        }
        Ok(Listing {
            group_by,
            groups: groups
                .into_iter()
                .map(|(key, entries)| ListingGroup {
                    key,
                    entries,
                })
                .collect(),
        })
    }

    /// Total number of entries.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// Number of distinct script names.
    pub async fn unique_count(&self) -> Result<usize> {
        let entries = self.entries().await?;
        Ok(entries.iter().map(|e| e.name.as_str()).collect::<BTreeSet<_>>().len())
    }
}
