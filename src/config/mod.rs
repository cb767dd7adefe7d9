//! Configuration resolution for cachet.
//!
//! A [`ConfigSet`] is built exactly once per invocation by [`ConfigResolver`]
//! and then handed to every component by value or reference. Nothing else in
//! the crate reads the process environment for settings.
//!
//! # Precedence
//!
//! Highest wins:
//!
//! 1. Explicit CLI overrides ([`CliOverrides`])
//! 2. Environment variables (`CACHET_*`)
//! 3. Config file values (`key=value`, see [`parser`])
//! 4. Built-in defaults
//!
//! # Tolerance
//!
//! Malformed config lines, unknown keys, unparseable booleans, and negative or
//! non-numeric numbers never abort resolution. The offending value is dropped
//! with a warning and the next lower layer (ultimately the default) is used.
//! The only hard failure is a cache directory that cannot be created or written.
//!
//! # Config file
//!
//! ```text
//! # ~/.config/cachet/config
//! cache_dir = ~/.cachet/cache
//! default_branch = main
//! auto_update = yes
//! git_timeout = 120
//! network_retries = 3
//! script_patterns = *.sh, *.bash
//! ```

pub mod parser;

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BRANCH, DEFAULT_EXCLUDE_DIRS, DEFAULT_GIT_TIMEOUT, DEFAULT_LOCK_TIMEOUT,
    DEFAULT_NETWORK_RETRIES, DEFAULT_SCRIPT_PATTERNS,
};
use crate::core::CachetError;
use crate::utils::fs::is_writable_dir;
use crate::utils::platform::resolve_path;

/// Environment variable names consumed by the resolver.
pub mod env {
    /// Cache directory override
    pub const CACHE_DIR: &str = "CACHET_CACHE_DIR";
    /// Config file path override
    pub const CONFIG: &str = "CACHET_CONFIG";
    /// Default branch override
    pub const DEFAULT_BRANCH: &str = "CACHET_DEFAULT_BRANCH";
    /// Verbose logging
    pub const VERBOSE: &str = "CACHET_VERBOSE";
    /// Auto-update before running scripts
    pub const AUTO_UPDATE: &str = "CACHET_AUTO_UPDATE";
    /// Dry-run mode
    pub const DRY_RUN: &str = "CACHET_DRY_RUN";
    /// Force mode
    pub const FORCE: &str = "CACHET_FORCE";
    /// Git subprocess timeout in seconds
    pub const GIT_TIMEOUT: &str = "CACHET_GIT_TIMEOUT";
    /// Retry count for network git operations
    pub const NETWORK_RETRIES: &str = "CACHET_NETWORK_RETRIES";
    /// Cache lock timeout in seconds
    pub const LOCK_TIMEOUT: &str = "CACHET_LOCK_TIMEOUT";
}

/// Resolved, immutable configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSet {
    /// Cache root directory
    pub cache_dir: PathBuf,
    /// Config file that was consulted (it may not exist)
    pub config_file_path: Option<PathBuf>,
    /// Branch requested when cloning
    pub default_branch: String,
    /// Sync a script's repository before running it
    pub auto_update: bool,
    /// Upper bound for a single git subprocess
    pub git_timeout: Duration,
    /// Extra attempts for network git operations (clone, fetch)
    pub network_retries: u32,
    /// How long mutating operations wait for the cache lock
    pub lock_timeout: Duration,
    /// Debug-level logging and subprocess diagnostics in errors
    pub verbose: bool,
    /// Report mutating actions without performing them
    pub dry_run: bool,
    /// Stash local modifications instead of refusing to sync
    pub force: bool,
    /// File-name globs identifying scripts
    pub script_patterns: Vec<String>,
    /// Directory names pruned during discovery
    pub exclude_dirs: Vec<String>,
}

impl ConfigSet {
    /// Built-in defaults rooted at `cache_dir`.
    #[must_use]
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            config_file_path: None,
            default_branch: DEFAULT_BRANCH.to_string(),
            auto_update: false,
            git_timeout: DEFAULT_GIT_TIMEOUT,
            network_retries: DEFAULT_NETWORK_RETRIES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            verbose: false,
            dry_run: false,
            force: false,
            script_patterns: DEFAULT_SCRIPT_PATTERNS.iter().map(|s| (*s).to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Values supplied explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--cache-dir`
    pub cache_dir: Option<PathBuf>,
    /// `--config`
    pub config_file: Option<PathBuf>,
    /// `--branch` default
    pub default_branch: Option<String>,
    /// `--auto-update`
    pub auto_update: Option<bool>,
    /// `--git-timeout`
    pub git_timeout_secs: Option<u64>,
    /// `--retries`
    pub network_retries: Option<u32>,
    /// `--verbose`
    pub verbose: Option<bool>,
    /// `--dry-run`
    pub dry_run: Option<bool>,
    /// `--force`
    pub force: Option<bool>,
}

/// Output of [`ConfigResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The resolved configuration
    pub config: ConfigSet,
    /// Non-fatal problems found along the way
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct Layer {
    cache_dir: Option<String>,
    default_branch: Option<String>,
    auto_update: Option<bool>,
    git_timeout: Option<u64>,
    network_retries: Option<u64>,
    lock_timeout: Option<u64>,
    verbose: Option<bool>,
    dry_run: Option<bool>,
    force: Option<bool>,
    script_patterns: Option<Vec<String>>,
    exclude_dirs: Option<Vec<String>>,
}

/// Merges defaults, config file, environment, and CLI overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    env: HashMap<String, String>,
    default_cache_dir: Option<PathBuf>,
    default_config_file: Option<PathBuf>,
}

impl ConfigResolver {
    /// Resolver with an explicit environment and no platform defaults.
    ///
    /// Used by tests; production code calls [`ConfigResolver::from_process_env`].
    #[must_use]
    pub fn new(env: HashMap<String, String>) -> Self {
        Self {
            env,
            default_cache_dir: None,
            default_config_file: None,
        }
    }

    /// Resolver seeded from the current process environment and the
    /// platform's home/config directories.
    #[must_use]
    pub fn from_process_env() -> Self {
        let env = std::env::vars().filter(|(k, _)| k.starts_with("CACHET_")).collect();
        Self {
            env,
            default_cache_dir: dirs::home_dir().map(|h| h.join(".cachet").join("cache")),
            default_config_file: dirs::config_dir().map(|c| c.join("cachet").join("config")),
        }
    }

    /// Overrides the built-in default cache directory.
    #[must_use]
    pub fn with_default_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_cache_dir = Some(dir.into());
        self
    }

    /// Overrides the built-in default config file location.
    #[must_use]
    pub fn with_default_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_config_file = Some(path.into());
        self
    }

    /// Resolves the final configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CachetError::Config`] when no cache directory can be
    /// determined, or when it cannot be created or written.
    pub fn resolve(&self, cli: &CliOverrides) -> Result<Resolution> {
        let mut warnings = Vec::new();

        let config_file_path = self.config_file_path(cli, &mut warnings);

        let file_layer = match &config_file_path {
            Some(path) => read_file_layer(path, &mut warnings),
            None => Layer::default(),
        };
        let env_layer = self.env_layer(&mut warnings);

        let cache_dir = match (&cli.cache_dir, &env_layer.cache_dir, &file_layer.cache_dir) {
            (Some(dir), _, _) => dir.clone(),
            (None, Some(raw), _) | (None, None, Some(raw)) => resolve_path(raw)
                .map_err(|e| CachetError::Config {
                    message: e.to_string(),
                })?,
            (None, None, None) => self.default_cache_dir.clone().ok_or_else(|| CachetError::Config {
                message: format!(
                    "cannot determine a home directory; set {} or cache_dir",
                    env::CACHE_DIR
                ),
            })?,
        };

        let mut config = ConfigSet::with_cache_dir(cache_dir);
        config.config_file_path = config_file_path;

        for layer in [file_layer, env_layer] {
            apply_layer(&mut config, layer);
        }
        apply_cli(&mut config, cli);

        validate_cache_dir(&config.cache_dir)?;

        for warning in &warnings {
            tracing::warn!(target: "config", "{}", warning);
        }

        Ok(Resolution {
            config,
            warnings,
        })
    }

    fn config_file_path(&self, cli: &CliOverrides, warnings: &mut Vec<String>) -> Option<PathBuf> {
        if let Some(path) = &cli.config_file {
            return Some(path.clone());
        }
        if let Some(raw) = self.env.get(env::CONFIG) {
            match resolve_path(raw) {
                Ok(path) => return Some(path),
                Err(e) => warnings.push(format!("{}: {e}; using default config file", env::CONFIG)),
            }
        }
        self.default_config_file.clone()
    }

    fn env_layer(&self, warnings: &mut Vec<String>) -> Layer {
        let mut layer = Layer::default();
        let table = [
            (env::CACHE_DIR, "cache_dir"),
            (env::DEFAULT_BRANCH, "default_branch"),
            (env::VERBOSE, "verbose"),
            (env::AUTO_UPDATE, "auto_update"),
            (env::DRY_RUN, "dry_run"),
            (env::FORCE, "force"),
            (env::GIT_TIMEOUT, "git_timeout"),
            (env::NETWORK_RETRIES, "network_retries"),
            (env::LOCK_TIMEOUT, "lock_timeout"),
        ];
        for (var, key) in table {
            if let Some(value) = self.env.get(var) {
                set_value(&mut layer, key, value, var, warnings);
            }
        }
        layer
    }
}

fn read_file_layer(path: &Path, warnings: &mut Vec<String>) -> Layer {
    let mut layer = Layer::default();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return layer,
        Err(e) => {
            warnings.push(format!("cannot read config file {}: {e}", path.display()));
            return layer;
        }
    };

    let parsed = parser::parse(&text, parser::Dialect::Config);
    for bad in &parsed.malformed {
        warnings.push(format!("{}: skipping malformed {bad}", path.display()));
    }
    for (key, value) in &parsed.pairs {
        let origin = format!("{}: {key}", path.display());
        set_value(&mut layer, key, value, &origin, warnings);
    }
    layer
}

fn set_value(layer: &mut Layer, key: &str, value: &str, origin: &str, warnings: &mut Vec<String>) {
    let boolean = |warnings: &mut Vec<String>| {
        let parsed = parser::parse_bool(value);
        if parsed.is_none() {
            warnings.push(format!("{origin}: '{value}' is not a boolean; ignoring it"));
        }
        parsed
    };
    let number = |warnings: &mut Vec<String>| {
        let parsed = parser::parse_non_negative(value);
        if parsed.is_none() {
            warnings.push(format!(
                "{origin}: '{value}' is not a non-negative integer; ignoring it"
            ));
        }
        parsed
    };

    match key {
        "cache_dir" => layer.cache_dir = Some(value.to_string()),
        "default_branch" => {
            if value.trim().is_empty() {
                warnings.push(format!("{origin}: empty branch name; ignoring it"));
            } else {
                layer.default_branch = Some(value.trim().to_string());
            }
        }
        "auto_update" => layer.auto_update = boolean(warnings).or(layer.auto_update),
        "verbose" => layer.verbose = boolean(warnings).or(layer.verbose),
        "dry_run" => layer.dry_run = boolean(warnings).or(layer.dry_run),
        "force" => layer.force = boolean(warnings).or(layer.force),
        "git_timeout" => layer.git_timeout = number(warnings).or(layer.git_timeout),
        "network_retries" => layer.network_retries = number(warnings).or(layer.network_retries),
        "lock_timeout" => layer.lock_timeout = number(warnings).or(layer.lock_timeout),
        "script_patterns" => {
            let list = parser::parse_list(value);
            let invalid: Vec<&String> =
                list.iter().filter(|p| glob::Pattern::new(p).is_err()).collect();
            if list.is_empty() || !invalid.is_empty() {
                warnings.push(format!("{origin}: invalid script patterns '{value}'; ignoring them"));
            } else {
                layer.script_patterns = Some(list);
            }
        }
        "exclude_dirs" => layer.exclude_dirs = Some(parser::parse_list(value)),
        other => warnings.push(format!("{origin}: unknown key '{other}'")),
    }
}

fn apply_layer(config: &mut ConfigSet, layer: Layer) {
    if let Some(v) = layer.default_branch {
        config.default_branch = v;
    }
    if let Some(v) = layer.auto_update {
        config.auto_update = v;
    }
    if let Some(v) = layer.verbose {
        config.verbose = v;
    }
    if let Some(v) = layer.dry_run {
        config.dry_run = v;
    }
    if let Some(v) = layer.force {
        config.force = v;
    }
    if let Some(v) = layer.git_timeout {
        config.git_timeout = Duration::from_secs(v);
    }
    if let Some(v) = layer.network_retries {
        config.network_retries = u32::try_from(v).unwrap_or(u32::MAX);
    }
    if let Some(v) = layer.lock_timeout {
        config.lock_timeout = Duration::from_secs(v);
    }
    if let Some(v) = layer.script_patterns {
        config.script_patterns = v;
    }
    if let Some(v) = layer.exclude_dirs {
        config.exclude_dirs = v;
    }
}

fn apply_cli(config: &mut ConfigSet, cli: &CliOverrides) {
    if let Some(v) = &cli.default_branch {
        config.default_branch = v.clone();
    }
    if let Some(v) = cli.auto_update {
        config.auto_update = v;
    }
    if let Some(v) = cli.git_timeout_secs {
        config.git_timeout = Duration::from_secs(v);
    }
    if let Some(v) = cli.network_retries {
        config.network_retries = v;
    }
    if let Some(v) = cli.verbose {
        config.verbose = v;
    }
    if let Some(v) = cli.dry_run {
        config.dry_run = v;
    }
    if let Some(v) = cli.force {
        config.force = v;
    }
}

/// Checks that the cache directory exists and is writable, or can be created.
///
/// Creates the parent path when it is missing; the cache directory itself is
/// left to [`crate::cache::CacheStore::init`].
fn validate_cache_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(CachetError::Config {
                message: format!("cache directory {} is not a directory", dir.display()),
            }
            .into());
        }
        if !is_writable_dir(dir) {
            return Err(CachetError::Config {
                message: format!("cache directory {} is not writable", dir.display()),
            }
            .into());
        }
        return Ok(());
    }

    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| CachetError::Config {
        message: format!("cannot create {}: {e}", parent.display()),
    })?;
    if !is_writable_dir(&parent) {
        return Err(CachetError::Config {
            message: format!(
                "cannot create cache directory {}: {} is not writable",
                dir.display(),
                parent.display()
            ),
        }
        .into());
    }
    Ok(())
}
