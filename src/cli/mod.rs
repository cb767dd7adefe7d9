//! Command-line interface for cachet.
//!
//! Each command lives in its own module with a clap `Args` struct and an
//! async `execute` that returns the process exit code. Global flags map onto
//! [`CliOverrides`] so they take precedence over the environment and the
//! config file; `main` resolves the configuration once and hands it to
//! [`Cli::execute`].
//!
//! # Commands
//!
//! | Command    | Mutates | Needs git |
//! |------------|---------|-----------|
//! | `add`      | yes     | yes       |
//! | `remove`   | yes     | no        |
//! | `update`   | yes     | yes       |
//! | `index`    | yes     | no        |
//! | `list`     | no      | no        |
//! | `status`   | no      | yes       |
//! | `validate` | no      | no        |
//! | `which`    | no      | no        |
//! | `run`      | no*     | no*       |
//!
//! \* `run` syncs the owning repository first when `auto_update` is on.

mod add;
pub mod common;
mod index;
mod list;
mod remove;
mod run;
mod status;
mod update;
mod validate;
mod which;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CliOverrides, ConfigSet};
use common::CommandContext;

/// Main CLI structure for cachet.
#[derive(Parser, Debug)]
#[command(
    name = "cachet",
    about = "Cache git repositories locally and run their scripts by name",
    version,
    long_about = "cachet keeps local clones of git repositories, indexes the scripts they \
                  contain, and runs any of them by name."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress status output and logging
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Cache directory
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Config file to read instead of the default location
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Branch requested when cloning
    #[arg(long, global = true, value_name = "BRANCH")]
    default_branch: Option<String>,

    /// Update a script's repository before running it
    #[arg(long, global = true)]
    auto_update: bool,

    /// Timeout for a single git operation
    #[arg(long, global = true, value_name = "SECONDS")]
    git_timeout: Option<u64>,

    /// Extra attempts for clone and fetch
    #[arg(long, global = true, value_name = "COUNT")]
    retries: Option<u32>,

    /// Show what would change without changing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Stash local modifications instead of refusing to update
    #[arg(short, long, global = true)]
    force: bool,

    /// Disable progress spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a repository into the cache
    Add(add::AddCommand),
    /// Remove a repository from the cache
    Remove(remove::RemoveCommand),
    /// Fetch and fast-forward cached repositories
    Update(update::UpdateCommand),
    /// List repositories or scripts
    List(list::ListCommand),
    /// Show local state of cached repositories
    Status(status::StatusCommand),
    /// Report inconsistencies in the cache
    Validate(validate::ValidateCommand),
    /// Print the path of a script
    Which(which::WhichCommand),
    /// Run a script by name
    Run(run::RunCommand),
    /// Build or rebuild the script index
    Index(index::IndexCommand),
}

impl Cli {
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Flags given explicitly on the command line. Absent flags stay `None`
    /// so lower layers still apply.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            cache_dir: self.cache_dir.clone(),
            config_file: self.config.clone(),
            default_branch: self.default_branch.clone(),
            auto_update: self.auto_update.then_some(true),
            git_timeout_secs: self.git_timeout,
            network_retries: self.retries,
            verbose: self.verbose.then_some(true),
            dry_run: self.dry_run.then_some(true),
            force: self.force.then_some(true),
        }
    }

    /// Runs the selected command and returns the process exit code.
    pub async fn execute(self, config: ConfigSet) -> Result<i32> {
        if self.no_progress || self.quiet {
            crate::utils::progress::disable();
        }
        let ctx = CommandContext::new(config, self.quiet).await?;

        match self.command {
            Commands::Add(cmd) => cmd.execute(&ctx).await,
            Commands::Remove(cmd) => cmd.execute(&ctx).await,
            Commands::Update(cmd) => cmd.execute(&ctx).await,
            Commands::List(cmd) => cmd.execute(&ctx).await,
            Commands::Status(cmd) => cmd.execute(&ctx).await,
            Commands::Validate(cmd) => cmd.execute(&ctx).await,
            Commands::Which(cmd) => cmd.execute(&ctx).await,
            Commands::Run(cmd) => cmd.execute(&ctx).await,
            Commands::Index(cmd) => cmd.execute(&ctx).await,
        }
    }
}
