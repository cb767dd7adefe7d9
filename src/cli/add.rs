//! `cachet add`: clone a repository into the cache and index its scripts.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::CommandContext;
use crate::registry::naming;
use crate::utils::progress::spinner;

/// Clone a repository into the cache.
#[derive(Args, Debug)]
pub struct AddCommand {
    /// Repository URL (https, ssh, scp-style `git@host:path`, or file://)
    url: String,

    /// Name to register the repository under (derived from the URL by default)
    #[arg(long)]
    name: Option<String>,

    /// Branch to check out (falls back to the remote default if missing)
    #[arg(short, long)]
    branch: Option<String>,
}

impl AddCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        if ctx.config.dry_run {
            let url = naming::normalize_url(&self.url)?;
            let name = match &self.name {
                Some(name) => {
                    naming::validate_name(name)?;
                    name.clone()
                }
                None => naming::derive_name(&url),
            };
            ctx.dry_run(format!(
                "would clone {} into {}",
                url,
                ctx.store().repo_dir(&name).display()
            ));
            return Ok(0);
        }

        ctx.require_git()?;
        let progress = spinner(format!("Cloning {}", self.url));
        let lock = ctx.store().acquire_lock().await?;
        let added = ctx
            .registry
            .add_locked(&lock, &self.url, self.name.as_deref(), self.branch.as_deref())
            .await;
        let refreshed = match &added {
            Ok(outcome) => Some(
                ctx.indexer
                    .refresh_repositories(&lock, std::slice::from_ref(&outcome.entry.name))
                    .await,
            ),
            Err(_) => None,
        };
        lock.release();
        progress.finish_and_clear();
        let outcome = added?;

        // The repository is registered; the index can be rebuilt later.
        if let Some(Err(e)) = refreshed {
            ctx.warn(format!(
                "{} was added but the script index could not be updated ({e:#}); \
                 run `cachet index --rebuild`",
                outcome.entry.name
            ));
        }
        if let Some(warning) = &outcome.warning {
            ctx.warn(warning);
        }
        let entry = ctx.registry.get(&outcome.entry.name).await.unwrap_or(outcome.entry);
        ctx.say(format!(
            "{} {} ({}, {} script{})",
            "Added".green().bold(),
            entry.name.bold(),
            entry.default_branch,
            entry.script_count,
            if entry.script_count == 1 { "" } else { "s" }
        ));
        Ok(0)
    }
}
