//! `cachet remove`: delete a cached repository and its index entries.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::CommandContext;
use crate::core::{CachetError, NotFoundKind};
use crate::registry::naming;

/// Remove a repository from the cache.
#[derive(Args, Debug)]
pub struct RemoveCommand {
    /// Name of the cached repository
    name: String,
}

impl RemoveCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        if ctx.config.dry_run {
            let dir = ctx.store().repo_dir(&self.name);
            if naming::validate_name(&self.name).is_err() || !dir.is_dir() {
                return Err(CachetError::NotFound {
                    kind: NotFoundKind::Repository,
                    name: self.name,
                    suggestion: None,
                }
                .into());
            }
            ctx.dry_run(format!("would remove {}", dir.display()));
            return Ok(0);
        }

        let lock = ctx.store().acquire_lock().await?;
        let removed = match ctx.registry.remove_locked(&lock, &self.name).await {
            Ok(()) => ctx.indexer.forget_repository(&lock, &self.name).await,
            Err(e) => Err(e),
        };
        lock.release();
        removed?;

        ctx.say(format!("{} {}", "Removed".green().bold(), self.name.bold()));
        Ok(0)
    }
}
