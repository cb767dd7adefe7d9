//! `cachet index`: build or rebuild the script index.

use anyhow::Result;
use clap::Args;

use super::common::CommandContext;

/// Discover scripts in every cached repository.
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Rebuild even if an index already exists
    #[arg(long)]
    rebuild: bool,
}

impl IndexCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        if ctx.config.dry_run {
            ctx.dry_run(format!("would write {}", ctx.store().index_path().display()));
            return Ok(0);
        }

        let summary = ctx.indexer.discover(self.rebuild || ctx.config.force).await?;
        let unique = ctx.indexer.unique_count().await?;
        if summary.skipped {
            ctx.say(format!(
                "Index up to date: {} scripts ({} unique names); use --rebuild to rescan",
                summary.entries, unique
            ));
        } else {
            ctx.say(format!("Indexed {} scripts ({} unique names)", summary.entries, unique));
        }
        Ok(0)
    }
}
