//! `cachet validate`: report cache inconsistencies without repairing them.

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

use super::common::CommandContext;

/// Check every cached repository for missing or corrupt data.
#[derive(Args, Debug)]
pub struct ValidateCommand {}

impl ValidateCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        let issues = ctx.registry.validate().await?;
        if issues.is_empty() {
            ctx.say(format!("{} Cache is consistent", "✓".green()));
            return Ok(0);
        }

        for issue in &issues {
            println!("{} {}", "✗".red(), issue);
            println!("    {}", issue.path.display());
        }
        bail!(
            "{} problem{} found in {}; remove the affected entries with 'cachet remove <name>'",
            issues.len(),
            if issues.len() == 1 { "" } else { "s" },
            ctx.store().root().display()
        )
    }
}
