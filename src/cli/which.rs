//! `cachet which`: print where a script lives.

use anyhow::Result;
use clap::Args;

use super::common::CommandContext;

/// Print the path of a cached script.
#[derive(Args, Debug)]
pub struct WhichCommand {
    /// Script name (file name without extension)
    script: String,

    /// Pick the Nth candidate when several repositories provide the script
    #[arg(long, value_name = "N", conflicts_with = "all")]
    pick: Option<usize>,

    /// Print every candidate instead of choosing one
    #[arg(short, long)]
    all: bool,
}

impl WhichCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        if self.all {
            for entry in ctx.indexer.require(&self.script).await? {
                println!("{}", ctx.script_path(&entry).display());
            }
            return Ok(0);
        }

        let entry = ctx.resolve_script(&self.script, self.pick).await?;
        println!("{}", ctx.script_path(&entry).display());
        Ok(0)
    }
}
