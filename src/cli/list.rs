//! `cachet list`: show cached repositories or indexed scripts.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;

use super::common::CommandContext;
use crate::registry::RepositoryEntry;
use crate::scripts::{GroupBy, Listing};

/// Output format for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON document
    Json,
}

/// Grouping for `list --scripts`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GroupArg {
    /// One group per script name
    Script,
    /// One group per repository
    Repository,
}

impl From<GroupArg> for GroupBy {
    fn from(value: GroupArg) -> Self {
        match value {
            GroupArg::Script => Self::Script,
            GroupArg::Repository => Self::Repository,
        }
    }
}

/// List cached repositories, or scripts with `--scripts`.
#[derive(Args, Debug)]
pub struct ListCommand {
    /// List scripts instead of repositories
    #[arg(short, long)]
    scripts: bool,

    /// How to group scripts
    #[arg(long, value_enum, default_value = "script", requires = "scripts")]
    group_by: GroupArg,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

fn render_repositories(entries: &[RepositoryEntry]) -> String {
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for entry in entries {
        let synced = entry
            .last_synced_at
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        out.push_str(&format!(
            "{}  {}  [{}]  {} script{}  synced {}\n",
            format!("{:<width$}", entry.name).bold(),
            entry.url,
            entry.default_branch,
            entry.script_count,
            if entry.script_count == 1 { "" } else { "s" },
            synced,
        ));
    }
    out
}

impl ListCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        if self.scripts {
            let listing: Listing = ctx.indexer.list_all(self.group_by.into()).await?;
            match self.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
                OutputFormat::Text if listing.groups.is_empty() => ctx.say("No scripts found"),
                OutputFormat::Text => print!("{listing}"),
            }
            return Ok(0);
        }

        let entries = ctx.registry.list().await?;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
            OutputFormat::Text if entries.is_empty() => ctx.say("No repositories in the cache"),
            OutputFormat::Text => print!("{}", render_repositories(&entries)),
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_render_repositories_pluralizes_and_marks_unsynced() {
        colored::control::set_override(false);
        let mut one = RepositoryEntry::new("alpha", "https://example.com/alpha.git", "/tmp/alpha", "main");
        one.script_count = 1;
        one.last_synced_at = None;
        let mut two = RepositoryEntry::new("beta", "https://example.com/beta.git", "/tmp/beta", "dev");
        two.script_count = 2;
        two.last_synced_at = Some(Utc::now());

        let text = render_repositories(&[one, two]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("alpha"));
        assert!(lines[0].contains("1 script "));
        assert!(lines[0].ends_with("synced never"));
        assert!(lines[1].contains("[dev]"));
        assert!(lines[1].contains("2 scripts"));
    }
}
