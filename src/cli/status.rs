//! `cachet status`: local state of cached repositories, without fetching.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::common::CommandContext;
use super::list::OutputFormat;
use crate::core::exit_code;
use crate::git::{RepoState, RepoStatus};

/// Show the working-copy state of cached repositories.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Repository to inspect (all when omitted)
    name: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct NamedStatus {
    name: String,
    #[serde(flatten)]
    status: Option<RepoStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn render_error(name: &str, error: &str) -> String {
    format!("{} {} {}", name.bold(), "error:".red(), error)
}

fn render(name: &str, status: &RepoStatus) -> String {
    let state = match status.state {
        RepoState::Clean => status.state.to_string().green(),
        RepoState::Modified | RepoState::Diverged => status.state.to_string().red(),
        RepoState::Ahead | RepoState::Behind => status.state.to_string().yellow(),
    };
    let mut out = format!("{} {} on {}", name.bold(), state, status.branch);
    if let Some(upstream) = &status.upstream {
        out.push_str(&format!(" (vs {upstream}: +{} -{})", status.ahead, status.behind));
    }
    out.push_str(&format!("\n  {}", status.last_commit));
    for path in &status.modified {
        out.push_str(&format!("\n  M {path}"));
    }
    out
}

impl StatusCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        let entries = match &self.name {
            Some(name) => vec![ctx.registry.get(name).await?],
            None => ctx.registry.list().await?,
        };
        if entries.is_empty() {
            ctx.say("No repositories in the cache");
            return Ok(0);
        }
        ctx.require_git()?;

        let mut code = 0;
        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            let (status, error) = match ctx.registry.git().status(&entry.local_path).await {
                Ok(status) => (Some(status), None),
                Err(e) => {
                    if code == 0 {
                        code = exit_code(&e);
                    }
                    (None, Some(format!("{e:#}")))
                }
            };
            statuses.push(NamedStatus {
                name: entry.name,
                status,
                error,
            });
        }

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
            OutputFormat::Text => {
                for item in &statuses {
                    match (&item.status, &item.error) {
                        (Some(status), _) => println!("{}", render(&item.name, status)),
                        (None, Some(error)) => println!("{}", render_error(&item.name, error)),
                        (None, None) => {}
                    }
                }
            }
        }
        Ok(code)
    }
}
