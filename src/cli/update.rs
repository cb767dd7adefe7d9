//! `cachet update`: fetch and fast-forward cached repositories.
//!
//! All repositories are synced under a single hold of the cache lock, and the
//! script index is refreshed for the ones that synced before it is released.
//!
//! A repository with local modifications is a conflict. Unless `--force` was
//! given, the user is asked whether to stash; declining (or running without a
//! terminal) skips that repository, leaves its index entries as they were, and
//! makes the command exit with the conflict code once the rest are done.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::debug;

use super::common::CommandContext;
use crate::cache::LockHandle;
use crate::core::{CachetError, find_cachet_error};
use crate::git::SyncResult;
use crate::utils::progress::spinner;

/// Update cached repositories from their remotes.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Repositories to update (all when omitted)
    names: Vec<String>,
}

#[derive(Default)]
struct Report {
    synced: Vec<String>,
    skipped: Vec<(String, Vec<String>)>,
    failed: Vec<(String, anyhow::Error)>,
    aborted: Option<anyhow::Error>,
}

fn is_conflict(error: &anyhow::Error) -> bool {
    matches!(
        find_cachet_error(error),
        Some(CachetError::Conflict {
            ..
        })
    )
}

fn describe(name: &str, result: &SyncResult) -> String {
    let stashed = if result.stashed { " (local changes stashed)" } else { "" };
    if result.already_current {
        format!("{} {} already up to date{}", "✓".green(), name.bold(), stashed)
    } else {
        format!(
            "{} {} fast-forwarded {} commit{} from {}{}",
            "✓".green(),
            name.bold(),
            result.commits,
            if result.commits == 1 { "" } else { "s" },
            result.upstream,
            stashed
        )
    }
}

impl UpdateCommand {
    async fn targets(&self, ctx: &CommandContext) -> Result<Vec<String>> {
        if self.names.is_empty() {
            return ctx.registry.names().await;
        }
        for name in &self.names {
            ctx.registry.get(name).await?;
        }
        Ok(self.names.clone())
    }

    async fn sync_all(&self, ctx: &CommandContext, lock: &LockHandle, targets: &[String]) -> Report {
        let mut report = Report::default();
        let mut confirmer = ctx.confirmer();
        let force = ctx.config.force;

        for name in targets {
            let progress = spinner(format!("Updating {name}"));
            let first = ctx.registry.sync_locked(lock, name, force).await;
            progress.finish_and_clear();

            let outcome = match first {
                Err(e) if is_conflict(&e) => {
                    let question = format!("{name} has local modifications. Stash them and update?");
                    match confirmer.confirm(&question) {
                        Ok(true) => ctx.registry.sync_locked(lock, name, true).await,
                        Ok(false) => {
                            let paths = match find_cachet_error(&e) {
                                Some(CachetError::Conflict {
                                    paths,
                                    ..
                                }) => paths.iter().map(|p| format!("{name}/{p}")).collect(),
                                _ => Vec::new(),
                            };
                            ctx.warn(format!("skipped {name}: local modifications"));
                            report.skipped.push((name.clone(), paths));
                            continue;
                        }
                        Err(abort) => {
                            report.aborted = Some(abort);
                            break;
                        }
                    }
                }
                other => other,
            };

            match outcome {
                Ok(result) => {
                    ctx.say(describe(name, &result));
                    report.synced.push(name.clone());
                }
                Err(e) => {
                    eprintln!("{} {}: {}", "✗".red(), name.bold(), e);
                    report.failed.push((name.clone(), e));
                }
            }
        }
        report
    }

    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        let targets = self.targets(ctx).await?;
        if targets.is_empty() {
            ctx.say("No repositories in the cache");
            return Ok(0);
        }
        if ctx.config.dry_run {
            for name in &targets {
                ctx.dry_run(format!("would update {name}"));
            }
            return Ok(0);
        }

        ctx.require_git()?;
        let lock = ctx.store().acquire_lock().await?;
        let report = self.sync_all(ctx, &lock, &targets).await;
        let refreshed = if report.synced.is_empty() {
            Ok(())
        } else {
            ctx.indexer.refresh_repositories(&lock, &report.synced).await
        };
        lock.release();

        debug!(
            "update: {} synced, {} skipped, {} failed",
            report.synced.len(),
            report.skipped.len(),
            report.failed.len()
        );

        if let Some(abort) = report.aborted {
            return Err(abort);
        }
        refreshed?;
        if let Some((_, first)) = report.failed.into_iter().next() {
            return Err(first);
        }
        if !report.skipped.is_empty() {
            let names: Vec<&str> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
            return Err(CachetError::Conflict {
                identifier: names.join(", "),
                message: "skipped because of local modifications".to_string(),
                paths: report.skipped.into_iter().flat_map(|(_, p)| p).collect(),
            }
            .into());
        }
        Ok(0)
    }
}
