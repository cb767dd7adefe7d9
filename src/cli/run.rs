//! `cachet run`: execute a cached script by name.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

use super::common::CommandContext;
use crate::core::{CachetError, NotFoundKind};
use crate::git::SyncResult;
use crate::scripts::ScriptEntry;

/// Run a cached script, passing any extra arguments through.
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Script name (file name without extension)
    script: String,

    /// Pick the Nth candidate when several repositories provide the script
    #[arg(long, value_name = "N")]
    pick: Option<usize>,

    /// Start the script detached and return immediately
    #[arg(long)]
    background: bool,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Direct exec for executable files, `sh <file>` otherwise.
fn command_for(path: &Path, args: &[String]) -> Command {
    let mut cmd = if is_executable(path) {
        Command::new(path)
    } else {
        let mut sh = Command::new("sh");
        sh.arg(path);
        sh
    };
    cmd.args(args);
    cmd
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

async fn sync_owner(ctx: &CommandContext, entry: &ScriptEntry) -> Result<SyncResult> {
    ctx.require_git()?;
    let lock = ctx.store().acquire_lock().await?;
    let result = match ctx.registry.sync_locked(&lock, &entry.repository, false).await {
        Ok(result) => ctx
            .indexer
            .refresh_repositories(&lock, std::slice::from_ref(&entry.repository))
            .await
            .map(|()| result),
        Err(e) => Err(e),
    };
    lock.release();
    result
}

impl RunCommand {
    /// Syncs the owning repository; failures only warn.
    async fn auto_update(&self, ctx: &CommandContext, entry: &ScriptEntry) {
        match sync_owner(ctx, entry).await {
            Ok(result) => debug!(
                "Auto-update of {}: {} new commit(s)",
                entry.repository, result.commits
            ),
            Err(e) => {
                warn!("Auto-update of {} failed: {:#}", entry.repository, e);
                ctx.warn(format!("could not update {}; running the cached copy", entry.repository));
            }
        }
    }

    pub async fn execute(self, ctx: &CommandContext) -> Result<i32> {
        let entry = ctx.resolve_script(&self.script, self.pick).await?;
        if ctx.config.auto_update && !ctx.config.dry_run {
            self.auto_update(ctx, &entry).await;
        }

        let path = ctx.script_path(&entry);
        if !path.is_file() {
            return Err(CachetError::NotFound {
                kind: NotFoundKind::Script,
                name: self.script,
                suggestion: None,
            }
            .into());
        }
        if ctx.config.dry_run {
            ctx.dry_run(format!("would run {} {}", path.display(), self.args.join(" ")));
            return Ok(0);
        }

        let mut cmd = command_for(&path, &self.args);
        debug!("Running {:?}", cmd);

        if self.background {
            cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            let child = cmd
                .spawn()
                .with_context(|| format!("Failed to start {}", path.display()))?;
            ctx.say(format!(
                "Started {} in the background (pid {})",
                entry.name,
                child.id().unwrap_or_default()
            ));
            return Ok(0);
        }

        let status = cmd
            .status()
            .await
            .with_context(|| format!("Failed to run {}", path.display()))?;
        Ok(exit_code_of(status))
    }
}
