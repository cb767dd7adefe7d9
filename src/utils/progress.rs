//! Spinners for long-running git operations.
//!
//! Progress output is hidden when stderr is not a terminal, when
//! `CACHET_NO_PROGRESS` is set, or after [`disable`] (`--no-progress`).

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Hides every spinner created afterwards.
pub fn disable() {
    DISABLED.store(true, Ordering::Relaxed);
}

fn is_progress_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed)
        || std::env::var_os("CACHET_NO_PROGRESS").is_some()
        || !std::io::stderr().is_terminal()
}

/// Creates a spinner showing `message`, or a hidden one when progress is off.
#[must_use]
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    if is_progress_disabled() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
