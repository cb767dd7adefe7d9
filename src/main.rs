//! cachet CLI entry point
//!
//! Parses arguments, resolves the configuration, installs the tracing
//! subscriber, runs the command, and maps errors onto exit codes.

use cachet::cli::Cli;
use cachet::config::ConfigResolver;
use cachet::core::user_friendly_error;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise quiet disables logging, verbose selects debug,
/// and the default shows warnings only.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .try_init();
}

fn fail(error: &anyhow::Error, verbose: bool) -> ! {
    let ctx = user_friendly_error(error, verbose);
    ctx.display();
    std::process::exit(ctx.exit_code)
}

#[tokio::main]
async fn main() {
    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    let quiet = cli.is_quiet();

    let resolution = match ConfigResolver::from_process_env().resolve(&cli.overrides()) {
        Ok(resolution) => resolution,
        Err(e) => {
            init_logging(cli.is_verbose(), quiet);
            fail(&e, cli.is_verbose())
        }
    };
    let verbose = resolution.config.verbose;
    init_logging(verbose, quiet);

    // Resolution ran before the subscriber existed.
    if !quiet {
        for warning in &resolution.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
    }

    match cli.execute(resolution.config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => fail(&e, verbose),
    }
}
