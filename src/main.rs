//! `ymx` CLI entry point.
//!
//! Parses the command line, sets up logging, runs the selected conversion,
//! and renders failures through the user-friendly error formatter.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use ymx::cli;
use ymx::core::user_friendly_error;

fn main() {
    let cli = cli::Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute() {
        // Convert to user-friendly error with context and suggestions
        let error_ctx = user_friendly_error(e);
        error_ctx.display();
        std::process::exit(1);
    }
}
