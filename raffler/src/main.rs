//! `raffler` - giveaway and tournament scheduler

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use raffler::cli::args::Cli;
use raffler::cli::commands;
use raffler::error::ExitCode;
use raffler::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        init_logging(cli.log_format, cli.verbose, cli.color);
    }

    let cancel = CancellationToken::new();

    // First signal shuts down gracefully, second one forces exit
    let token = cancel.clone();
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }

        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        token.cancel();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
            _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
        }
    });

    let result = commands::dispatch(cli, cancel).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
