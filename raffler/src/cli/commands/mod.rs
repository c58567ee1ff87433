//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod completions;
pub mod draw;
pub mod list;
pub mod run;
pub mod validate;
pub mod version;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands};
use crate::error::RafflerError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `cancel` is triggered by the process signal handler; long-running
/// commands shut down cleanly when it fires.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), RafflerError> {
    match cli.command {
        Commands::Run(args) => run::run(&args, cancel).await,
        Commands::Validate(args) => validate::run(&args),
        Commands::List(args) => list::run(&args).await,
        Commands::Draw(args) => draw::run(&args),
        Commands::Completions(args) => {
            completions::run(&args);
            Ok(())
        }
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
