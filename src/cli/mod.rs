//! Command line interface for kodegen bundler upload.
//!
//! Parses arguments, dispatches to the `verify` and `upload` commands and
//! maps their outcome to an exit code.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, UploadArgs, VerifyArgs};
pub use output::OutputManager;

use crate::error::{EXIT_FAILURE, EXIT_SUCCESS, Result};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = match Args::parse_args() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too
            e.print()?;
            return Ok(if e.use_stderr() { EXIT_FAILURE } else { EXIT_SUCCESS });
        }
    };
    let output = OutputManager::new(args.verbose, args.quiet);

    match args.command {
        Command::Verify(verify) => commands::verify::run(&verify, &output).await,
        Command::Upload(upload) => commands::upload::run(&upload, &output).await,
    }
}
