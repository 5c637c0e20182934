//! Kodegen Bundler Upload - verifies iOS build artifacts and delivers them to App Store Connect.
//!
//! Exit codes: 0 success, 1 infrastructure or usage failure, 2 artifact
//! rejected or processing failed.

use kodegen_bundler_upload::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    process::exit(exit_code);
}
