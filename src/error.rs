//! Error types for the command line surface.
//!
//! Core failures arrive as [`crate::delivery::Error`]; everything the CLI adds
//! (argument validation, output, configuration) is wrapped here.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, UploaderError>;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for infrastructure and usage failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when the artifact was rejected or the remote side reported failure.
pub const EXIT_REJECTED: i32 = 2;

/// Main error type for all uploader operations
#[derive(Error, Debug)]
pub enum UploaderError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Verification and delivery errors
    #[error("{0}")]
    Delivery(#[from] crate::delivery::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// Conflicting arguments
    #[error("Conflicting arguments: {arguments:?}")]
    ConflictingArguments {
        /// Arguments that conflict
        arguments: Vec<String>,
    },
}

impl UploaderError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            UploaderError::Delivery(e) if e.is_domain() => EXIT_REJECTED,
            _ => EXIT_FAILURE,
        }
    }
}
