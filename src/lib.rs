//! Preflight verification and App Store Connect delivery for iOS builds.
//!
//! This library provides:
//! - Strict `.ipa` verification (structure, checksums, Info.plist identity, code signing)
//! - Chunked transfer using server-issued upload operations
//! - The build upload state machine, from record creation to processing result
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;

// Re-export commonly used types
pub use config::UploaderConfig;
pub use error::{CliError, Result, UploaderError};
