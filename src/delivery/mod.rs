//! Verification and delivery of iOS build artifacts.
//!
//! # Overview
//!
//! - [`preflight`] checks a local `.ipa` and produces a [`PreflightReport`]
//! - [`transfer`] sends the file in server-issued byte ranges
//! - [`remote`] talks to the App Store Connect build-upload resources
//! - [`artifact`] acquires the `.ipa` (prebuilt, `xcodebuild`, custom command)
//! - [`orchestrator`] sequences all of the above for one delivery attempt
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_upload::delivery::{
//!     PreflightVerifier, StrictPreflightVerifier, TokioCommandRunner, VerifyRequest,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> kodegen_bundler_upload::delivery::Result<()> {
//! let verifier = StrictPreflightVerifier::new(Arc::new(TokioCommandRunner));
//! let report = verifier
//!     .verify(&VerifyRequest::new("build/Demo.ipa").expect_bundle_id("com.example.demo"))
//!     .await?;
//! for error in &report.errors {
//!     eprintln!("{}", error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod error;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod remote;
pub mod transfer;
pub mod utils;

pub use artifact::{ArtifactProvider, DefaultArtifactProvider, IpaArtifact, IpaSource, XcodebuildSource};
pub use error::{Error, Result};
pub use orchestrator::{
    BuildUploadOrchestrator, PollingConfig, Sleeper, TokioSleeper, UploadMode, UploadRequest,
    UploadResult, planned_operations,
};
pub use preflight::{PreflightReport, PreflightVerifier, StrictPreflightVerifier, VerifyRequest};
pub use process::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use remote::{ApiBuildUploadsRepository, BuildUploadState, BuildUploadsRepository, UploadStatus};
pub use transfer::{ChunkedUploadExecutor, HttpChunkedUploadExecutor, UploadHeader, UploadOperation};
