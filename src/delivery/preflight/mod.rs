//! IPA preflight verification.
//!
//! Checks that a local `.ipa` is structurally sound, carries the expected
//! identity in its `Info.plist`, and is properly code signed, before anything
//! is sent to App Store Connect.
//!
//! # Overview
//!
//! The verifier:
//! 1. Checks the file exists, is readable, has the `.ipa` extension and is non-empty
//! 2. Computes SHA-256 and MD5 in one streaming pass
//! 3. Locates `Payload/<Name>.app/Info.plist` in the archive
//! 4. Reads and cross-checks bundle identifier, version and build number
//! 5. Verifies the code signature of the extracted `.app`
//!
//! Problems never abort the pass. They are collected into
//! [`PreflightReport::errors`] and the report is always returned.
//!
//! # Module Organization
//!
//! - [`archive`] - zip entry listing and scoped extraction
//! - [`checksum`] - single-pass SHA-256 + MD5
//! - [`manifest`] - `Info.plist` identity fields
//! - [`signing`] - `codesign` verification
//! - [`verifier`] - the [`StrictPreflightVerifier`] composing all of the above

pub mod archive;
pub mod checksum;
pub mod manifest;
pub mod signing;
mod verifier;

pub use verifier::StrictPreflightVerifier;

use crate::delivery::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Input of one verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    pub ipa_path: PathBuf,
    pub expected_bundle_id: Option<String>,
    pub expected_version: Option<String>,
    pub expected_build_number: Option<String>,
}

impl VerifyRequest {
    pub fn new(ipa_path: impl Into<PathBuf>) -> Self {
        Self {
            ipa_path: ipa_path.into(),
            ..Default::default()
        }
    }

    pub fn expect_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.expected_bundle_id = Some(bundle_id.into());
        self
    }

    pub fn expect_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    pub fn expect_build_number(mut self, build_number: impl Into<String>) -> Self {
        self.expected_build_number = Some(build_number.into());
        self
    }
}

/// Outcome of one verification pass.
///
/// A report with any `errors` must not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub ipa_path: PathBuf,
    pub bundle_id: Option<String>,
    pub version: Option<String>,
    pub build_number: Option<String>,
    pub size_bytes: u64,
    pub sha256: Option<String>,
    pub md5: Option<String>,
    pub signing_validated: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub verified_at: DateTime<Utc>,
}

impl PreflightReport {
    /// True when no errors were collected.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Produces a [`PreflightReport`] for a local artifact.
///
/// Implementations return `Err` only for unexpected internal failures;
/// everything wrong with the artifact itself belongs in the report.
#[async_trait]
pub trait PreflightVerifier: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> Result<PreflightReport>;
}
