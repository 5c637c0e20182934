//! Strict preflight verification of an IPA.

use super::{
    PreflightReport, PreflightVerifier, VerifyRequest, archive, checksum,
    manifest::{self, BundleIdentity},
    signing::SigningValidator,
};
use crate::delivery::{
    Result,
    error::Context,
    process::CommandRunner,
    utils::fs::{absolute_path, is_readable, with_scratch_dir},
};
use async_trait::async_trait;
use chrono::Utc;
use std::{path::Path, sync::Arc};

const IPA_EXTENSION: &str = "ipa";
const MANIFEST_SCRATCH_PREFIX: &str = "kodegen-ipa-info-";

/// Verifier that runs every check and cross-checks all identity fields.
#[derive(Clone)]
pub struct StrictPreflightVerifier {
    signing: SigningValidator,
}

impl StrictPreflightVerifier {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            signing: SigningValidator::new(runner),
        }
    }
}

#[async_trait]
impl PreflightVerifier for StrictPreflightVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<PreflightReport> {
        let ipa_path = absolute_path(&request.ipa_path)?;
        log::info!("Verifying {}", ipa_path.display());

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut size_bytes = 0u64;
        let mut sha256 = None;
        let mut md5 = None;
        let mut identity = BundleIdentity::default();
        let mut signing_validated = false;

        let is_file = match tokio::fs::metadata(&ipa_path).await {
            Err(_) => {
                errors.push(format!("IPA file does not exist: {}", ipa_path.display()));
                false
            }
            Ok(metadata) if !metadata.is_file() => {
                errors.push(format!("IPA path is not a file: {}", ipa_path.display()));
                false
            }
            Ok(metadata) => {
                size_bytes = metadata.len();
                true
            }
        };

        if is_file && !is_readable(&ipa_path).await {
            errors.push(format!("IPA file is not readable: {}", ipa_path.display()));
        }

        if ipa_path.extension().and_then(|e| e.to_str()) != Some(IPA_EXTENSION) {
            errors.push("IPA file must have .ipa extension.".to_string());
        }

        if is_file && size_bytes == 0 {
            errors.push("IPA file is empty.".to_string());
        }

        if errors.is_empty() {
            match checksum::calculate_digests(&ipa_path).await {
                Ok(digests) => {
                    sha256 = Some(digests.sha256);
                    md5 = Some(digests.md5);
                }
                Err(e) => errors.push(e.message().to_string()),
            }
        }

        let mut info_plist_entry = None;
        if errors.is_empty() {
            match archive::list_entries(&ipa_path).await {
                Ok(entries) => {
                    info_plist_entry = archive::find_info_plist_entry(&entries).map(str::to_string);
                    match &info_plist_entry {
                        None => errors.push("IPA is missing Payload/*.app/Info.plist.".to_string()),
                        Some(chosen) => {
                            let manifests = entries
                                .iter()
                                .filter(|e| archive::is_info_plist_entry(e))
                                .count();
                            if manifests > 1 {
                                warnings.push(format!(
                                    "IPA contains {} application manifests; using {}.",
                                    manifests, chosen
                                ));
                            }
                        }
                    }
                }
                Err(e) => errors.push(e.message().to_string()),
            }
        }

        if let Some(entry) = &info_plist_entry {
            match extract_bundle_identity(&ipa_path, entry).await {
                Ok(found) => identity = found,
                Err(e) => errors.push(e.message().to_string()),
            }
        }

        check_field(
            &mut errors,
            manifest::BUNDLE_IDENTIFIER_KEY,
            request.expected_bundle_id.as_deref(),
            identity.bundle_id.as_deref(),
        );
        check_field(
            &mut errors,
            manifest::SHORT_VERSION_KEY,
            request.expected_version.as_deref(),
            identity.version.as_deref(),
        );
        check_field(
            &mut errors,
            manifest::BUILD_NUMBER_KEY,
            request.expected_build_number.as_deref(),
            identity.build_number.as_deref(),
        );

        if let Some(entry) = &info_plist_entry {
            match self.signing.validate(&ipa_path, entry).await {
                Ok(()) => signing_validated = true,
                Err(e) => errors.push(e.message().to_string()),
            }
        }

        if errors.is_empty() {
            log::info!("Preflight passed for {}", ipa_path.display());
        } else {
            log::info!(
                "Preflight found {} problem(s) in {}",
                errors.len(),
                ipa_path.display()
            );
        }

        Ok(PreflightReport {
            ipa_path,
            bundle_id: identity.bundle_id,
            version: identity.version,
            build_number: identity.build_number,
            size_bytes,
            sha256,
            md5,
            signing_validated,
            errors,
            warnings,
            verified_at: Utc::now(),
        })
    }
}

async fn extract_bundle_identity(ipa_path: &Path, entry: &str) -> Result<BundleIdentity> {
    with_scratch_dir(MANIFEST_SCRATCH_PREFIX, |scratch| async move {
        let plist_path = archive::extract_entry(ipa_path, entry, &scratch).await?;
        manifest::read_bundle_identity(&plist_path).await
    })
    .await
    .with_context(|| "Failed to read Info.plist from IPA")
}

/// Compares one manifest field against the caller's expectation.
///
/// A supplied, non-empty expectation must match exactly, whitespace included.
/// Without one, the field only has to be present and non-empty.
fn check_field(errors: &mut Vec<String>, key: &str, expected: Option<&str>, actual: Option<&str>) {
    match expected.filter(|e| !e.is_empty()) {
        Some(expected) if actual != Some(expected) => errors.push(format!(
            "{} mismatch. Expected \"{}\", got \"{}\".",
            key,
            expected,
            actual.unwrap_or("null")
        )),
        Some(_) => {}
        None if actual.is_none_or(str::is_empty) => errors.push(format!("{} is missing in Info.plist.", key)),
        None => {}
    }
}
