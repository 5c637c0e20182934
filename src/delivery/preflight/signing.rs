//! Code signature verification of the embedded application bundle.
//!
//! The `.app` directory is extracted into a private scratch directory and
//! checked with `codesign`: a strict deep verification, then a descriptive
//! pass. Both have to succeed.

use super::archive;
use crate::delivery::{
    error::{Context, Result},
    process::CommandRunner,
    utils::fs::with_scratch_dir,
};
use std::{path::Path, sync::Arc};

const SIGNING_SCRATCH_PREFIX: &str = "kodegen-ipa-signing-";
const CODESIGN: &str = "codesign";

/// Runs signature verification tooling against an IPA's application bundle.
#[derive(Clone)]
pub struct SigningValidator {
    runner: Arc<dyn CommandRunner>,
}

impl SigningValidator {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Verifies the signature of the bundle that contains `info_plist_entry`.
    pub async fn validate(&self, ipa_path: &Path, info_plist_entry: &str) -> Result<()> {
        let app_entry = archive::app_bundle_entry(info_plist_entry);
        let runner = &self.runner;

        with_scratch_dir(SIGNING_SCRATCH_PREFIX, |scratch| async move {
            let app_dir = archive::extract_subtree(ipa_path, app_entry, &scratch).await?;
            let app = app_dir.to_string_lossy().to_string();

            log::debug!("Verifying code signature of {}", app);
            runner
                .run(
                    CODESIGN,
                    &[
                        "--verify".to_string(),
                        "--strict".to_string(),
                        "--deep".to_string(),
                        app.clone(),
                    ],
                )
                .await?;
            runner.run(CODESIGN, &["-dv".to_string(), app]).await?;
            Ok(())
        })
        .await
        .with_context(|| "Code signing verification failed")
    }
}
