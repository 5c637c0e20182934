//! `verify` command: preflight verification without any remote call.

use super::print_report;
use crate::cli::{OutputManager, VerifyArgs};
use crate::delivery::{PreflightVerifier, StrictPreflightVerifier, TokioCommandRunner, VerifyRequest};
use crate::error::{EXIT_REJECTED, EXIT_SUCCESS, Result};
use std::sync::Arc;

pub async fn run(args: &VerifyArgs, output: &OutputManager) -> Result<i32> {
    let verifier = StrictPreflightVerifier::new(Arc::new(TokioCommandRunner));
    let request = VerifyRequest {
        ipa_path: args.ipa.clone(),
        expected_bundle_id: args.bundle_id.clone(),
        expected_version: args.app_version.clone(),
        expected_build_number: args.build_number.clone(),
    };

    if !args.json {
        output.progress(&format!("Verifying {}", args.ipa.display()))?;
    }
    let report = verifier.verify(&request).await?;
    let code = if report.is_clean() {
        EXIT_SUCCESS
    } else {
        EXIT_REJECTED
    };

    if args.json {
        output.json(&report)?;
        return Ok(code);
    }

    print_report(output, &report)?;
    if report.is_clean() {
        output.success("Preflight verification passed")?;
    } else {
        output.error(&format!(
            "Preflight verification failed with {} error(s)",
            report.errors.len()
        ))?;
    }
    Ok(code)
}
