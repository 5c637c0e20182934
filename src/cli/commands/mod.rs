//! Command implementations.

pub mod upload;
pub mod verify;

use crate::cli::OutputManager;
use crate::delivery::PreflightReport;

/// Human-readable summary of a preflight report.
pub(crate) fn print_report(output: &OutputManager, report: &PreflightReport) -> std::io::Result<()> {
    let or_unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());

    output.section("Preflight")?;
    output.indent(&format!("IPA: {}", report.ipa_path.display()))?;
    output.indent(&format!("Bundle ID: {}", or_unknown(&report.bundle_id)))?;
    output.indent(&format!(
        "Version: {} ({})",
        or_unknown(&report.version),
        or_unknown(&report.build_number)
    ))?;
    output.indent(&format!("Size: {} bytes", report.size_bytes))?;
    output.indent(&format!("SHA-256: {}", or_unknown(&report.sha256)))?;
    output.verbose(&format!("   MD5: {}", or_unknown(&report.md5)))?;
    output.indent(&format!(
        "Signing validated: {}",
        if report.signing_validated { "yes" } else { "no" }
    ))?;

    for warning in &report.warnings {
        output.warn(warning)?;
    }
    for error in &report.errors {
        output.error(error)?;
    }
    Ok(())
}
