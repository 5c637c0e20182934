mod common;

use common::{FakeCodesign, demo_ipa, demo_ipa_with, info_plist, write_zip};
use kodegen_bundler_upload::delivery::{PreflightVerifier, StrictPreflightVerifier, VerifyRequest};
use sha2::{Digest, Sha256};
use std::{path::Path, sync::Arc};

fn verifier(codesign: &Arc<FakeCodesign>) -> StrictPreflightVerifier {
    StrictPreflightVerifier::new(codesign.clone())
}

fn expecting_demo(path: &Path) -> VerifyRequest {
    VerifyRequest::new(path)
        .expect_bundle_id("com.example.demo")
        .expect_version("1.0.0")
        .expect_build_number("42")
}

#[tokio::test]
async fn matching_ipa_passes_with_independent_digests() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa(tmp.path());
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();

    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert!(report.is_clean());
    assert!(report.signing_validated);
    assert_eq!(report.bundle_id.as_deref(), Some("com.example.demo"));
    assert_eq!(report.version.as_deref(), Some("1.0.0"));
    assert_eq!(report.build_number.as_deref(), Some("42"));

    let bytes = std::fs::read(&ipa).unwrap();
    assert_eq!(report.size_bytes, bytes.len() as u64);
    assert_eq!(report.sha256.as_deref(), Some(format!("{:x}", Sha256::digest(&bytes)).as_str()));
    assert_eq!(report.md5.as_deref(), Some(format!("{:x}", md5::compute(&bytes)).as_str()));
}

#[tokio::test]
async fn codesign_runs_strict_then_descriptive_on_extracted_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa(tmp.path());
    let codesign = Arc::new(FakeCodesign::default());

    verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();

    let calls = codesign.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][..3], ["--verify", "--strict", "--deep"]);
    assert_eq!(calls[1][0], "-dv");
    assert!(calls[0][3].ends_with("Payload/Demo.app"));
    assert_eq!(calls[0][3], calls[1][1]);

    // The bundle existed while codesign ran and is gone afterwards.
    assert_eq!(*codesign.saw_existing_bundle.lock().unwrap(), vec![true, true]);
    assert!(!Path::new(&calls[0][3]).exists());
}

#[tokio::test]
async fn bundle_id_mismatch_names_both_values() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa(tmp.path());
    let codesign = Arc::new(FakeCodesign::default());

    let request = VerifyRequest::new(&ipa)
        .expect_bundle_id("com.example.other")
        .expect_version("1.0.0")
        .expect_build_number("42");
    let report = verifier(&codesign).verify(&request).await.unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("\"com.example.other\""));
    assert!(report.errors[0].contains("\"com.example.demo\""));
    assert!(report.signing_validated);
}

#[tokio::test]
async fn absent_fields_without_expectation_are_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa_with(
        tmp.path(),
        "Partial.ipa",
        info_plist(Some("com.example.demo"), None, None),
    );
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign)
        .verify(&VerifyRequest::new(&ipa))
        .await
        .unwrap();

    assert_eq!(
        report.errors,
        vec![
            "CFBundleShortVersionString is missing in Info.plist.",
            "CFBundleVersion is missing in Info.plist.",
        ]
    );
    assert_eq!(report.version, None);
}

#[tokio::test]
async fn missing_file_skips_archive_and_signing_checks() {
    let tmp = tempfile::tempdir().unwrap();
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign)
        .verify(&expecting_demo(&tmp.path().join("Missing.ipa")))
        .await
        .unwrap();

    assert!(report.errors[0].starts_with("IPA file does not exist:"));
    assert!(report.sha256.is_none());
    assert!(report.md5.is_none());
    assert!(!report.signing_validated);
    assert!(codesign.calls().is_empty());
    // Expected values are still cross-checked against the unknown manifest.
    assert!(report.errors.iter().any(|e| e.contains("CFBundleIdentifier mismatch")));
}

#[tokio::test]
async fn relative_paths_are_resolved() {
    let codesign = Arc::new(FakeCodesign::default());
    let report = verifier(&codesign)
        .verify(&VerifyRequest::new("does-not-exist/Demo.ipa"))
        .await
        .unwrap();
    assert!(report.ipa_path.is_absolute());
}

#[tokio::test]
async fn wrong_extension_and_empty_file_are_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let empty = tmp.path().join("Demo.zip");
    std::fs::write(&empty, b"").unwrap();
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign)
        .verify(&VerifyRequest::new(&empty))
        .await
        .unwrap();

    assert!(report.errors.contains(&"IPA file must have .ipa extension.".to_string()));
    assert!(report.errors.contains(&"IPA file is empty.".to_string()));
    assert_eq!(report.size_bytes, 0);
    assert!(codesign.calls().is_empty());
}

#[tokio::test]
async fn archive_without_manifest_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = tmp.path().join("NoManifest.ipa");
    write_zip(
        &ipa,
        &[
            ("Payload/Demo.app/Demo", b"binary".to_vec()),
            ("Info.plist", info_plist(Some("com.example.demo"), Some("1.0.0"), Some("42"))),
        ],
    );
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();

    assert!(report.sha256.is_some());
    assert_eq!(report.errors[0], "IPA is missing Payload/*.app/Info.plist.");
    assert!(!report.signing_validated);
    assert!(codesign.calls().is_empty());
}

#[tokio::test]
async fn corrupt_archive_is_reported_not_raised() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = tmp.path().join("Corrupt.ipa");
    std::fs::write(&ipa, b"PK but not really a zip").unwrap();
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();

    assert!(report.sha256.is_some());
    assert!(report.errors[0].contains("Failed to read zip archive"));
    assert!(!report.signing_validated);
}

#[tokio::test]
async fn signing_failure_is_collected() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa(tmp.path());
    let codesign = Arc::new(FakeCodesign::rejecting());

    let report = verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Code signing verification failed"));
    assert!(report.errors[0].contains("code object is not signed"));
    assert!(!report.signing_validated);
    assert_eq!(codesign.calls().len(), 1);
}

#[tokio::test]
async fn repeated_verification_yields_identical_digests() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa(tmp.path());
    let codesign = Arc::new(FakeCodesign::default());
    let verifier = verifier(&codesign);

    let first = verifier.verify(&expecting_demo(&ipa)).await.unwrap();
    let second = verifier.verify(&expecting_demo(&ipa)).await.unwrap();

    assert_eq!(first.sha256, second.sha256);
    assert_eq!(first.md5, second.md5);
}

#[tokio::test]
async fn first_of_several_manifests_is_used_with_warning() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = tmp.path().join("Two.ipa");
    write_zip(
        &ipa,
        &[
            (
                "Payload/First.app/Info.plist",
                info_plist(Some("com.example.demo"), Some("1.0.0"), Some("42")),
            ),
            (
                "Payload/Second.app/Info.plist",
                info_plist(Some("com.example.second"), Some("9.9.9"), Some("99")),
            ),
        ],
    );
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();

    assert!(report.is_clean(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.bundle_id.as_deref(), Some("com.example.demo"));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("Payload/First.app/Info.plist"));
    assert!(codesign.calls()[0][3].ends_with("Payload/First.app"));
}

#[tokio::test]
async fn report_serializes_in_camel_case() {
    let tmp = tempfile::tempdir().unwrap();
    let ipa = demo_ipa(tmp.path());
    let codesign = Arc::new(FakeCodesign::default());

    let report = verifier(&codesign).verify(&expecting_demo(&ipa)).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["bundleId"], "com.example.demo");
    assert_eq!(json["buildNumber"], "42");
    assert_eq!(json["signingValidated"], true);
    assert!(json["sizeBytes"].as_u64().unwrap() > 0);
    assert!(json["verifiedAt"].is_string());
}
