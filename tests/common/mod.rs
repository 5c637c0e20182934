//! Shared fixtures: real zip/plist IPAs and in-memory collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_lite::future::Boxed;
use kodegen_bundler_upload::delivery::{
    ArtifactProvider, BuildUploadState, BuildUploadsRepository, ChunkedUploadExecutor,
    CommandOutput, CommandRunner, Error, IpaArtifact, IpaSource, PreflightReport,
    PreflightVerifier, Result, Sleeper, UploadOperation, UploadStatus, VerifyRequest,
    remote::{
        BuildUpload, BuildUploadFile, CreateBuildUpload, CreateBuildUploadFile,
        MarkBuildUploadFileUploaded,
    },
};
use std::{
    collections::VecDeque,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use zip::write::SimpleFileOptions;

/// XML `Info.plist` with whichever identity keys are given.
pub fn info_plist(bundle_id: Option<&str>, version: Option<&str>, build: Option<&str>) -> Vec<u8> {
    let mut dict = plist::Dictionary::new();
    if let Some(bundle_id) = bundle_id {
        dict.insert("CFBundleIdentifier".into(), bundle_id.into());
    }
    if let Some(version) = version {
        dict.insert("CFBundleShortVersionString".into(), version.into());
    }
    if let Some(build) = build {
        dict.insert("CFBundleVersion".into(), build.into());
    }
    dict.insert("CFBundleExecutable".into(), "Demo".into());

    let mut out = Vec::new();
    plist::to_writer_xml(&mut out, &plist::Value::Dictionary(dict)).unwrap();
    out
}

/// Writes a zip archive with the given entries; names ending in `/` are directories.
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// A well-formed `Demo.ipa` for `com.example.demo` 1.0.0 (42).
pub fn demo_ipa(dir: &Path) -> PathBuf {
    demo_ipa_with(dir, "Demo.ipa", info_plist(Some("com.example.demo"), Some("1.0.0"), Some("42")))
}

pub fn demo_ipa_with(dir: &Path, file_name: &str, plist: Vec<u8>) -> PathBuf {
    let path = dir.join(file_name);
    write_zip(
        &path,
        &[
            ("Payload/", Vec::new()),
            ("Payload/Demo.app/", Vec::new()),
            ("Payload/Demo.app/Info.plist", plist),
            ("Payload/Demo.app/Demo", b"\xcf\xfa\xed\xfe binary".to_vec()),
            (
                "Payload/Demo.app/_CodeSignature/CodeResources",
                b"<plist/>".to_vec(),
            ),
        ],
    );
    path
}

/// Stands in for `codesign`; optionally fails the strict verification pass.
#[derive(Default)]
pub struct FakeCodesign {
    pub calls: Mutex<Vec<Vec<String>>>,
    /// Whether the path handed to codesign existed at call time.
    pub saw_existing_bundle: Mutex<Vec<bool>>,
    pub reject: bool,
}

impl FakeCodesign {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeCodesign {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        assert_eq!(program, "codesign");
        let bundle = args.last().cloned().unwrap_or_default();
        self.saw_existing_bundle
            .lock()
            .unwrap()
            .push(Path::new(&bundle).join("Info.plist").exists());
        self.calls.lock().unwrap().push(args.to_vec());

        if self.reject && args.first().map(String::as_str) == Some("--verify") {
            return Err(Error::infrastructure(format!(
                "Command exited with status 1.\nCommand: codesign {}\nstderr: {}: code object is not signed at all",
                args.join(" "),
                bundle
            )));
        }
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: "Executable=Demo\nIdentifier=com.example.demo\n".into(),
        })
    }
}

/// A report with no errors and both digests.
pub fn clean_report(path: &Path) -> PreflightReport {
    PreflightReport {
        ipa_path: path.to_path_buf(),
        bundle_id: Some("com.example.demo".into()),
        version: Some("1.0.0".into()),
        build_number: Some("42".into()),
        size_bytes: 2048,
        sha256: Some("a".repeat(64)),
        md5: Some("b".repeat(32)),
        signing_validated: true,
        errors: Vec::new(),
        warnings: Vec::new(),
        verified_at: chrono::Utc::now(),
    }
}

/// Resolves every source to a fixed path and counts disposals.
pub struct FakeArtifacts {
    pub path: PathBuf,
    pub disposed: Arc<AtomicUsize>,
    pub fail: bool,
}

impl FakeArtifacts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            disposed: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactProvider for FakeArtifacts {
    async fn resolve(&self, _source: &IpaSource) -> Result<IpaArtifact> {
        if self.fail {
            return Err(Error::infrastructure("xcodebuild failed"));
        }
        let disposed = self.disposed.clone();
        Ok(IpaArtifact::with_dispose(
            self.path.clone(),
            Box::new(move || -> Boxed<()> {
                Box::pin(async move {
                    disposed.fetch_add(1, Ordering::SeqCst);
                })
            }),
        ))
    }
}

/// Returns a canned report.
pub struct FakeVerifier {
    pub report: PreflightReport,
    pub requests: Mutex<Vec<VerifyRequest>>,
}

impl FakeVerifier {
    pub fn new(report: PreflightReport) -> Self {
        Self {
            report,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PreflightVerifier for FakeVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<PreflightReport> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.report.clone())
    }
}

/// In-memory build upload resources.
///
/// `get_build_upload` walks through `states`; the last one repeats forever.
pub struct FakeRepository {
    pub states: Mutex<VecDeque<UploadStatus>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub created_upload: Mutex<Option<CreateBuildUpload>>,
    pub created_file: Mutex<Option<CreateBuildUploadFile>>,
    pub marked: Mutex<Option<MarkBuildUploadFileUploaded>>,
    pub fail_on: Option<&'static str>,
}

impl FakeRepository {
    pub fn with_states(states: impl IntoIterator<Item = UploadStatus>) -> Self {
        Self {
            states: Mutex::new(states.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            created_upload: Mutex::new(None),
            created_file: Mutex::new(None),
            marked: Mutex::new(None),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, call: &'static str) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail_on == Some(call) {
            return Err(Error::infrastructure("App Store Connect request failed (500): boom"));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildUploadsRepository for FakeRepository {
    async fn create_build_upload(&self, input: &CreateBuildUpload) -> Result<BuildUpload> {
        self.record("create_build_upload")?;
        *self.created_upload.lock().unwrap() = Some(input.clone());
        Ok(BuildUpload {
            id: "bu-1".into(),
            state: BuildUploadState::new(UploadStatus::AwaitingUpload),
        })
    }

    async fn create_build_upload_file(
        &self,
        input: &CreateBuildUploadFile,
    ) -> Result<BuildUploadFile> {
        self.record("create_build_upload_file")?;
        *self.created_file.lock().unwrap() = Some(input.clone());
        Ok(BuildUploadFile {
            id: "file-1".into(),
            upload_operations: vec![UploadOperation {
                method: "PUT".into(),
                url: "https://upload.example/1".into(),
                offset: 0,
                length: input.file_size,
                request_headers: Vec::new(),
            }],
        })
    }

    async fn mark_build_upload_file_uploaded(
        &self,
        input: &MarkBuildUploadFileUploaded,
    ) -> Result<()> {
        self.record("mark_build_upload_file_uploaded")?;
        *self.marked.lock().unwrap() = Some(input.clone());
        Ok(())
    }

    async fn get_build_upload(&self, build_upload_id: &str) -> Result<BuildUpload> {
        self.record("get_build_upload")?;
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        }
        .unwrap_or(UploadStatus::AwaitingUpload);

        let mut state = BuildUploadState::new(state);
        if state.state == UploadStatus::Failed {
            state.errors.push("Invalid binary".into());
        }
        Ok(BuildUpload {
            id: build_upload_id.to_string(),
            state,
        })
    }
}

/// Records transfers instead of sending bytes.
#[derive(Default)]
pub struct FakeTransfer {
    pub transfers: Mutex<Vec<(PathBuf, usize)>>,
    pub fail: bool,
}

#[async_trait]
impl ChunkedUploadExecutor for FakeTransfer {
    async fn execute(&self, file_path: &Path, operations: &[UploadOperation]) -> Result<()> {
        self.transfers
            .lock()
            .unwrap()
            .push((file_path.to_path_buf(), operations.len()));
        if self.fail {
            return Err(Error::infrastructure("Upload operation failed (403): denied"));
        }
        Ok(())
    }
}

/// Returns immediately and counts requested sleeps.
#[derive(Default)]
pub struct NoopSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
