//! Build upload orchestration.
//!
//! Coordinates one delivery attempt end to end:
//! 1. Resolve the artifact
//! 2. Verify it (a dirty report stops here, before any remote call)
//! 3. Return the plan for dry runs
//! 4. Create the build upload and its file record
//! 5. Transfer the chunks
//! 6. Mark the file uploaded with both checksums
//! 7. Read the state once, or poll until it is terminal
//!
//! The artifact's disposal action runs exactly once on every exit path.
//! Nothing is retried here; re-running the whole attempt is the retry.

use crate::delivery::{
    artifact::{ArtifactProvider, IpaSource},
    error::{Error, Result},
    preflight::{PreflightReport, PreflightVerifier, VerifyRequest},
    remote::{
        BuildUploadState, BuildUploadsRepository, CreateBuildUpload, CreateBuildUploadFile,
        MarkBuildUploadFileUploaded, Platform, UploadStatus,
    },
    transfer::ChunkedUploadExecutor,
};
use async_trait::async_trait;
use serde::Serialize;
use std::{path::Path, sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Suspends the poll loop between state reads.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How long and how often to wait for remote processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// What the caller wants delivered and how.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: IpaSource,
    pub app_id: String,
    pub expected_bundle_id: String,
    pub expected_version: String,
    pub expected_build_number: String,
    pub wait_for_processing: bool,
    pub apply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadMode {
    DryRun,
    Applied,
}

/// Outcome of [`BuildUploadOrchestrator::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub mode: UploadMode,
    pub preflight_report: PreflightReport,
    pub planned_operations: Vec<String>,
    pub build_upload_id: Option<String>,
    pub final_state: Option<BuildUploadState>,
}

/// Describes the remote steps of an applied upload.
///
/// Used verbatim for dry-run previews and applied results.
pub fn planned_operations(app_id: &str, ipa_path: &Path, wait_for_processing: bool) -> Vec<String> {
    vec![
        format!("Create build upload for app {}", app_id),
        format!("Create build upload file for {}", ipa_path.display()),
        "Upload chunks using App Store Connect upload operations".to_string(),
        "Mark build upload file as uploaded with checksums".to_string(),
        if wait_for_processing {
            "Poll build upload until terminal state".to_string()
        } else {
            "Fetch current build upload state once".to_string()
        },
    ]
}

/// Drives artifact resolution, preflight verification and the remote
/// build-upload protocol.
pub struct BuildUploadOrchestrator {
    artifacts: Arc<dyn ArtifactProvider>,
    verifier: Arc<dyn PreflightVerifier>,
    uploads: Arc<dyn BuildUploadsRepository>,
    transfer: Arc<dyn ChunkedUploadExecutor>,
    sleeper: Arc<dyn Sleeper>,
    polling: PollingConfig,
    cancellation: Option<CancellationToken>,
}

impl BuildUploadOrchestrator {
    pub fn new(
        artifacts: Arc<dyn ArtifactProvider>,
        verifier: Arc<dyn PreflightVerifier>,
        uploads: Arc<dyn BuildUploadsRepository>,
        transfer: Arc<dyn ChunkedUploadExecutor>,
    ) -> Self {
        Self {
            artifacts,
            verifier,
            uploads,
            transfer,
            sleeper: Arc::new(TokioSleeper),
            polling: PollingConfig::default(),
            cancellation: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub async fn execute(&self, request: &UploadRequest) -> Result<UploadResult> {
        self.ensure_active("resolving the artifact")?;
        let artifact = self.artifacts.resolve(&request.source).await?;
        log::info!("Resolved artifact {}", artifact.path.display());

        let outcome = self.deliver(request, &artifact.path).await;
        artifact.dispose().await;
        outcome
    }

    async fn deliver(&self, request: &UploadRequest, ipa_path: &Path) -> Result<UploadResult> {
        let report = self
            .verifier
            .verify(&VerifyRequest {
                ipa_path: ipa_path.to_path_buf(),
                expected_bundle_id: Some(request.expected_bundle_id.clone()),
                expected_version: Some(request.expected_version.clone()),
                expected_build_number: Some(request.expected_build_number.clone()),
            })
            .await?;

        if !report.is_clean() {
            log::info!("Upload blocked by {} preflight error(s)", report.errors.len());
            return Err(Error::domain(format!(
                "IPA preflight verification failed: {}",
                report.errors.join(" | ")
            )));
        }

        let plan = planned_operations(&request.app_id, ipa_path, request.wait_for_processing);

        if !request.apply {
            log::info!("Dry run: no remote requests sent");
            return Ok(UploadResult {
                mode: UploadMode::DryRun,
                preflight_report: report,
                planned_operations: plan,
                build_upload_id: None,
                final_state: None,
            });
        }

        self.ensure_active("creating the build upload")?;
        let upload = self
            .uploads
            .create_build_upload(&CreateBuildUpload {
                app_id: request.app_id.clone(),
                version: request.expected_version.clone(),
                build_number: request.expected_build_number.clone(),
                platform: Platform::Ios,
            })
            .await?;
        log::info!("Created build upload {}", upload.id);

        let file_name = ipa_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "build.ipa".to_string());

        self.ensure_active("creating the build upload file")?;
        let file = self
            .uploads
            .create_build_upload_file(&CreateBuildUploadFile::ipa(
                upload.id.clone(),
                file_name,
                report.size_bytes,
            ))
            .await?;
        log::info!(
            "Created build upload file {} with {} upload operation(s)",
            file.id,
            file.upload_operations.len()
        );

        self.ensure_active("transferring chunks")?;
        self.transfer.execute(ipa_path, &file.upload_operations).await?;

        let (Some(sha256), Some(md5)) = (report.sha256.clone(), report.md5.clone()) else {
            return Err(Error::domain(
                "Missing checksums in preflight report; cannot mark build upload file as uploaded.",
            ));
        };

        self.ensure_active("marking the file uploaded")?;
        self.uploads
            .mark_build_upload_file_uploaded(&MarkBuildUploadFileUploaded {
                build_upload_file_id: file.id.clone(),
                sha256,
                md5,
            })
            .await?;
        log::info!("Marked build upload file {} as uploaded", file.id);

        let final_state = if request.wait_for_processing {
            self.wait_for_terminal_state(&upload.id).await?
        } else {
            self.ensure_active("reading the build upload state")?;
            self.uploads.get_build_upload(&upload.id).await?.state
        };
        log::info!("Build upload {} is {}", upload.id, final_state.state);

        if final_state.state == UploadStatus::Failed {
            let mut message = "Build upload failed in App Store Connect.".to_string();
            if !final_state.errors.is_empty() {
                message.push(' ');
                message.push_str(&final_state.errors.join(" | "));
            }
            return Err(Error::domain(message));
        }

        Ok(UploadResult {
            mode: UploadMode::Applied,
            preflight_report: report,
            planned_operations: plan,
            build_upload_id: Some(upload.id),
            final_state: Some(final_state),
        })
    }

    /// Reads the state until it is terminal or the timeout has elapsed.
    async fn wait_for_terminal_state(&self, build_upload_id: &str) -> Result<BuildUploadState> {
        let started = Instant::now();
        loop {
            self.ensure_active("waiting for build upload processing")?;
            let upload = self.uploads.get_build_upload(build_upload_id).await?;
            if upload.state.is_terminal() {
                return Ok(upload.state);
            }

            log::debug!(
                "Build upload {} is {} after {:?}",
                build_upload_id,
                upload.state.state,
                started.elapsed()
            );
            if started.elapsed() >= self.polling.timeout {
                return Err(Error::domain(format!(
                    "Timed out while waiting for build upload processing ({}).",
                    build_upload_id
                )));
            }

            self.pause(self.polling.interval).await?;
        }
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        match &self.cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(cancelled("waiting for build upload processing")),
                _ = self.sleeper.sleep(duration) => Ok(()),
            },
            None => {
                self.sleeper.sleep(duration).await;
                Ok(())
            }
        }
    }

    fn ensure_active(&self, step: &str) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(cancelled(step)),
            _ => Ok(()),
        }
    }
}

fn cancelled(step: &str) -> Error {
    Error::domain(format!("Build upload cancelled while {}.", step))
}
